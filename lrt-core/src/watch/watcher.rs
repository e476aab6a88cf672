//! Filesystem watching for the source-dependency graph (spec §4.1, C1).
//!
//! Subscribes whole directories (never individual files) and emits a
//! change signal for every event whose path looks like a relevant source
//! file. Deduplication across a burst of events is the Debouncer's job
//! ([`crate::watch::debounce`]), not this module's.

use std::path::{Path, PathBuf};

use notify::{
    event::{AccessKind, ModifyKind},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _,
};
use tokio::sync::mpsc;

use crate::error::AppError;

/// A single filesystem change relevant to the build.
#[derive(Debug, Clone)]
pub struct ChangeSignal {
    pub path: PathBuf,
}

/// Watches a growing set of directories for source changes.
///
/// Per spec §3's `WatchSet` invariant, directories are only ever added —
/// `watch_dir` may be called repeatedly with the same or new directories,
/// and a directory once watched is never unwatched. The inner
/// `notify::RecommendedWatcher` is kept alive for as long as `Watcher` is;
/// dropping it would silently stop delivering events.
pub struct Watcher {
    inner: RecommendedWatcher,
    tx: mpsc::UnboundedSender<ChangeSignal>,
}

impl Watcher {
    /// Create a watcher that sends every relevant change signal to `tx`.
    pub fn new(tx: mpsc::UnboundedSender<ChangeSignal>) -> Result<Self, AppError> {
        let event_tx = tx.clone();
        let inner = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => handle_event(event, &event_tx),
                Err(err) => {
                    tracing::error!(error = %err, "file watcher backend error");
                }
            }
        })
        .map_err(|err| watch_backend_error(&err))?;

        Ok(Self { inner, tx })
    }

    /// Add a directory to the watch set. Idempotent: watching an
    /// already-watched directory again is a no-op as far as observable
    /// behavior goes (notify itself tolerates a duplicate `watch` call).
    pub fn watch_dir(&mut self, dir: &Path) -> Result<(), AppError> {
        self.inner
            .watch(dir, RecursiveMode::Recursive)
            .map_err(|err| watch_backend_error(&err))
    }
}

fn watch_backend_error(err: &notify::Error) -> AppError {
    let message = err.to_string();
    let hint = match &err.kind {
        notify::ErrorKind::MaxFilesWatch | notify::ErrorKind::Io(_) => {
            Some("hint: you may need to raise your per-process open-file limit (ulimit -n).")
        }
        _ => None,
    };
    AppError::WatchBackend { message, hint }
}

fn handle_event(event: Event, tx: &mpsc::UnboundedSender<ChangeSignal>) {
    if !is_content_event(&event.kind) {
        return;
    }
    for path in &event.paths {
        if is_relevant_source_file(path) {
            let _ = tx.send(ChangeSignal { path: path.clone() });
        }
    }
}

/// Create, write, and remove events matter; pure access or metadata-only
/// (permission) changes do not, per spec §4.1.
fn is_content_event(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Name(_)) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(ModifyKind::Any) => true,
        EventKind::Modify(ModifyKind::Other) => false,
        EventKind::Access(AccessKind::Close(notify::event::AccessMode::Write)) => true,
        EventKind::Access(_) => false,
        EventKind::Any | EventKind::Other => false,
    }
}

/// A path is a relevant source file iff it ends with `.go`, is not a test
/// file (`_test.go` suffix per spec §4.1), and does not live under a
/// toolchain build-cache directory.
pub fn is_relevant_source_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    if !name.ends_with(".go") {
        return false;
    }

    if name.ends_with("_test.go") {
        return false;
    }

    if path.components().any(|c| {
        let s = c.as_os_str().to_string_lossy();
        s.starts_with('.') || s == "vendor"
    }) {
        return false;
    }

    true
}
