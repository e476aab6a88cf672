//! Orchestrates C1-C7 behind one state machine (spec §4.8, C8).
//!
//! Owns every piece of mutable shared state the spec assigns to the
//! controller: `ServiceGeneration`, `WatchSet`, `ErrorResponse`, and
//! `ServiceStatus`. Everything else is a reference the controller hands
//! down, never a copy other components mutate behind its back.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::build::{self, resolver, BuildOutcome, ModuleInfo};
use crate::config::{Config, ServiceAddress};
use crate::error::{boot_exit_body, boot_timeout_body, AppError};
use crate::gate::Gate;
use crate::supervisor::{HealthOutcome, Supervisor};
use crate::watch::{ChangeSignal, Watcher};

const STOP_GRACE: Duration = Duration::from_secs(10);

/// Discriminated lifecycle state of the current generation (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    Unbuilt,
    Building,
    Starting,
    Ready,
    Failed { error_bytes: Vec<u8> },
    Stopping,
}

struct Inner {
    supervisor: Supervisor,
    watcher: Watcher,
    watched_dirs: HashSet<PathBuf>,
    module_info: Option<ModuleInfo>,
    goroot: PathBuf,
    status: ServiceStatus,
    has_built: bool,
}

/// An opaque, monotonically increasing identifier for a (built executable,
/// running process) pair.
pub type ServiceGeneration = u64;

pub struct Controller {
    config: Config,
    gate: Arc<Gate>,
    fatal_tx: mpsc::UnboundedSender<AppError>,
    inner: Mutex<Inner>,
    generation: AtomicU64,
}

impl Controller {
    /// Build a controller and its filesystem watcher, returning the
    /// channel the caller must pump change signals from.
    pub async fn new(
        config: Config,
        gate: Arc<Gate>,
        fatal_tx: mpsc::UnboundedSender<AppError>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<ChangeSignal>), AppError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = Watcher::new(tx)?;

        let cwd = std::env::current_dir().map_err(|source| AppError::Tooling {
            tool: "current_dir".to_string(),
            source,
        })?;
        let module_info = ModuleInfo::discover(&cwd);

        let goroot = if module_info.is_none() {
            resolver::goroot()
                .await
                .map_err(|message| AppError::Tooling {
                    tool: "go env GOROOT".to_string(),
                    source: std::io::Error::other(message),
                })?
        } else {
            PathBuf::new()
        };

        let inner = Inner {
            supervisor: Supervisor::new(),
            watcher,
            watched_dirs: HashSet::new(),
            module_info,
            goroot,
            status: ServiceStatus::Unbuilt,
            has_built: false,
        };

        let controller = Arc::new(Self {
            config,
            gate,
            fatal_tx,
            inner: Mutex::new(inner),
            generation: AtomicU64::new(0),
        });

        Ok((controller, rx))
    }

    /// The nine-step rebuild sequence of spec §4.8, triggered once per
    /// debounced burst of change signals.
    pub async fn rebuild(self: &Arc<Self>) {
        // Step 1: acquire the Gate exclusively.
        let mut gate_guard = self.gate.acquire_exclusive().await;
        let mut inner = self.inner.lock().await;

        tracing::info!("rebuild starting");

        // Step 2: on first run or recovering from Failed, rediscover the
        // full transitive dependency set rather than relying on the
        // incremental list the next build reports.
        let needs_full_discovery =
            !inner.has_built || matches!(inner.status, ServiceStatus::Failed { .. });

        if needs_full_discovery {
            match build::list_all_deps(&self.config.target_package).await {
                Ok(deps) => {
                    if let Err(err) = self.register_deps(&mut inner, &deps).await {
                        drop(inner);
                        drop(gate_guard);
                        self.fail_fatal(err).await;
                        return;
                    }
                }
                Err(message) => {
                    drop(inner);
                    drop(gate_guard);
                    self.fail_fatal(AppError::Tooling {
                        tool: "go list -deps".to_string(),
                        source: std::io::Error::other(message),
                    })
                    .await;
                    return;
                }
            }
        }

        // Step 3: clear the error response, mark built_once, stop the
        // previous child.
        inner.status = ServiceStatus::Building;
        gate_guard.error_response.clear();
        self.gate.mark_built_once();
        inner.supervisor.stop(STOP_GRACE).await;

        // Step 4: drive the build.
        let outcome = build::build(
            &self.config.target_package,
            &self.config.build_args,
            &self.config.temp_executable_path,
        )
        .await;

        let new_deps = match outcome {
            BuildOutcome::Success {
                executable_path: _,
                new_deps,
            } => new_deps,
            BuildOutcome::Failure { diagnostics } => {
                tracing::warn!("build failed");
                inner.status = ServiceStatus::Failed {
                    error_bytes: diagnostics.clone(),
                };
                gate_guard.error_response = diagnostics;
                return;
            }
            BuildOutcome::ToolingError { message } => {
                drop(inner);
                drop(gate_guard);
                self.fail_fatal(AppError::Tooling {
                    tool: "go build".to_string(),
                    source: std::io::Error::other(message),
                })
                .await;
                return;
            }
        };

        // Step 5: register any newly discovered dependency directories.
        if let Err(err) = self.register_deps(&mut inner, &new_deps).await {
            drop(inner);
            drop(gate_guard);
            self.fail_fatal(err).await;
            return;
        }

        // Step 6: the previous child was already reaped by `stop` above
        // (awaited to completion), so no two children are ever alive at
        // once.

        // Step 7: start the new child and probe health.
        inner.status = ServiceStatus::Starting;
        let service_addr = match self.config.service_addr {
            ServiceAddress::Explicit(addr) => addr,
            ServiceAddress::Ephemeral => {
                let port = crate::supervisor::allocate_ephemeral_port(self.config.listen_addr);
                std::net::SocketAddr::new(self.config.listen_addr.ip(), port)
            }
        };

        if let Err(err) = inner.supervisor.start(
            &self.config.temp_executable_path,
            &self.config.cmd_args,
            service_addr.port(),
        ) {
            drop(inner);
            drop(gate_guard);
            self.fail_fatal(err).await;
            return;
        }

        let health_url = self.config.health_check_url(service_addr);
        let health = inner
            .supervisor
            .wait_healthy(&health_url, self.config.health_check_timeout)
            .await;

        // Step 8: settle on Ready or a Failed variant.
        match health {
            HealthOutcome::Ready => {
                tracing::info!(addr = %service_addr, "service ready");
                inner.status = ServiceStatus::Ready;
                gate_guard.service_addr = service_addr;
                self.generation.fetch_add(1, Ordering::SeqCst);
            }
            HealthOutcome::Exited => {
                tracing::warn!("service exited before responding to health check");
                let body = boot_exit_body(&health_url);
                inner.status = ServiceStatus::Failed {
                    error_bytes: body.clone(),
                };
                gate_guard.error_response = body;
            }
            HealthOutcome::TimedOut => {
                tracing::warn!("service did not respond to health check in time");
                let body = boot_timeout_body(&health_url, self.config.health_check_timeout);
                inner.status = ServiceStatus::Failed {
                    error_bytes: body.clone(),
                };
                gate_guard.error_response = body;
            }
        }

        inner.has_built = true;

        // Step 9: the Gate and inner lock are released as `gate_guard` and
        // `inner` drop at the end of this scope.
    }

    /// Resolve each identifier and register its directory with the
    /// Watcher, deduplicating against the running watch set.
    async fn register_deps(&self, inner: &mut Inner, idents: &[String]) -> Result<(), AppError> {
        for ident in idents {
            let resolution = resolver::resolve(ident, inner.module_info.as_ref(), &inner.goroot)
                .await
                .map_err(|message| AppError::DependencyResolution {
                    ident: ident.clone(),
                    message,
                })?;

            if let resolver::Resolution::Directory(dir) = resolution {
                if inner.watched_dirs.insert(dir.clone()) {
                    inner.watcher.watch_dir(&dir)?;
                }
            }
        }
        Ok(())
    }

    /// Fatal shutdown path: report the error to `main` so the process can
    /// exit with the right code and hint.
    async fn fail_fatal(self: &Arc<Self>, err: AppError) {
        let _ = self.fatal_tx.send(err);
    }

    /// Graceful shutdown: stop the child, delete the temp executable,
    /// return once everything is torn down. Any in-flight request either
    /// completes or is cleanly cut off by the child's own exit, since the
    /// gate is acquired exclusively first.
    pub async fn shutdown(self: &Arc<Self>) {
        let _gate_guard = self.gate.acquire_exclusive().await;
        let mut inner = self.inner.lock().await;
        inner.status = ServiceStatus::Stopping;
        inner.supervisor.stop(STOP_GRACE).await;
        let _ = std::fs::remove_file(&self.config.temp_executable_path);
        tracing::info!("shutdown complete");
    }

    /// Pump change signals from the Watcher into the Debouncer.
    pub async fn pump_changes(
        mut rx: mpsc::UnboundedReceiver<ChangeSignal>,
        debouncer: Arc<crate::watch::Debouncer>,
    ) {
        while let Some(signal) = rx.recv().await {
            tracing::debug!(path = %signal.path.display(), "change detected");
            debouncer.trigger().await;
        }
    }

    pub fn current_generation(&self) -> ServiceGeneration {
        self.generation.load(Ordering::SeqCst)
    }
}
