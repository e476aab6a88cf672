//! Debounced trigger collapsing (spec §4.2, C2).
//!
//! Contract: if `trigger()` is invoked at time *t*, the wrapped action runs
//! exactly once at the first instant ≥ *t* + `interval` during which no
//! further `trigger()` arrived in the preceding `interval`. A trigger that
//! arrives while the action is executing re-arms a fresh cycle; at most one
//! pending invocation exists at a time.
//!
//! The timer is read and written from two execution contexts — the caller
//! invoking `trigger()` and the previously-spawned timer task itself — so
//! per spec §9's design note it is gated behind a mutex rather than relying
//! on any lock-free trick.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

type Action = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Collapses bursts of `trigger()` calls into at most one call of the
/// wrapped action per quiet `interval`.
pub struct Debouncer {
    interval: Duration,
    action: Action,
    armed: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Wrap `action` with the given debounce `interval`.
    pub fn new<F, Fut>(interval: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: Action = Arc::new(move || Box::pin(action()));
        Self {
            interval,
            action,
            armed: Mutex::new(None),
        }
    }

    /// Arm or reset the debounce timer. Cheap and non-blocking from the
    /// caller's point of view (the mutex is only briefly held to swap the
    /// timer handle).
    pub async fn trigger(self: &Arc<Self>) {
        let mut armed = self.armed.lock().await;
        if let Some(handle) = armed.take() {
            handle.abort();
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(this.interval).await;
            // Clear our own handle before running so a trigger arriving
            // mid-action re-arms a fresh cycle instead of aborting us.
            {
                let mut armed = this.armed.lock().await;
                armed.take();
            }
            (this.action)().await;
        });

        *armed = Some(handle);
    }
}
