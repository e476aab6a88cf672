//! Readers-writer gate protecting the proxy path during rebuilds (spec §4.6, C6).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// State visible to request handlers while holding a shared lease.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    pub service_addr: SocketAddr,
    pub error_response: Vec<u8>,
}

/// The readers-writer gate. Readers are request handlers; the writer is
/// the reload controller for the duration of a rebuild sequence.
pub struct Gate {
    inner: RwLock<ProxyTarget>,
    built_once: AtomicBool,
}

impl Gate {
    pub fn new(initial_service_addr: SocketAddr) -> Self {
        Self {
            inner: RwLock::new(ProxyTarget {
                service_addr: initial_service_addr,
                error_response: Vec::new(),
            }),
            built_once: AtomicBool::new(false),
        }
    }

    /// Acquire the gate for reading, blocking (not failing) until the
    /// first build has completed. Spins on a 100ms poll rather than a
    /// condition variable, per spec §4.6/§9: this keeps the shared path's
    /// lock order trivial at the cost of bounded first-request latency.
    pub async fn acquire_shared(&self) -> RwLockReadGuard<'_, ProxyTarget> {
        loop {
            if self.built_once.load(Ordering::Acquire) {
                return self.inner.read().await;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Acquire the gate exclusively for a rebuild sequence.
    pub async fn acquire_exclusive(&self) -> RwLockWriteGuard<'_, ProxyTarget> {
        self.inner.write().await
    }

    /// Record that the first build attempt has completed (successfully or
    /// not), unblocking any readers spinning in `acquire_shared`.
    pub fn mark_built_once(&self) {
        self.built_once.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shared_acquire_blocks_until_built_once() {
        let addr: SocketAddr = "127.0.0.1:3000".parse().unwrap();
        let gate = std::sync::Arc::new(Gate::new(addr));

        let gate_clone = std::sync::Arc::clone(&gate);
        let reader = tokio::spawn(async move {
            let guard = gate_clone.acquire_shared().await;
            guard.service_addr
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reader.is_finished());

        gate.mark_built_once();
        let addr_seen = reader.await.unwrap();
        assert_eq!(addr_seen, addr);
    }

    #[tokio::test]
    async fn exclusive_writer_sets_error_response() {
        let addr: SocketAddr = "127.0.0.1:3000".parse().unwrap();
        let gate = Gate::new(addr);
        gate.mark_built_once();

        {
            let mut guard = gate.acquire_exclusive().await;
            guard.error_response = b"boom".to_vec();
        }

        let guard = gate.acquire_shared().await;
        assert_eq!(guard.error_response, b"boom");
    }
}
