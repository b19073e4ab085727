//! Bounded pools for the three resource classes the pipeline consumes:
//! network sessions, open staging files, and converter subprocesses.
//!
//! The pools are strictly independent counting semaphores with capacities
//! fixed at construction. Holding a slot in one never implies holding a slot
//! in another; the retrieval state machine layers them explicitly (an item
//! holds its file-handle slot while waiting for a conversion slot).
//!
//! Permits are RAII: dropping an [`OwnedSemaphorePermit`] releases the slot,
//! so every error and early-return path releases automatically.

use crate::error::ItemError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// The three resource pools, sized once at process start.
#[derive(Debug)]
pub struct ResourceGovernor {
    fetch: Arc<Semaphore>,
    files: Arc<Semaphore>,
    convert: Arc<Semaphore>,
}

impl ResourceGovernor {
    pub fn new(fetch_slots: usize, file_slots: usize, convert_slots: usize) -> Self {
        Self {
            fetch: Arc::new(Semaphore::new(fetch_slots)),
            files: Arc::new(Semaphore::new(file_slots)),
            convert: Arc::new(Semaphore::new(convert_slots)),
        }
    }

    /// Admit one network session (shared by the probe and the full fetch).
    pub async fn acquire_fetch(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit, ItemError> {
        acquire(&self.fetch, shutdown).await
    }

    /// Admit one open staging file.
    pub async fn acquire_file(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit, ItemError> {
        acquire(&self.files, shutdown).await
    }

    /// Admit one converter subprocess.
    pub async fn acquire_convert(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit, ItemError> {
        acquire(&self.convert, shutdown).await
    }
}

/// Wait for a permit or for shutdown, whichever comes first.
async fn acquire(
    sem: &Arc<Semaphore>,
    shutdown: &CancellationToken,
) -> Result<OwnedSemaphorePermit, ItemError> {
    if shutdown.is_cancelled() {
        return Err(ItemError::Cancelled);
    }

    tokio::select! {
        _ = shutdown.cancelled() => Err(ItemError::Cancelled),
        permit = Arc::clone(sem).acquire_owned() => {
            // acquire_owned only errors when the semaphore is closed, which
            // this type never does.
            permit.map_err(|_| ItemError::Cancelled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Gauge that tracks the high-water mark of concurrent holders.
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        max: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn pool_never_exceeds_capacity() {
        let governor = Arc::new(ResourceGovernor::new(3, 8, 2));
        let shutdown = CancellationToken::new();
        let gauge = Arc::new(Gauge::default());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let governor = Arc::clone(&governor);
            let shutdown = shutdown.clone();
            let gauge = Arc::clone(&gauge);
            handles.push(tokio::spawn(async move {
                let _permit = governor.acquire_fetch(&shutdown).await.unwrap();
                gauge.enter();
                tokio::time::sleep(Duration::from_millis(5)).await;
                gauge.exit();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(
            gauge.max.load(Ordering::SeqCst) <= 3,
            "fetch pool exceeded capacity: {}",
            gauge.max.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn pools_are_independent() {
        let governor = ResourceGovernor::new(1, 1, 1);
        let shutdown = CancellationToken::new();

        // Exhausting the fetch pool must not block the file or convert pools.
        let _fetch = governor.acquire_fetch(&shutdown).await.unwrap();
        let _file = governor.acquire_file(&shutdown).await.unwrap();
        let _convert = governor.acquire_convert(&shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn blocked_acquire_fails_on_shutdown() {
        let governor = Arc::new(ResourceGovernor::new(1, 1, 1));
        let shutdown = CancellationToken::new();

        let held = governor.acquire_fetch(&shutdown).await.unwrap();

        let waiter = {
            let governor = Arc::clone(&governor);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { governor.acquire_fetch(&shutdown).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ItemError::Cancelled)));
        drop(held);
    }

    #[tokio::test]
    async fn acquire_after_shutdown_fails_immediately() {
        let governor = ResourceGovernor::new(4, 4, 4);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result = governor.acquire_convert(&shutdown).await;
        assert!(matches!(result, Err(ItemError::Cancelled)));
    }
}
