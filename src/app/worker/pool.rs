//! Bounded worker pool for tile fetches
//!
//! The pool is an explicit handle scoped to one coordinator run. Concurrency
//! is bounded by a semaphore with `worker_count` permits; tasks live in a
//! `JoinSet`, so dropping the pool on any exit path aborts whatever is still
//! in flight.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::fetcher::TileFetcher;
use crate::app::models::{TileDescriptor, TileId, TileOutcome};

/// Pool running tile fetches with bounded concurrency
#[derive(Debug)]
pub struct WorkerPool {
    worker_count: usize,
    permits: Arc<Semaphore>,
    tasks: JoinSet<TileOutcome>,
}

impl WorkerPool {
    /// Create a pool; a count of zero is treated as one
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        Self {
            worker_count,
            permits: Arc::new(Semaphore::new(worker_count)),
            tasks: JoinSet::new(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Run one pass over `batch` and wait for every fetch to finish
    ///
    /// `on_complete` is called once per dispatched id as its outcome arrives.
    /// A task that panics or is cancelled counts as a download failure, so
    /// the returned outcomes always cover exactly the ids of `batch`, sorted
    /// by id.
    pub async fn run_pass<F>(
        &mut self,
        fetcher: Arc<dyn TileFetcher>,
        batch: Vec<TileDescriptor>,
        timeout: Duration,
        mut on_complete: F,
    ) -> Vec<TileOutcome>
    where
        F: FnMut(&TileOutcome),
    {
        let mut pending: BTreeSet<TileId> = batch.iter().map(|d| d.id).collect();
        let mut outcomes = Vec::with_capacity(pending.len());

        for descriptor in batch {
            let permits = Arc::clone(&self.permits);
            let fetcher = Arc::clone(&fetcher);
            self.tasks.spawn(async move {
                // The semaphore is never closed, so acquisition only waits
                let _permit = permits.acquire_owned().await.ok();
                fetcher.fetch(&descriptor, timeout).await
            });
        }
        debug!(
            "Dispatched {} fetches on {} workers",
            pending.len(),
            self.worker_count
        );

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if pending.remove(&outcome.id) {
                        on_complete(&outcome);
                        outcomes.push(outcome);
                    } else {
                        warn!("Ignoring outcome for unexpected tile id {}", outcome.id);
                    }
                }
                Err(e) => warn!("Fetch task failed: {}", e),
            }
        }

        for id in pending {
            let outcome = TileOutcome::download_failed(id);
            on_complete(&outcome);
            outcomes.push(outcome);
        }

        outcomes.sort_by_key(|o| o.id);
        outcomes
    }

    /// Abort anything still running and wait for the tasks to wind down
    pub async fn shutdown(mut self) {
        self.tasks.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::TileStatus;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptors(n: usize) -> Vec<TileDescriptor> {
        (0..n)
            .map(|id| TileDescriptor {
                id,
                remote_url: format!("https://tiles.test/{id}.tar"),
                local_archive_name: format!("{id}.tar"),
                grid_cell_code: format!("C{id}"),
            })
            .collect()
    }

    /// Tracks the peak number of concurrent fetches
    #[derive(Default)]
    struct ConcurrencyProbe {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TileFetcher for ConcurrencyProbe {
        async fn fetch(&self, d: &TileDescriptor, _timeout: Duration) -> TileOutcome {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            TileOutcome::success(d.id, PathBuf::from(format!("{}.tif", d.id)))
        }
    }

    struct Panicking;

    #[async_trait]
    impl TileFetcher for Panicking {
        async fn fetch(&self, d: &TileDescriptor, _timeout: Duration) -> TileOutcome {
            if d.id == 1 {
                panic!("boom");
            }
            TileOutcome::success(d.id, PathBuf::from("ok.tif"))
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let probe = Arc::new(ConcurrencyProbe::default());
        let mut pool = WorkerPool::new(3);
        let outcomes = pool
            .run_pass(probe.clone(), descriptors(12), Duration::from_secs(1), |_| {})
            .await;
        pool.shutdown().await;

        assert_eq!(outcomes.len(), 12);
        assert!(probe.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_single_worker_is_sequential() {
        let probe = Arc::new(ConcurrencyProbe::default());
        let mut pool = WorkerPool::new(1);
        pool.run_pass(probe.clone(), descriptors(5), Duration::from_secs(1), |_| {})
            .await;
        assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_fetch_counts_as_download_failure() {
        let mut pool = WorkerPool::new(2);
        let mut seen = Vec::new();
        let outcomes = pool
            .run_pass(Arc::new(Panicking), descriptors(3), Duration::from_secs(1), |o| {
                seen.push(o.id)
            })
            .await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[1].status, TileStatus::DownloadFailed);
        assert!(outcomes[0].status.is_success());
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
