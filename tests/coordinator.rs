//! Integration tests for the retry coordinator
//!
//! Fetch stubs complete in random order to check that pass accounting and
//! the final result do not depend on scheduling.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use dem_fetcher::app::{
    CoordinatorConfig, ProgressTracker, RetryCoordinator, TileDescriptor, TileFetcher, TileId,
    TileOutcome, TileStatus,
};

fn descriptors(n: usize) -> Vec<TileDescriptor> {
    (0..n)
        .map(|id| TileDescriptor {
            id,
            remote_url: format!("https://tiles.test/Copernicus_DSM_10_N{id:02}_00_E000_00.tar"),
            local_archive_name: format!("Copernicus_DSM_10_N{id:02}_00_E000_00.tar"),
            grid_cell_code: format!("N{id:02}_00_E000_00"),
        })
        .collect()
}

/// Sleeps a random few milliseconds, then fails ids per a fixed rule
struct JitteryFetcher {
    fail_first_attempt: fn(TileId) -> bool,
    always_fail: fn(TileId) -> bool,
    attempts: Mutex<HashMap<TileId, u32>>,
    passes_seen: Mutex<Vec<Vec<TileId>>>,
}

impl JitteryFetcher {
    fn new(fail_first_attempt: fn(TileId) -> bool, always_fail: fn(TileId) -> bool) -> Arc<Self> {
        Arc::new(Self {
            fail_first_attempt,
            always_fail,
            attempts: Mutex::new(HashMap::new()),
            passes_seen: Mutex::new(Vec::new()),
        })
    }

    fn attempts(&self, id: TileId) -> u32 {
        self.attempts.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    fn total_attempts(&self) -> u64 {
        self.attempts.lock().unwrap().values().map(|&n| u64::from(n)).sum()
    }
}

#[async_trait]
impl TileFetcher for JitteryFetcher {
    async fn fetch(&self, d: &TileDescriptor, _timeout: Duration) -> TileOutcome {
        tokio::time::sleep(Duration::from_millis(fastrand::u64(0..15))).await;

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(d.id).or_insert(0);
            *n += 1;
            *n
        };
        {
            let mut passes = self.passes_seen.lock().unwrap();
            let pass = attempt as usize - 1;
            if passes.len() <= pass {
                passes.resize(pass + 1, Vec::new());
            }
            passes[pass].push(d.id);
        }

        if (self.always_fail)(d.id) {
            TileOutcome::download_failed(d.id)
        } else if attempt == 1 && (self.fail_first_attempt)(d.id) {
            TileOutcome::extract_failed(d.id)
        } else {
            TileOutcome::success(d.id, PathBuf::from(format!("{}.tif", d.id)))
        }
    }
}

fn coordinator(fetcher: Arc<JitteryFetcher>, workers: usize, retries: u32) -> RetryCoordinator {
    let config = CoordinatorConfig::default()
        .with_worker_count(workers)
        .with_max_retries(retries)
        .with_download_timeout(Duration::from_secs(5));
    RetryCoordinator::new(config, fetcher).unwrap()
}

#[tokio::test]
async fn test_random_completion_order_recovers_transient_failures() {
    let fetcher = JitteryFetcher::new(|id| id % 3 == 0, |_| false);
    let tiles = descriptors(12);

    let result = coordinator(fetcher.clone(), 4, 3).run(&tiles).await;

    assert!(result.is_complete());
    assert_eq!(result.passes, 2);
    assert_eq!(result.success_count(), 12);
    // Second pass re-fetched exactly the failed ids
    let mut retried = fetcher.passes_seen.lock().unwrap()[1].clone();
    retried.sort_unstable();
    assert_eq!(retried, vec![0, 3, 6, 9]);
    // Fragments come back in id order whatever the completion order
    let expected: Vec<PathBuf> = (0..12).map(|id| PathBuf::from(format!("{id}.tif"))).collect();
    assert_eq!(result.fragments(), expected);
}

#[tokio::test]
async fn test_permanent_failures_exhaust_retry_budget() {
    let fetcher = JitteryFetcher::new(|_| false, |id| id == 2 || id == 5);
    let progress = Arc::new(ProgressTracker::new());
    let result = coordinator(fetcher.clone(), 3, 2)
        .with_progress(Arc::clone(&progress))
        .run(&descriptors(6))
        .await;

    assert_eq!(result.passes, 3);
    assert_eq!(result.failed_ids(), vec![2, 5]);
    assert_eq!(result.outcomes[&2].status, TileStatus::DownloadFailed);
    assert_eq!(fetcher.attempts(2), 3);
    assert_eq!(fetcher.attempts(0), 1);

    let snapshot = progress.snapshot();
    assert_eq!(snapshot.completed, fetcher.total_attempts());
    assert_eq!(snapshot.completed, 6 + 2 + 2);
    assert_eq!(snapshot.successes, 4);
}

#[tokio::test]
async fn test_single_worker_matches_parallel_result() {
    let tiles = descriptors(8);
    let sequential = coordinator(JitteryFetcher::new(|id| id == 4, |id| id == 7), 1, 1)
        .run(&tiles)
        .await;
    let parallel = coordinator(JitteryFetcher::new(|id| id == 4, |id| id == 7), 8, 1)
        .run(&tiles)
        .await;

    assert_eq!(sequential.outcomes, parallel.outcomes);
    assert_eq!(sequential.failed_ids(), vec![7]);
    assert_eq!(sequential.passes, parallel.passes);
}
