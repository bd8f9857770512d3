//! Retry coordination for tile fetches
//!
//! The coordinator runs the Tile Fetch Unit over a batch of descriptors on a
//! [`WorkerPool`], then re-dispatches only the failed ids until everything
//! succeeded or the retry budget is spent.
//!
//! Passes are phase barriers: a retry pass starts only after every fetch of
//! the previous pass has finished. Both failure kinds redo the whole fetch,
//! including the download.
//!
//! - [`config`] - worker count, retry budget and per-tile timeout
//! - [`progress`] - shared progress counters
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dem_fetcher::app::{ArchiveTileFetcher, CoordinatorConfig, DemClient, RetryCoordinator};
//!
//! # async fn example(tiles: Vec<dem_fetcher::app::TileDescriptor>) -> dem_fetcher::Result<()> {
//! let client = Arc::new(DemClient::new()?);
//! let fetcher = Arc::new(ArchiveTileFetcher::new(client, "/tmp/dem_fetcher", "tif"));
//! let coordinator = RetryCoordinator::new(CoordinatorConfig::default(), fetcher)?;
//!
//! let result = coordinator.run(&tiles).await;
//! println!("{} of {} tiles ready", result.success_count(), tiles.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod progress;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::app::models::{DownloadBatchResult, TileDescriptor, TileId};
use crate::app::worker::{TileFetcher, WorkerPool};
use crate::errors::ConfigResult;

pub use config::CoordinatorConfig;
pub use progress::{ProgressSnapshot, ProgressTracker};

/// Runs fetch passes until every tile succeeded or retries are exhausted
pub struct RetryCoordinator {
    config: CoordinatorConfig,
    fetcher: Arc<dyn TileFetcher>,
    progress: Arc<ProgressTracker>,
}

impl RetryCoordinator {
    /// Create a coordinator, validating the configuration
    pub fn new(config: CoordinatorConfig, fetcher: Arc<dyn TileFetcher>) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            fetcher,
            progress: Arc::new(ProgressTracker::new()),
        })
    }

    /// Report into an externally owned tracker
    pub fn with_progress(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Fetch every descriptor, retrying failures
    ///
    /// Never fails: permanently failed tiles are left in the failure sets of
    /// the result and reported with a warning.
    pub async fn run(&self, descriptors: &[TileDescriptor]) -> DownloadBatchResult {
        let started = Instant::now();
        let mut result = DownloadBatchResult::default();
        if descriptors.is_empty() {
            return result;
        }

        let by_id: HashMap<TileId, &TileDescriptor> =
            descriptors.iter().map(|d| (d.id, d)).collect();
        self.progress.begin_run(by_id.len());

        let mut pool = WorkerPool::new(self.config.worker_count);
        let mut batch: Vec<TileDescriptor> = descriptors.to_vec();

        loop {
            result.passes += 1;
            let pass = result.passes;
            self.progress.begin_pass(pass, batch.len());
            if pass == 1 {
                info!(
                    "Fetching {} tiles with {} workers",
                    batch.len(),
                    pool.worker_count()
                );
            } else {
                info!(
                    "Retry pass {}/{}: re-fetching {} tiles",
                    pass - 1,
                    self.config.max_retries,
                    batch.len()
                );
            }

            let progress = Arc::clone(&self.progress);
            let outcomes = pool
                .run_pass(
                    Arc::clone(&self.fetcher),
                    batch,
                    self.config.download_timeout,
                    |outcome| progress.record(outcome),
                )
                .await;
            result.record(outcomes);

            info!(
                "Pass {} finished: {}/{} tiles ready, {} download and {} extract failures ({:.1}s elapsed)",
                pass,
                result.success_count(),
                by_id.len(),
                result.still_failed_download.len(),
                result.still_failed_extract.len(),
                started.elapsed().as_secs_f64()
            );

            if result.is_complete() || pass >= self.config.max_passes() {
                break;
            }

            batch = result
                .failed_ids()
                .iter()
                .filter_map(|id| by_id.get(id).map(|d| (*d).clone()))
                .collect();
            debug!("Re-dispatching ids {:?}", result.failed_ids());
        }

        pool.shutdown().await;

        if !result.is_complete() {
            warn!(
                "{} of {} tiles permanently failed after {} passes: ids {:?}",
                result.failed_ids().len(),
                by_id.len(),
                result.passes,
                result.failed_ids()
            );
        }

        result
    }
}
