//! Live progress display for tile downloads
//!
//! The display polls the coordinator's [`ProgressTracker`] on a timer instead
//! of receiving events, so it never slows the workers down. On a terminal it
//! draws an `indicatif` bar; otherwise it prints a status line every few
//! seconds.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::app::{ProgressSnapshot, ProgressTracker};
use crate::constants::progress;

/// Configuration for progress display
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Draw a bar when stderr is a terminal
    pub enable_progress_bars: bool,
    /// Redraw interval of the bar
    pub update_interval: Duration,
    /// Interval between lines in text mode
    pub text_interval: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enable_progress_bars: true,
            update_interval: progress::TICK_INTERVAL,
            text_interval: progress::TEXT_REPORT_INTERVAL,
        }
    }
}

/// Progress display bound to one tracker
pub struct ProgressDisplay {
    config: ProgressConfig,
    is_terminal: bool,
    bar: Option<ProgressBar>,
    update_task: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ProgressDisplay {
    /// Create a new progress display with the given configuration
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            config,
            is_terminal: atty::is(atty::Stream::Stderr),
            bar: None,
            update_task: None,
            shutdown_tx: None,
        }
    }

    /// Start polling `tracker`
    pub fn start(&mut self, tracker: Arc<ProgressTracker>) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = if self.config.enable_progress_bars && self.is_terminal {
            let bar = ProgressBar::new(0);
            bar.set_style(bar_style());
            bar.set_message("Fetching tiles");
            self.bar = Some(bar.clone());
            tokio::spawn(Self::run_bar(bar, tracker, self.config.update_interval, shutdown_rx))
        } else {
            tokio::spawn(Self::run_text(tracker, self.config.text_interval, shutdown_rx))
        };

        self.update_task = Some(task);
        self.shutdown_tx = Some(shutdown_tx);
        debug!("Progress display started (terminal: {})", self.is_terminal);
    }

    async fn run_bar(
        bar: ProgressBar,
        tracker: Arc<ProgressTracker>,
        interval: Duration,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => update_bar(&bar, &tracker.snapshot()),
            }
        }
        update_bar(&bar, &tracker.snapshot());
    }

    async fn run_text(
        tracker: Arc<ProgressTracker>,
        interval: Duration,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; nothing has happened yet
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {
                    let snapshot = tracker.snapshot();
                    if snapshot.pass > 0 {
                        eprintln!("Progress: {}", snapshot.status_line());
                    }
                }
            }
        }
    }

    /// Stop polling and clear the bar
    pub async fn finish(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.update_task.take() {
            let _ = task.await;
        }
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// The bar counts fetch attempts; its length grows by each retry pass
fn update_bar(bar: &ProgressBar, snapshot: &ProgressSnapshot) {
    let (position, length) = bar_extent(snapshot);
    bar.set_length(length);
    bar.set_position(position);
    if snapshot.is_retrying() {
        bar.set_message(format!(
            "retry pass {}, {} of {} tiles ready",
            snapshot.pass - 1,
            snapshot.successes,
            snapshot.tiles
        ));
    }
}

fn bar_extent(snapshot: &ProgressSnapshot) -> (u64, u64) {
    let before_pass = snapshot.completed.saturating_sub(snapshot.pass_completed);
    (snapshot.completed, before_pass + snapshot.pass_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(completed: u64, pass: u32, pass_size: u64, pass_completed: u64) -> ProgressSnapshot {
        ProgressSnapshot {
            tiles: 10,
            completed,
            successes: 0,
            pass,
            pass_size,
            pass_completed,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_bar_extent_grows_with_retries() {
        assert_eq!(bar_extent(&snapshot(4, 1, 10, 4)), (4, 10));
        // Second pass re-fetches 3 tiles after all 10 initial attempts
        assert_eq!(bar_extent(&snapshot(11, 2, 3, 1)), (11, 13));
    }

    #[tokio::test]
    async fn test_text_mode_start_and_finish() {
        let mut display = ProgressDisplay::new(ProgressConfig {
            enable_progress_bars: false,
            update_interval: Duration::from_millis(5),
            text_interval: Duration::from_millis(5),
        });
        display.start(Arc::new(ProgressTracker::new()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        display.finish().await;
        assert!(display.update_task.is_none());
    }
}
