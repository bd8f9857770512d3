//! Progress tracking for the retry coordinator
//!
//! Workers report each finished fetch; readers (progress bars, log lines)
//! poll a [`ProgressSnapshot`]. The completed-unit counter spans all passes
//! of a run and only ever grows within it; starting a run resets it.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::app::models::TileOutcome;

/// Shared progress counters for one coordinator run
#[derive(Debug)]
pub struct ProgressTracker {
    started: Mutex<Instant>,
    tiles: AtomicU64,
    completed: AtomicU64,
    successes: AtomicU64,
    pass: AtomicU32,
    pass_size: AtomicU64,
    pass_completed: AtomicU64,
}

/// Point-in-time view of a [`ProgressTracker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Tiles in the run
    pub tiles: u64,
    /// Fetch attempts finished across all passes
    pub completed: u64,
    /// Successful attempts across all passes
    pub successes: u64,
    /// Current pass, 1-based; 0 before the run starts
    pub pass: u32,
    /// Fetches dispatched in the current pass
    pub pass_size: u64,
    /// Fetches finished in the current pass
    pub pass_completed: u64,
    pub elapsed: Duration,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            started: Mutex::new(Instant::now()),
            tiles: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            pass: AtomicU32::new(0),
            pass_size: AtomicU64::new(0),
            pass_completed: AtomicU64::new(0),
        }
    }

    /// Start a new run, clearing the counters of any previous one
    pub(crate) fn begin_run(&self, tiles: usize) {
        if let Ok(mut started) = self.started.lock() {
            *started = Instant::now();
        }
        self.completed.store(0, Ordering::SeqCst);
        self.successes.store(0, Ordering::SeqCst);
        self.pass.store(0, Ordering::SeqCst);
        self.pass_size.store(0, Ordering::SeqCst);
        self.pass_completed.store(0, Ordering::SeqCst);
        self.tiles.store(tiles as u64, Ordering::SeqCst);
    }

    pub(crate) fn begin_pass(&self, pass: u32, size: usize) {
        self.pass_completed.store(0, Ordering::SeqCst);
        self.pass_size.store(size as u64, Ordering::SeqCst);
        self.pass.store(pass, Ordering::SeqCst);
    }

    pub(crate) fn record(&self, outcome: &TileOutcome) {
        if outcome.status.is_success() {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }
        self.pass_completed.fetch_add(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// Fetch attempts finished so far
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            tiles: self.tiles.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            successes: self.successes.load(Ordering::SeqCst),
            pass: self.pass.load(Ordering::SeqCst),
            pass_size: self.pass_size.load(Ordering::SeqCst),
            pass_completed: self.pass_completed.load(Ordering::SeqCst),
            elapsed: self
                .started
                .lock()
                .map(|started| started.elapsed())
                .unwrap_or_default(),
        }
    }
}

impl ProgressSnapshot {
    /// Whether a retry pass is running
    pub fn is_retrying(&self) -> bool {
        self.pass > 1
    }

    /// One-line status for non-interactive output
    pub fn status_line(&self) -> String {
        let phase = if self.is_retrying() {
            format!("retry pass {}", self.pass - 1)
        } else {
            "initial pass".to_string()
        };
        format!(
            "{}: {}/{} fetches done ({} tiles, {:.0}s elapsed)",
            phase,
            self.pass_completed,
            self.pass_size,
            self.tiles,
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_counter_is_monotonic_across_passes() {
        let tracker = ProgressTracker::new();
        tracker.begin_run(3);
        tracker.begin_pass(1, 3);
        tracker.record(&TileOutcome::success(0, PathBuf::from("a")));
        tracker.record(&TileOutcome::download_failed(1));
        tracker.record(&TileOutcome::extract_failed(2));
        let first = tracker.snapshot();
        assert_eq!(first.completed, 3);
        assert_eq!(first.pass_completed, 3);

        tracker.begin_pass(2, 2);
        let second = tracker.snapshot();
        assert_eq!(second.completed, 3);
        assert_eq!(second.pass_completed, 0);
        assert!(second.is_retrying());

        tracker.record(&TileOutcome::success(1, PathBuf::from("b")));
        assert_eq!(tracker.completed(), 4);
        assert_eq!(tracker.snapshot().successes, 2);
    }

    #[test]
    fn test_new_run_resets_counters() {
        let tracker = ProgressTracker::new();
        tracker.begin_run(2);
        tracker.begin_pass(1, 2);
        tracker.record(&TileOutcome::success(0, PathBuf::from("a")));
        tracker.record(&TileOutcome::download_failed(1));
        tracker.begin_pass(2, 1);
        tracker.record(&TileOutcome::success(1, PathBuf::from("b")));
        assert_eq!(tracker.completed(), 3);

        tracker.begin_run(4);
        let fresh = tracker.snapshot();
        assert_eq!(fresh.tiles, 4);
        assert_eq!(fresh.completed, 0);
        assert_eq!(fresh.successes, 0);
        assert_eq!(fresh.pass, 0);
        assert_eq!(fresh.pass_completed, 0);
    }

    #[test]
    fn test_status_line() {
        let tracker = ProgressTracker::new();
        tracker.begin_run(5);
        tracker.begin_pass(2, 2);
        let line = tracker.snapshot().status_line();
        assert!(line.starts_with("retry pass 1: 0/2 fetches done (5 tiles"));
    }
}
