//! Tile fetch workers
//!
//! - [`fetcher`] - the Tile Fetch Unit: one download plus one extraction
//! - [`pool`] - bounded pool that runs fetches for one pass at a time
//!
//! The pool knows nothing about retries; that policy lives in
//! [`crate::app::coordinator`].

pub mod fetcher;
pub mod pool;

pub use fetcher::{ArchiveTileFetcher, TileFetcher};
pub use pool::WorkerPool;
