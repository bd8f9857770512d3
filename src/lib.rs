//! DEM Fetcher Library
//!
//! A Rust library for fetching Copernicus DEM elevation tiles that cover an
//! area of interest. Provides concurrent downloading with bounded retries,
//! then merges, clips and writes the tiles as a single raster.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
