//! Core application logic for DEM Fetcher
//!
//! This module contains the tile acquisition pipeline: tile resolution, the
//! HTTP client, the concurrent fetch and retry engine, and the raster mosaic
//! and output stages.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use dem_fetcher::app::{AreaOfInterest, DegreeGrid, DemClient, Pipeline, PipelineConfig};
//!
//! # async fn example() -> dem_fetcher::Result<()> {
//! let aoi = AreaOfInterest::from_geojson_file(Path::new("alps.geojson"))?;
//! let client = Arc::new(DemClient::new()?);
//! let pipeline = Pipeline::with_client(PipelineConfig::default(), client, Arc::new(DegreeGrid))?;
//!
//! let output = pipeline.run(&aoi).await?;
//! println!("{}", output.report.summary_line());
//! for tile in output.report.failed() {
//!     eprintln!("missing tile {} ({})", tile.id, tile.grid_cell_code);
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod client;
pub mod coordinator;
pub mod geometry;
pub mod models;
pub mod pipeline;
pub mod raster;
pub mod resolver;
pub mod worker;

// Re-export main public API
pub use client::{ClientConfig, DemClient};
pub use coordinator::{CoordinatorConfig, ProgressSnapshot, ProgressTracker, RetryCoordinator};
pub use geometry::{AreaOfInterest, BoundingBox, Polygon};
pub use models::{
    DownloadBatchResult, ProductType, Resolution, TileDescriptor, TileId, TileOutcome, TileStatus,
};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutput, PipelineReport};
pub use raster::writer::WriteOptions;
pub use raster::{GeoTransform, Raster};
pub use resolver::{DegreeGrid, FeatureGrid, GridIndex, ManifestSource, TileResolver};
pub use worker::{ArchiveTileFetcher, TileFetcher, WorkerPool};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        // Ensure public API is accessible
        let config = ClientConfig::default();
        assert!(config.tcp_nodelay);
        assert_eq!(PipelineConfig::default().coordinator, CoordinatorConfig::default());
    }
}
