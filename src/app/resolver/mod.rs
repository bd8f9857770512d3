//! Tile Resolver: area of interest to ordered tile descriptors
//!
//! Resolution runs in three steps:
//! 1. intersect the AOI with the tile index ([`GridIndex`]) to get cell codes
//! 2. retrieve and parse the dataset manifest ([`ManifestSource`])
//! 3. join cells against manifest entries, assigning ordinal ids in cell order
//!
//! Cells with no manifest entry (open ocean, unpublished tiles) are skipped
//! without error. Every failure here is fatal and happens before any download.

use std::sync::Arc;

use tracing::{debug, info};

use crate::app::geometry::AreaOfInterest;
use crate::app::models::{ProductType, Resolution, TileDescriptor};
use crate::errors::{ResolutionError, ResolutionResult};

pub mod grid;
pub mod manifest;

pub use grid::{DegreeGrid, FeatureGrid, GridIndex};
pub use manifest::{manifest_url, Manifest, ManifestEntry, ManifestSource};

/// Maps an area of interest to the tiles that cover it
pub struct TileResolver {
    grid: Arc<dyn GridIndex>,
    source: Arc<dyn ManifestSource>,
    manifest_base_url: String,
    resolution: Resolution,
    product: ProductType,
}

impl TileResolver {
    pub fn new(
        grid: Arc<dyn GridIndex>,
        source: Arc<dyn ManifestSource>,
        manifest_base_url: impl Into<String>,
        resolution: Resolution,
        product: ProductType,
    ) -> Self {
        Self {
            grid,
            source,
            manifest_base_url: manifest_base_url.into(),
            resolution,
            product,
        }
    }

    /// Manifest URL for the configured dataset
    pub fn manifest_url(&self) -> String {
        manifest_url(&self.manifest_base_url, self.resolution, self.product)
    }

    /// Resolve the tiles covering `aoi`
    ///
    /// The result is non-empty, duplicate-free and deterministic for a fixed
    /// AOI and manifest. Ids are `0..n` in cell order.
    ///
    /// # Errors
    ///
    /// - [`ResolutionError::NoIntersectingCells`] if the AOI touches no cell
    /// - [`ResolutionError::ManifestUnavailable`] / [`ResolutionError::ManifestUnparseable`]
    ///   if the manifest cannot be used
    /// - [`ResolutionError::NoMatchingTiles`] if no intersecting cell is published
    pub async fn resolve(&self, aoi: &AreaOfInterest) -> ResolutionResult<Vec<TileDescriptor>> {
        let cells = self.grid.intersecting_cells(aoi);
        if cells.is_empty() {
            return Err(ResolutionError::NoIntersectingCells);
        }
        debug!("AOI intersects {} grid cells", cells.len());

        let url = self.manifest_url();
        info!("Retrieving tile manifest from {}", url);
        let body = self.source.fetch_manifest(&url).await?;
        let manifest = Manifest::parse(&body, &url)?;

        let descriptors = join_cells(&cells, &manifest);
        if descriptors.is_empty() {
            return Err(ResolutionError::NoMatchingTiles { cells: cells.len() });
        }

        let skipped = cells.len() - descriptors.len();
        if skipped > 0 {
            debug!("{} intersecting cells have no published tile", skipped);
        }
        info!(
            "Resolved {} tiles for {} intersecting cells",
            descriptors.len(),
            cells.len()
        );
        Ok(descriptors)
    }
}

/// Join cell codes against the manifest, keeping cell order
pub fn join_cells(cells: &[String], manifest: &Manifest) -> Vec<TileDescriptor> {
    cells
        .iter()
        .filter_map(|code| manifest.lookup(code))
        .enumerate()
        .map(|(id, entry)| TileDescriptor {
            id,
            remote_url: entry.url.clone(),
            local_archive_name: entry.archive_name.clone(),
            grid_cell_code: entry.cell_code.clone(),
        })
        .collect()
}
