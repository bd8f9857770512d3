//! Data models shared across the tile acquisition pipeline
//!
//! This module contains the dataset selectors ([`Resolution`], [`ProductType`]),
//! the immutable [`TileDescriptor`] produced by the resolver, and the
//! per-attempt [`TileOutcome`] and aggregated [`DownloadBatchResult`] produced
//! by the retry coordinator.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::copernicus;

/// Stable ordinal addressing a tile throughout a run
pub type TileId = usize;

/// Source resolution of the elevation dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Resolution {
    /// 1 arc-second (~30 m) posting
    #[default]
    #[serde(rename = "30m")]
    Res30m,
    /// 3 arc-second (~90 m) posting
    #[serde(rename = "90m")]
    Res90m,
}

impl Resolution {
    /// Dataset name used in manifest listings (e.g. "GLO-30")
    pub fn dataset_name(&self) -> &'static str {
        match self {
            Resolution::Res30m => "GLO-30",
            Resolution::Res90m => "GLO-90",
        }
    }

    /// Resolution code embedded in archive names
    pub fn archive_code(&self) -> &'static str {
        match self {
            Resolution::Res30m => "10",
            Resolution::Res90m => "30",
        }
    }

    /// Nominal posting in arc-seconds along latitude
    pub fn arc_seconds(&self) -> f64 {
        match self {
            Resolution::Res30m => 1.0,
            Resolution::Res90m => 3.0,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Res30m => write!(f, "30m"),
            Resolution::Res90m => write!(f, "90m"),
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "30" | "30m" | "glo-30" => Ok(Resolution::Res30m),
            "90" | "90m" | "glo-90" => Ok(Resolution::Res90m),
            other => Err(format!("unknown resolution '{}', expected 30m or 90m", other)),
        }
    }
}

/// Product encoding of the elevation dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductType {
    /// Defence Gridded Elevation Data, shipped as GeoTIFF
    #[default]
    Dged,
    /// Digital Terrain Elevation Data, shipped as DTED
    Dted,
}

impl ProductType {
    /// Raster member extension inside the archive for a resolution
    pub fn member_extension(&self, resolution: Resolution) -> &'static str {
        match (self, resolution) {
            (ProductType::Dged, _) => "tif",
            (ProductType::Dted, Resolution::Res30m) => "dt2",
            (ProductType::Dted, Resolution::Res90m) => "dt1",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductType::Dged => write!(f, "DGED"),
            ProductType::Dted => write!(f, "DTED"),
        }
    }
}

impl FromStr for ProductType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DGED" => Ok(ProductType::Dged),
            "DTED" => Ok(ProductType::Dted),
            other => Err(format!("unknown product type '{}', expected DGED or DTED", other)),
        }
    }
}

/// One remote tile to fetch, produced once by the resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileDescriptor {
    /// Ordinal in resolution order; the only addressing key downstream
    pub id: TileId,
    /// Archive URL
    pub remote_url: String,
    /// Archive file name (last URL path segment)
    pub local_archive_name: String,
    /// Grid cell code, e.g. `N47_00_E008_00`
    pub grid_cell_code: String,
}

impl TileDescriptor {
    /// Archive name without the `.tar` extension
    pub fn archive_base_name(&self) -> &str {
        self.local_archive_name
            .strip_suffix(copernicus::ARCHIVE_EXTENSION)
            .unwrap_or(&self.local_archive_name)
    }

    /// Path of the raster member inside the archive
    ///
    /// Derived from the archive base name, never discovered by listing.
    pub fn raster_member(&self, extension: &str) -> String {
        let base = self.archive_base_name();
        format!(
            "{base}/{dir}/{base}_DEM.{extension}",
            dir = copernicus::RASTER_MEMBER_DIR
        )
    }

    /// Per-tile archive download path inside the working directory
    pub fn archive_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(format!("{:05}_{}", self.id, self.local_archive_name))
    }

    /// Per-tile extracted raster path inside the working directory
    pub fn fragment_path(&self, work_dir: &Path, extension: &str) -> PathBuf {
        work_dir.join(format!(
            "{:05}_{}_DEM.{}",
            self.id,
            self.archive_base_name(),
            extension
        ))
    }
}

/// Result of one fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileStatus {
    /// Archive downloaded and raster extracted
    Success,
    /// Download failed or timed out
    DownloadFailed,
    /// Download succeeded but extraction failed
    ExtractFailed,
}

impl TileStatus {
    /// Whether this status is terminal for the tile
    pub fn is_success(&self) -> bool {
        matches!(self, TileStatus::Success)
    }
}

impl fmt::Display for TileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileStatus::Success => write!(f, "success"),
            TileStatus::DownloadFailed => write!(f, "download_failed"),
            TileStatus::ExtractFailed => write!(f, "extract_failed"),
        }
    }
}

/// Outcome of the most recent fetch attempt for a tile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileOutcome {
    /// Tile ordinal
    pub id: TileId,
    /// Attempt status
    pub status: TileStatus,
    /// Extracted raster, present only on success
    pub extracted_path: Option<PathBuf>,
}

impl TileOutcome {
    /// Successful outcome
    pub fn success(id: TileId, extracted_path: PathBuf) -> Self {
        Self {
            id,
            status: TileStatus::Success,
            extracted_path: Some(extracted_path),
        }
    }

    /// Download failure
    pub fn download_failed(id: TileId) -> Self {
        Self {
            id,
            status: TileStatus::DownloadFailed,
            extracted_path: None,
        }
    }

    /// Extraction failure
    pub fn extract_failed(id: TileId) -> Self {
        Self {
            id,
            status: TileStatus::ExtractFailed,
            extracted_path: None,
        }
    }
}

/// Aggregated status after the initial pass and every retry pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadBatchResult {
    /// Latest outcome per tile id
    pub outcomes: BTreeMap<TileId, TileOutcome>,
    /// Ids whose latest attempt failed to download
    pub still_failed_download: BTreeSet<TileId>,
    /// Ids whose latest attempt failed to extract
    pub still_failed_extract: BTreeSet<TileId>,
    /// Passes executed, including the initial one
    pub passes: u32,
}

impl DownloadBatchResult {
    /// Replace the outcome of each tile and recompute both failure sets
    pub fn record(&mut self, outcomes: impl IntoIterator<Item = TileOutcome>) {
        for outcome in outcomes {
            self.outcomes.insert(outcome.id, outcome);
        }
        self.reclassify();
    }

    fn reclassify(&mut self) {
        self.still_failed_download.clear();
        self.still_failed_extract.clear();
        for outcome in self.outcomes.values() {
            match outcome.status {
                TileStatus::Success => {}
                TileStatus::DownloadFailed => {
                    self.still_failed_download.insert(outcome.id);
                }
                TileStatus::ExtractFailed => {
                    self.still_failed_extract.insert(outcome.id);
                }
            }
        }
    }

    /// Whether both failure sets are empty
    pub fn is_complete(&self) -> bool {
        self.still_failed_download.is_empty() && self.still_failed_extract.is_empty()
    }

    /// All ids to re-dispatch, in id order
    pub fn failed_ids(&self) -> Vec<TileId> {
        self.still_failed_download
            .union(&self.still_failed_extract)
            .copied()
            .collect()
    }

    /// Number of tiles whose latest attempt succeeded
    pub fn success_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| o.status.is_success())
            .count()
    }

    /// Extracted raster paths in tile id (resolution) order
    pub fn fragments(&self) -> Vec<PathBuf> {
        self.outcomes
            .values()
            .filter_map(|o| match o.status {
                TileStatus::Success => o.extracted_path.clone(),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> TileDescriptor {
        TileDescriptor {
            id: 7,
            remote_url: "https://example.com/Copernicus_DSM_10_N47_00_E008_00.tar".to_string(),
            local_archive_name: "Copernicus_DSM_10_N47_00_E008_00.tar".to_string(),
            grid_cell_code: "N47_00_E008_00".to_string(),
        }
    }

    #[test]
    fn test_raster_member_is_derived_from_base_name() {
        let d = descriptor();
        assert_eq!(d.archive_base_name(), "Copernicus_DSM_10_N47_00_E008_00");
        assert_eq!(
            d.raster_member("tif"),
            "Copernicus_DSM_10_N47_00_E008_00/DEM/Copernicus_DSM_10_N47_00_E008_00_DEM.tif"
        );
    }

    #[test]
    fn test_working_paths_are_unique_per_tile() {
        let d = descriptor();
        let other = TileDescriptor { id: 8, ..d.clone() };
        let work = Path::new("/tmp/work");
        assert_ne!(d.archive_path(work), other.archive_path(work));
        assert_ne!(d.fragment_path(work, "tif"), other.fragment_path(work, "tif"));
    }

    #[test]
    fn test_resolution_and_product_parsing() {
        assert_eq!("90m".parse::<Resolution>().unwrap(), Resolution::Res90m);
        assert_eq!("30".parse::<Resolution>().unwrap(), Resolution::Res30m);
        assert!("45m".parse::<Resolution>().is_err());
        assert_eq!("dted".parse::<ProductType>().unwrap(), ProductType::Dted);
        assert_eq!(ProductType::Dted.member_extension(Resolution::Res90m), "dt1");
    }

    #[test]
    fn test_batch_result_replaces_previous_status() {
        let mut result = DownloadBatchResult::default();
        result.record(vec![
            TileOutcome::success(0, PathBuf::from("a.tif")),
            TileOutcome::download_failed(1),
            TileOutcome::extract_failed(2),
        ]);
        assert_eq!(result.failed_ids(), vec![1, 2]);
        assert!(!result.is_complete());

        result.record(vec![
            TileOutcome::success(1, PathBuf::from("b.tif")),
            TileOutcome::download_failed(2),
        ]);
        assert!(result.still_failed_extract.is_empty());
        assert_eq!(result.still_failed_download.len(), 1);
        assert!(result.still_failed_download.contains(&2));
        assert_eq!(
            result.fragments(),
            vec![PathBuf::from("a.tif"), PathBuf::from("b.tif")]
        );
    }
}
