//! Tile index layers
//!
//! A [`GridIndex`] answers one question: which grid cells does an area of
//! interest touch, and in what order. [`DegreeGrid`] computes the answer for
//! the regular one-degree tiling, [`FeatureGrid`] reads cells from a GeoJSON
//! tile index.

use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::app::geometry::{parse_polygon, AreaOfInterest, BoundingBox, Polygon};
use crate::constants::copernicus;
use crate::errors::{ResolutionError, ResolutionResult};

/// A tile index layer
pub trait GridIndex: Send + Sync {
    /// Codes of every cell intersecting the area, deterministic and duplicate-free
    fn intersecting_cells(&self, aoi: &AreaOfInterest) -> Vec<String>;
}

/// Regular one-degree geographic grid
#[derive(Debug, Clone, Copy, Default)]
pub struct DegreeGrid;

impl DegreeGrid {
    pub fn new() -> Self {
        Self
    }

    /// Code of the cell whose south-west corner is at the given integer degrees
    pub fn cell_code(south: i32, west: i32) -> String {
        let ns = if south >= 0 { 'N' } else { 'S' };
        let ew = if west >= 0 { 'E' } else { 'W' };
        format!("{}{:02}_00_{}{:03}_00", ns, south.abs(), ew, west.abs())
    }

    /// Bounds of a cell from its code, `None` if the code is malformed
    pub fn cell_bounds(code: &str) -> Option<BoundingBox> {
        let parts: Vec<&str> = code.split('_').collect();
        if parts.len() != 4 {
            return None;
        }
        let lat = parse_hemisphere(parts[0], 'N', 'S')?;
        let lon = parse_hemisphere(parts[2], 'E', 'W')?;
        let south = lat + parts[1].parse::<f64>().ok()? / 100.0;
        let west = lon + parts[3].parse::<f64>().ok()? / 100.0;
        Some(BoundingBox::new(west, south, west + 1.0, south + 1.0))
    }
}

fn parse_hemisphere(token: &str, positive: char, negative: char) -> Option<f64> {
    let mut chars = token.chars();
    let sign = match chars.next()? {
        c if c == positive => 1.0,
        c if c == negative => -1.0,
        _ => return None,
    };
    let digits = chars.as_str();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(sign * digits.parse::<f64>().ok()?)
}

impl GridIndex for DegreeGrid {
    fn intersecting_cells(&self, aoi: &AreaOfInterest) -> Vec<String> {
        let bbox = aoi.bbox();
        let south = (bbox.min_lat.floor() as i32).clamp(-90, 89);
        let north = ((bbox.max_lat.ceil() as i32) - 1).clamp(south, 89);
        let west = (bbox.min_lon.floor() as i32).clamp(-180, 179);
        let east = ((bbox.max_lon.ceil() as i32) - 1).clamp(west, 179);

        let mut cells = Vec::new();
        // North to south, west to east
        for lat in (south..=north).rev() {
            for lon in west..=east {
                let cell = BoundingBox::new(
                    lon as f64,
                    lat as f64,
                    lon as f64 + 1.0,
                    lat as f64 + 1.0,
                )
                .to_polygon();
                if aoi.intersects(&cell) {
                    cells.push(Self::cell_code(lat, lon));
                }
            }
        }

        debug!("Degree grid: {} candidate cells intersect the AOI", cells.len());
        cells
    }
}

/// Tile index read from a GeoJSON FeatureCollection
#[derive(Debug, Clone)]
pub struct FeatureGrid {
    cells: Vec<(String, Polygon)>,
}

impl FeatureGrid {
    /// Build from already parsed cells
    pub fn new(cells: Vec<(String, Polygon)>) -> Self {
        Self { cells }
    }

    /// Load cells from a GeoJSON file, reading the code from `code_property`
    pub fn from_geojson_file(path: &Path, code_property: &str) -> ResolutionResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_geojson_str(&content, code_property, &path.display().to_string())
    }

    /// Load cells from a GeoJSON string
    pub fn from_geojson_str(
        content: &str,
        code_property: &str,
        source_name: &str,
    ) -> ResolutionResult<Self> {
        let value: Value = serde_json::from_str(content)?;
        let features = value
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ResolutionError::invalid_geometry(source_name, "tile index must be a FeatureCollection")
            })?;

        let mut cells = Vec::with_capacity(features.len());
        for feature in features {
            let code = feature
                .get("properties")
                .and_then(|p| p.get(code_property))
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ResolutionError::invalid_geometry(
                        source_name,
                        format!("feature without '{}' property", code_property),
                    )
                })?;
            let coords = feature
                .get("geometry")
                .filter(|g| g.get("type").and_then(Value::as_str) == Some("Polygon"))
                .and_then(|g| g.get("coordinates"))
                .ok_or_else(|| {
                    ResolutionError::invalid_geometry(
                        source_name,
                        format!("cell {} is not a polygon", code),
                    )
                })?;
            cells.push((code.to_string(), parse_polygon(coords, source_name)?));
        }

        Ok(Self { cells })
    }

    /// Number of cells in the index
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl GridIndex for FeatureGrid {
    fn intersecting_cells(&self, aoi: &AreaOfInterest) -> Vec<String> {
        let mut seen = HashSet::new();
        self.cells
            .iter()
            .filter(|(_, polygon)| aoi.intersects(polygon))
            .filter(|(code, _)| seen.insert(code.clone()))
            .map(|(code, _)| code.clone())
            .collect()
    }
}

/// Default code property for feature grids
pub fn default_code_property() -> &'static str {
    copernicus::GRID_CODE_PROPERTY
}
