//! In-memory elevation rasters on a north-up geographic grid
//!
//! - [`geotiff`] - GeoTIFF read and write (DGED fragments, final product)
//! - [`dted`] - DTED level 0/1/2 reader
//! - [`mosaic`] - Mosaic Builder: merge, crop and mask
//! - [`writer`] - Product Writer: quantization, output, purge
//! - [`preview`] - PNG quick-look rendering

use std::path::Path;

use crate::app::geometry::BoundingBox;
use crate::constants::raster;
use crate::errors::{RasterError, RasterResult};

pub mod dted;
pub mod geotiff;
pub mod mosaic;
pub mod preview;
pub mod writer;

/// Placement of a north-up raster: the north-west corner and cell size in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// Longitude of the western edge
    pub west: f64,
    /// Latitude of the northern edge
    pub north: f64,
    /// Cell width in degrees
    pub pixel_width: f64,
    /// Cell height in degrees, positive
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(west: f64, north: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            west,
            north,
            pixel_width,
            pixel_height,
        }
    }

    /// Centre of cell (`col`, `row`) as (lon, lat)
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.west + (col as f64 + 0.5) * self.pixel_width,
            self.north - (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional (col, row) of a geographic position
    pub fn to_pixel(&self, lon: f64, lat: f64) -> (f64, f64) {
        (
            (lon - self.west) / self.pixel_width,
            (self.north - lat) / self.pixel_height,
        )
    }

    /// Extent covered by `width` x `height` cells
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        BoundingBox::new(
            self.west,
            self.north - height as f64 * self.pixel_height,
            self.west + width as f64 * self.pixel_width,
            self.north,
        )
    }
}

/// Single-band elevation raster, row-major from the north-west corner
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: usize,
    height: usize,
    transform: GeoTransform,
    nodata: f32,
    data: Vec<f32>,
}

impl Raster {
    /// Wrap existing cells, checking the dimensions
    pub fn new(
        width: usize,
        height: usize,
        transform: GeoTransform,
        nodata: f32,
        data: Vec<f32>,
    ) -> RasterResult<Self> {
        if width == 0 || height == 0 || data.len() != width * height {
            return Err(RasterError::DimensionMismatch {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            transform,
            nodata,
            data,
        })
    }

    /// Raster with every cell set to no-data
    pub fn filled(width: usize, height: usize, transform: GeoTransform, nodata: f32) -> Self {
        Self {
            width,
            height,
            transform,
            nodata,
            data: vec![nodata; width * height],
        }
    }

    /// Read a raster fragment, picking the reader from the file extension
    pub fn open(path: &Path) -> RasterResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("tif") | Some("tiff") => geotiff::read(path),
            Some("dt0") | Some("dt1") | Some("dt2") => dted::read(path),
            _ => Err(RasterError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn nodata(&self) -> f32 {
        self.nodata
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn bounds(&self) -> BoundingBox {
        self.transform.bounds(self.width, self.height)
    }

    pub fn is_nodata(&self, value: f32) -> bool {
        value.is_nan() || value == self.nodata
    }

    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        (col < self.width && row < self.height).then(|| self.data[row * self.width + col])
    }

    pub fn set(&mut self, col: usize, row: usize, value: f32) {
        if col < self.width && row < self.height {
            self.data[row * self.width + col] = value;
        }
    }

    /// Valid value of the cell containing a position, if any
    pub fn sample(&self, lon: f64, lat: f64) -> Option<f32> {
        let (x, y) = self.transform.to_pixel(lon, lat);
        if x < 0.0 || y < 0.0 {
            return None;
        }
        let value = self.get(x.floor() as usize, y.floor() as usize)?;
        (!self.is_nodata(value)).then_some(value)
    }

    /// Number of cells holding data
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !self.is_nodata(**v)).count()
    }

    /// Smallest and largest valid value
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|v| !self.is_nodata(*v))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Replace a foreign no-data marker (and NaN) with this crate's float marker
    pub(crate) fn normalize_nodata(&mut self, source_nodata: Option<f32>) {
        let target = raster::FLOAT_NODATA;
        for value in &mut self.data {
            if value.is_nan() || source_nodata.map_or(false, |n| *value == n) {
                *value = target;
            }
        }
        self.nodata = target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raster() -> Raster {
        Raster::new(
            2,
            2,
            GeoTransform::new(8.0, 48.0, 0.5, 0.5),
            -1.0,
            vec![1.0, 2.0, 3.0, -1.0],
        )
        .unwrap()
    }

    #[test]
    fn test_dimension_check() {
        let t = GeoTransform::new(0.0, 1.0, 1.0, 1.0);
        assert!(Raster::new(2, 2, t, 0.0, vec![0.0; 3]).is_err());
        assert!(Raster::new(0, 0, t, 0.0, Vec::new()).is_err());
    }

    #[test]
    fn test_bounds_and_sampling() {
        let raster = sample_raster();
        assert_eq!(raster.bounds(), BoundingBox::new(8.0, 47.0, 9.0, 48.0));
        assert_eq!(raster.sample(8.25, 47.75), Some(1.0));
        assert_eq!(raster.sample(8.75, 47.25), None);
        assert_eq!(raster.sample(7.9, 47.5), None);
        assert_eq!(raster.transform().cell_center(1, 0), (8.75, 47.75));
    }

    #[test]
    fn test_statistics() {
        let raster = sample_raster();
        assert_eq!(raster.valid_count(), 3);
        assert_eq!(raster.min_max(), Some((1.0, 3.0)));
    }

    #[test]
    fn test_normalize_nodata() {
        let mut raster = sample_raster();
        raster.normalize_nodata(Some(-1.0));
        assert_eq!(raster.nodata(), raster::FLOAT_NODATA);
        assert_eq!(raster.data()[3], raster::FLOAT_NODATA);
        assert_eq!(raster.valid_count(), 3);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Raster::open(Path::new("tile.jp2")).unwrap_err();
        assert!(matches!(err, RasterError::UnsupportedFormat { .. }));
    }
}
