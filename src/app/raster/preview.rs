//! Quick-look PNG rendering of the final product

use std::path::{Path, PathBuf};

use image::{GrayAlphaImage, LumaA};
use tracing::debug;

use super::Raster;
use crate::constants::files;
use crate::errors::{WriteError, WriteResult};

/// Preview path next to the product: `dem.tif` -> `dem_preview.png`
pub fn preview_path(product: &Path) -> PathBuf {
    let stem = product
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dem".to_string());
    product.with_file_name(format!("{}{}", stem, files::PREVIEW_SUFFIX))
}

/// Render a grey-scale image, linearly stretched between the minimum and
/// maximum valid elevation. No-data cells are fully transparent.
pub fn render(source: &Raster) -> GrayAlphaImage {
    let (low, high) = source.min_max().unwrap_or((0.0, 0.0));
    let range = high - low;
    let width = source.width();

    GrayAlphaImage::from_fn(source.width() as u32, source.height() as u32, |x, y| {
        let value = source.data()[y as usize * width + x as usize];
        if source.is_nodata(value) {
            return LumaA([0, 0]);
        }
        let level = if range > 0.0 {
            ((value - low) / range * 255.0).round().clamp(0.0, 255.0) as u8
        } else {
            128
        };
        LumaA([level, 255])
    })
}

/// Render and save the preview
pub fn write_preview(source: &Raster, path: &Path) -> WriteResult<()> {
    render(source)
        .save(path)
        .map_err(|e| WriteError::Preview {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    debug!("Wrote preview {}", path.display());
    Ok(())
}
