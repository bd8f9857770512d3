//! Product Writer
//!
//! Serializes the mosaic as GeoTIFF, either as 32-bit floats or quantized to
//! 16-bit integers, optionally retains the extracted tiles, and purges the
//! working files of a run.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{geotiff, Raster};
use crate::constants::{files, raster};
use crate::errors::{WriteError, WriteResult};

/// Output encoding options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteOptions {
    /// Store `round(value * multiplier)` as i16 instead of f32
    pub quantize: bool,
    /// Quantization multiplier, ignored unless `quantize` is set
    pub multiplier: f64,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            quantize: false,
            multiplier: raster::DEFAULT_MULTIPLIER,
        }
    }
}

/// Quantize to `round(value * multiplier)`
///
/// No-data becomes [`raster::INT_NODATA`]. A valid cell whose scaled value
/// falls outside the i16 range above the no-data marker fails the whole
/// conversion with [`WriteError::QuantizeOverflow`].
pub fn quantize(source: &Raster, multiplier: f64) -> WriteResult<Vec<i16>> {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return Err(WriteError::InvalidMultiplier { multiplier });
    }

    let low = f64::from(raster::INT_NODATA) + 1.0;
    let high = f64::from(i16::MAX);
    let mut values = Vec::with_capacity(source.data().len());
    let mut overflow: Option<(usize, f32)> = None;

    for &v in source.data() {
        if source.is_nodata(v) {
            values.push(raster::INT_NODATA);
            continue;
        }
        let scaled = (f64::from(v) * multiplier).round();
        if (low..=high).contains(&scaled) {
            values.push(scaled as i16);
        } else {
            overflow = Some(match overflow {
                None => (1, v),
                Some((count, worst)) if v.abs() > worst.abs() => (count + 1, v),
                Some((count, worst)) => (count + 1, worst),
            });
            values.push(raster::INT_NODATA);
        }
    }

    match overflow {
        Some((count, max_value)) => Err(WriteError::QuantizeOverflow {
            count,
            max_value,
            multiplier,
        }),
        None => Ok(values),
    }
}

/// Write the product, replacing any existing file at `path`
pub fn write(source: &Raster, path: &Path, options: WriteOptions) -> WriteResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| WriteError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    if options.quantize {
        let values = quantize(source, options.multiplier)?;
        geotiff::write_i16(source, &values, raster::INT_NODATA, path)?;
        info!(
            "Wrote {} ({}x{}, int16 x{})",
            path.display(),
            source.width(),
            source.height(),
            options.multiplier
        );
    } else {
        geotiff::write_f32(source, path)?;
        info!(
            "Wrote {} ({}x{}, float32)",
            path.display(),
            source.width(),
            source.height()
        );
    }
    Ok(())
}

/// Copy extracted tiles to `<output_dir>/tiles/<cell code>.<ext>`
///
/// Failures are logged and skipped. Returns the copies that were made.
pub fn keep_tiles(fragments: &[(String, PathBuf)], output_dir: &Path) -> Vec<PathBuf> {
    let target_dir = output_dir.join(files::KEPT_TILES_DIR);
    if let Err(e) = fs::create_dir_all(&target_dir) {
        warn!("Cannot create {}: {}", target_dir.display(), e);
        return Vec::new();
    }

    let mut kept = Vec::with_capacity(fragments.len());
    for (cell_code, fragment) in fragments {
        let mut name = cell_code.clone();
        if let Some(ext) = fragment.extension().and_then(|e| e.to_str()) {
            name.push('.');
            name.push_str(ext);
        }
        let target = target_dir.join(name);
        match fs::copy(fragment, &target) {
            Ok(_) => kept.push(target),
            Err(e) => warn!("Failed to keep tile {}: {}", fragment.display(), e),
        }
    }

    debug!("Kept {} tiles in {}", kept.len(), target_dir.display());
    kept
}

/// Remove the per-tile files of a run, then the working directory if empty
///
/// Never fails: anything that cannot be removed is logged and left behind.
pub fn purge(paths: &[PathBuf], work_dir: &Path) {
    let mut removed = 0usize;
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }

    // Only succeeds when nothing else lives in the directory
    if fs::remove_dir(work_dir).is_ok() {
        debug!("Removed working directory {}", work_dir.display());
    }
    debug!("Purged {} working files", removed);
}
