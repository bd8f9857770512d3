//! Mosaic Builder
//!
//! Fragments are merged in list order with first-writer-wins semantics: a
//! cell already holding data is never overwritten by a later fragment. The
//! list order is the resolution order, so the result does not depend on
//! which download finished first.
//!
//! The merged raster is then cropped to the AOI bounding rectangle (snapping
//! inward to whole cells, outward where the AOI is narrower than a cell) and
//! every cell whose centre lies outside the AOI polygons is set to no-data.

use std::path::PathBuf;

use tracing::{debug, info};

use super::{GeoTransform, Raster};
use crate::app::geometry::{AreaOfInterest, BoundingBox};
use crate::constants::raster;
use crate::errors::{MergeError, MergeResult};

/// Tolerance, in cells, when snapping extents to the grid
const SNAP_EPSILON: f64 = 1e-6;

/// Read, merge, crop and mask the fragments to the AOI
///
/// Each fragment is cropped to the AOI rectangle as it is read so memory
/// stays proportional to the AOI rather than to the full tiles.
pub fn build(fragments: &[PathBuf], aoi: &AreaOfInterest) -> MergeResult<Raster> {
    if fragments.is_empty() {
        return Err(MergeError::NoFragments);
    }

    let bbox = aoi.bbox();
    let mut windows = Vec::with_capacity(fragments.len());
    for path in fragments {
        let fragment = Raster::open(path).map_err(|source| MergeError::Fragment {
            path: path.clone(),
            source,
        })?;
        match crop(&fragment, &bbox) {
            Ok(window) => windows.push(window),
            Err(MergeError::EmptyIntersection) => {
                debug!("Fragment {} lies outside the AOI rectangle", path.display());
            }
            Err(e) => return Err(e),
        }
    }
    if windows.is_empty() {
        return Err(MergeError::EmptyIntersection);
    }

    let merged = merge(&windows)?;
    let mut result = crop(&merged, &bbox)?;
    mask(&mut result, aoi);

    info!(
        "Mosaic of {} fragments: {}x{} cells, {} with data",
        windows.len(),
        result.width(),
        result.height(),
        result.valid_count()
    );
    Ok(result)
}

/// Merge rasters in order; earlier rasters win where they hold data
///
/// A single raster is returned as is. Otherwise the output covers the union
/// of all extents at the finest cell size among the inputs.
pub fn merge(rasters: &[Raster]) -> MergeResult<Raster> {
    let (first, rest) = rasters.split_first().ok_or(MergeError::NoFragments)?;
    if rest.is_empty() {
        return Ok(first.clone());
    }

    let extent = rest
        .iter()
        .fold(first.bounds(), |acc, r| acc.union(&r.bounds()));
    let pixel_width = rasters
        .iter()
        .map(|r| r.transform().pixel_width)
        .fold(f64::INFINITY, f64::min);
    let pixel_height = rasters
        .iter()
        .map(|r| r.transform().pixel_height)
        .fold(f64::INFINITY, f64::min);

    let width = cell_count(extent.width(), pixel_width);
    let height = cell_count(extent.height(), pixel_height);
    let transform = GeoTransform::new(extent.min_lon, extent.max_lat, pixel_width, pixel_height);
    let mut output = Raster::filled(width, height, transform, raster::FLOAT_NODATA);

    for source in rasters {
        let Some((cols, rows)) = window(&transform, width, height, &source.bounds()) else {
            continue;
        };
        for row in rows {
            for col in cols.clone() {
                if !output.is_nodata(output.data[row * width + col]) {
                    continue;
                }
                let (lon, lat) = transform.cell_center(col, row);
                if let Some(value) = source.sample(lon, lat) {
                    output.data[row * width + col] = value;
                }
            }
        }
    }

    Ok(output)
}

/// Crop to the cells lying fully inside `bbox`
///
/// On an axis where `bbox` is narrower than one cell, the cells whose
/// footprint overlaps it are kept instead, so an AOI inside the coverage
/// always yields at least one cell.
pub fn crop(source: &Raster, bbox: &BoundingBox) -> MergeResult<Raster> {
    let t = source.transform();
    let (x0, y0) = t.to_pixel(bbox.min_lon, bbox.max_lat);
    let (x1, y1) = t.to_pixel(bbox.max_lon, bbox.min_lat);

    let (col0, col1) = axis_range(x0, x1, source.width()).ok_or(MergeError::EmptyIntersection)?;
    let (row0, row1) = axis_range(y0, y1, source.height()).ok_or(MergeError::EmptyIntersection)?;
    if col0 == 0 && row0 == 0 && col1 == source.width() && row1 == source.height() {
        return Ok(source.clone());
    }

    let width = col1 - col0;
    let height = row1 - row0;
    let mut data = Vec::with_capacity(width * height);
    for row in row0..row1 {
        let start = row * source.width();
        data.extend_from_slice(&source.data[start + col0..start + col1]);
    }

    let transform = GeoTransform::new(
        t.west + col0 as f64 * t.pixel_width,
        t.north - row0 as f64 * t.pixel_height,
        t.pixel_width,
        t.pixel_height,
    );
    Ok(Raster {
        width,
        height,
        transform,
        nodata: source.nodata(),
        data,
    })
}

/// Cell range for the fractional span `[a, b]`, inward first, then outward
fn axis_range(a: f64, b: f64, len: usize) -> Option<(usize, usize)> {
    let inner0 = (a - SNAP_EPSILON).ceil().max(0.0);
    let inner1 = (b + SNAP_EPSILON).floor().min(len as f64);
    if inner0 < inner1 {
        return Some((inner0 as usize, inner1 as usize));
    }

    let outer0 = (a + SNAP_EPSILON).floor();
    let outer1 = (b - SNAP_EPSILON).ceil().max(outer0 + 1.0);
    let start = outer0.max(0.0);
    let end = outer1.min(len as f64);
    (start < end).then_some((start as usize, end as usize))
}

/// Set every cell whose centre is outside the AOI to no-data
///
/// When no cell centre falls inside the AOI at all, the AOI is finer than the
/// grid and the cells are left as they are.
pub fn mask(target: &mut Raster, aoi: &AreaOfInterest) {
    let t = *target.transform();
    let width = target.width();
    let nodata = target.nodata();
    let mut keep = vec![false; width * target.height()];

    for (row, inside) in keep.chunks_exact_mut(width).enumerate() {
        let (_, lat) = t.cell_center(0, row);
        for polygon in aoi.polygons() {
            let crossings = polygon.scanline_crossings(lat);
            for span in crossings.chunks_exact(2) {
                // Cells whose centre x satisfies span[0] <= x < span[1]
                let first = ((span[0] - t.west) / t.pixel_width - 0.5).ceil().max(0.0) as usize;
                let end = ((span[1] - t.west) / t.pixel_width - 0.5).ceil().max(0.0) as usize;
                for flag in inside.iter_mut().take(end.min(width)).skip(first) {
                    *flag = true;
                }
            }
        }
    }

    if !keep.iter().any(|k| *k) {
        debug!("No cell centre inside the AOI; keeping the covering cells");
        return;
    }
    for (value, inside) in target.data.iter_mut().zip(&keep) {
        if !inside {
            *value = nodata;
        }
    }
}

fn cell_count(extent: f64, size: f64) -> usize {
    ((extent / size) - SNAP_EPSILON).ceil().max(1.0) as usize
}

/// Output cells whose centres fall inside `bounds`
fn window(
    transform: &GeoTransform,
    width: usize,
    height: usize,
    bounds: &BoundingBox,
) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
    let (x0, y0) = transform.to_pixel(bounds.min_lon, bounds.max_lat);
    let (x1, y1) = transform.to_pixel(bounds.max_lon, bounds.min_lat);
    let col0 = (x0 - 0.5).ceil().max(0.0) as usize;
    let row0 = (y0 - 0.5).ceil().max(0.0) as usize;
    let col1 = ((x1 - 0.5).ceil().max(0.0) as usize).min(width);
    let row1 = ((y1 - 0.5).ceil().max(0.0) as usize).min(height);
    (col0 < col1 && row0 < row1).then_some((col0..col1, row0..row1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::geometry::Polygon;

    const ND: f32 = raster::FLOAT_NODATA;

    fn tile(west: f64, north: f64, size: usize, value: f32) -> Raster {
        let step = 1.0 / size as f64;
        Raster::new(
            size,
            size,
            GeoTransform::new(west, north, step, step),
            ND,
            vec![value; size * size],
        )
        .unwrap()
    }

    #[test]
    fn test_merge_requires_fragments() {
        assert!(matches!(merge(&[]), Err(MergeError::NoFragments)));
        let aoi = AreaOfInterest::from_bbox(BoundingBox::new(0.0, 0.0, 1.0, 1.0)).unwrap();
        assert!(matches!(build(&[], &aoi), Err(MergeError::NoFragments)));
    }

    #[test]
    fn test_merge_side_by_side() {
        let west = tile(0.0, 1.0, 4, 1.0);
        let east = tile(1.0, 1.0, 4, 2.0);
        let merged = merge(&[west, east]).unwrap();

        assert_eq!((merged.width(), merged.height()), (8, 4));
        assert_eq!(merged.bounds(), BoundingBox::new(0.0, 0.0, 2.0, 1.0));
        assert_eq!(merged.get(3, 0), Some(1.0));
        assert_eq!(merged.get(4, 0), Some(2.0));
        assert_eq!(merged.valid_count(), 32);
    }

    #[test]
    fn test_first_writer_wins_on_overlap() {
        let a = tile(0.0, 1.0, 4, 1.0);
        let b = tile(0.5, 1.0, 4, 2.0);
        let ab = merge(&[a.clone(), b.clone()]).unwrap();
        let ba = merge(&[b, a]).unwrap();

        // Overlap column at lon 0.625 belongs to whichever came first
        assert_eq!(ab.sample(0.625, 0.5), Some(1.0));
        assert_eq!(ba.sample(0.625, 0.5), Some(2.0));
        assert_eq!(ab.sample(1.25, 0.5), Some(2.0));
    }

    #[test]
    fn test_later_fragment_fills_nodata() {
        let mut a = tile(0.0, 1.0, 2, 1.0);
        a.set(0, 0, ND);
        let b = tile(0.0, 1.0, 2, 7.0);
        let merged = merge(&[a, b]).unwrap();
        assert_eq!(merged.get(0, 0), Some(7.0));
        assert_eq!(merged.get(1, 1), Some(1.0));
    }

    #[test]
    fn test_merge_mixed_resolution_uses_finest() {
        let coarse = tile(0.0, 1.0, 2, 1.0);
        let fine = tile(1.0, 1.0, 4, 2.0);
        let merged = merge(&[coarse, fine]).unwrap();
        assert_eq!((merged.width(), merged.height()), (8, 4));
        assert_eq!(merged.valid_count(), 32);
    }

    #[test]
    fn test_crop_snaps_inward() {
        let source = tile(0.0, 1.0, 4, 1.0);
        let cropped = crop(&source, &BoundingBox::new(0.1, 0.3, 0.8, 1.0)).unwrap();
        // Columns [0.25, 0.75), rows [0.5, 1.0)
        assert_eq!(cropped.bounds(), BoundingBox::new(0.25, 0.5, 0.75, 1.0));
        assert!(matches!(
            crop(&source, &BoundingBox::new(2.0, 2.0, 3.0, 3.0)),
            Err(MergeError::EmptyIntersection)
        ));
    }

    #[test]
    fn test_crop_narrower_than_a_cell_keeps_covering_cells() {
        let source = tile(8.0, 48.0, 10, 1.0);
        let cropped = crop(&source, &BoundingBox::new(8.52, 47.52, 8.58, 47.58)).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (1, 1));
        assert_eq!(cropped.sample(8.55, 47.55), Some(1.0));

        // Wide in longitude, sub-cell in latitude
        let strip = crop(&source, &BoundingBox::new(8.2, 47.51, 8.6, 47.55)).unwrap();
        assert_eq!((strip.width(), strip.height()), (4, 1));

        // Touching the edge is not an overlap
        assert!(matches!(
            crop(&source, &BoundingBox::new(9.0, 47.2, 9.5, 47.8)),
            Err(MergeError::EmptyIntersection)
        ));
    }

    #[test]
    fn test_crop_on_exact_edges_keeps_cells() {
        let source = tile(0.0, 1.0, 10, 1.0);
        let cropped = crop(&source, &BoundingBox::new(0.2, 0.3, 0.7, 0.9)).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (5, 6));
    }

    #[test]
    fn test_mask_uses_cell_centres() {
        let mut source = tile(0.0, 1.0, 4, 1.0);
        let triangle = Polygon::new(
            vec![(0.0, 0.0), (1.0, 0.0), (0.0, 0.9), (0.0, 0.0)],
            Vec::new(),
        );
        let aoi = AreaOfInterest::new(vec![triangle]).unwrap();
        mask(&mut source, &aoi);

        for row in 0..4 {
            for col in 0..4 {
                let (lon, lat) = source.transform().cell_center(col, row);
                let value = source.get(col, row).unwrap();
                assert_eq!(!source.is_nodata(value), aoi.contains(lon, lat), "cell {col},{row}");
            }
        }
        assert_eq!(source.valid_count(), 6);
    }

    #[test]
    fn test_mask_honours_holes() {
        let mut source = tile(0.0, 1.0, 4, 1.0);
        let ring = Polygon::new(
            vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)],
            vec![vec![(0.25, 0.25), (0.75, 0.25), (0.75, 0.75), (0.25, 0.75), (0.25, 0.25)]],
        );
        mask(&mut source, &AreaOfInterest::new(vec![ring]).unwrap());
        assert_eq!(source.valid_count(), 12);
        assert!(source.sample(0.5, 0.5).is_none());
    }

    #[test]
    fn test_build_reads_crops_and_skips_outside_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for (i, (west, value)) in [(0.0, 1.0), (1.0, 2.0), (5.0, 3.0)].iter().enumerate() {
            let path = dir.path().join(format!("{i:05}_tile_DEM.tif"));
            super::super::geotiff::write_f32(&tile(*west, 1.0, 4, *value), &path).unwrap();
            paths.push(path);
        }

        let aoi = AreaOfInterest::from_bbox(BoundingBox::new(0.25, 0.25, 1.75, 0.75)).unwrap();
        let result = build(&paths, &aoi).unwrap();

        assert_eq!((result.width(), result.height()), (6, 2));
        assert_eq!(result.bounds(), BoundingBox::new(0.25, 0.25, 1.75, 0.75));
        assert_eq!(result.valid_count(), 12);
        assert_eq!(result.sample(0.5, 0.5), Some(1.0));
        assert_eq!(result.sample(1.5, 0.5), Some(2.0));
    }

    #[test]
    fn test_build_outside_coverage_is_empty_intersection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("00000_tile_DEM.tif");
        super::super::geotiff::write_f32(&tile(0.0, 1.0, 4, 1.0), &path).unwrap();

        let aoi = AreaOfInterest::from_bbox(BoundingBox::new(3.0, 3.0, 4.0, 4.0)).unwrap();
        assert!(matches!(build(&[path], &aoi), Err(MergeError::EmptyIntersection)));
    }

    #[test]
    fn test_build_aoi_inside_a_single_cell() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("00000_tile_DEM.tif");
        super::super::geotiff::write_f32(&tile(8.0, 48.0, 10, 640.0), &path).unwrap();

        let square = AreaOfInterest::from_bbox(BoundingBox::new(8.52, 47.52, 8.58, 47.58)).unwrap();
        let result = build(&[path.clone()], &square).unwrap();
        assert_eq!((result.width(), result.height()), (1, 1));
        assert_eq!(result.get(0, 0), Some(640.0));

        let sliver = AreaOfInterest::new(vec![Polygon::new(
            vec![(8.51, 47.51), (8.54, 47.51), (8.51, 47.53), (8.51, 47.51)],
            Vec::new(),
        )])
        .unwrap();
        let result = build(&[path], &sliver).unwrap();
        assert_eq!(result.valid_count(), 1);
    }

    #[test]
    fn test_unreadable_fragment_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("00000_tile_DEM.tif");
        std::fs::write(&path, b"not a tiff").unwrap();

        let aoi = AreaOfInterest::from_bbox(BoundingBox::new(0.0, 0.0, 1.0, 1.0)).unwrap();
        match build(&[path.clone()], &aoi) {
            Err(MergeError::Fragment { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
