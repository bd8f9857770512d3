//! GeoTIFF reading and writing
//!
//! Only north-up geographic rasters are handled: placement comes from
//! ModelTiepoint plus ModelPixelScale, and the no-data marker from the GDAL
//! ASCII tag.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, colortype::ColorType, TiffEncoder, TiffValue};
use tiff::tags::Tag;

use super::{GeoTransform, Raster};
use crate::constants::raster;
use crate::errors::{RasterError, RasterResult, WriteError, WriteResult};

/// GTRasterTypeGeoKey
const KEY_RASTER_TYPE: u32 = 1025;
/// RasterPixelIsPoint
const RASTER_PIXEL_IS_POINT: u32 = 2;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Read a single-band GeoTIFF
pub fn read(path: &Path) -> RasterResult<Raster> {
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?;

    // Full-resolution tiles exceed the default decoding limits
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 64 * 1024 * 1024;
    decoder = decoder.with_limits(limits);

    let (width, height) = decoder.dimensions()?;
    let transform = read_transform(&mut decoder, path)?;
    let nodata = read_nodata(&mut decoder);
    let data = decode_elevation_data(&mut decoder)?;

    let mut raster = Raster::new(
        width as usize,
        height as usize,
        transform,
        raster::FLOAT_NODATA,
        data,
    )?;
    raster.normalize_nodata(nodata);
    Ok(raster)
}

fn read_transform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> RasterResult<GeoTransform> {
    let missing = || RasterError::MissingGeoreference {
        path: path.to_path_buf(),
    };

    let tiepoint = decoder
        .get_tag_f64_vec(tag(raster::TAG_MODEL_TIEPOINT))
        .map_err(|_| missing())?;
    let scale = decoder
        .get_tag_f64_vec(tag(raster::TAG_MODEL_PIXEL_SCALE))
        .map_err(|_| missing())?;
    if tiepoint.len() < 6 || scale.len() < 2 || scale[0] <= 0.0 || scale[1] <= 0.0 {
        return Err(missing());
    }

    // Tiepoint is [i, j, k, x, y, z]: raster (i, j) sits at model (x, y)
    let (pixel_width, pixel_height) = (scale[0], scale[1]);
    let mut west = tiepoint[3] - tiepoint[0] * pixel_width;
    let mut north = tiepoint[4] + tiepoint[1] * pixel_height;

    // Point-registered rasters tie the first cell centre, not its corner
    if raster_type(decoder) == Some(RASTER_PIXEL_IS_POINT) {
        west -= pixel_width / 2.0;
        north += pixel_height / 2.0;
    }

    Ok(GeoTransform::new(west, north, pixel_width, pixel_height))
}

fn raster_type<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    let keys = decoder
        .get_tag_u32_vec(tag(raster::TAG_GEO_KEY_DIRECTORY))
        .ok()?;
    // Header of four values, then (key, location, count, value) entries
    keys.get(4..)?
        .chunks_exact(4)
        .find(|entry| entry[0] == KEY_RASTER_TYPE && entry[1] == 0)
        .map(|entry| entry[3])
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f32> {
    decoder
        .get_tag_ascii_string(tag(raster::TAG_GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok())
}

fn decode_elevation_data<R: Read + Seek>(decoder: &mut Decoder<R>) -> RasterResult<Vec<f32>> {
    let data = match decoder.read_image()? {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    };
    Ok(data)
}

/// Write the raster as 32-bit float GeoTIFF
pub fn write_f32(raster: &Raster, path: &Path) -> WriteResult<()> {
    let nodata = format_nodata(raster.nodata());
    encode::<colortype::Gray32Float>(raster, raster.data(), &nodata, path)
}

/// Write pre-quantized cells as 16-bit signed GeoTIFF
pub fn write_i16(raster: &Raster, values: &[i16], nodata: i16, path: &Path) -> WriteResult<()> {
    encode::<colortype::GrayI16>(raster, values, &nodata.to_string(), path)
}

fn format_nodata(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn encode<C>(raster: &Raster, values: &[C::Inner], nodata: &str, path: &Path) -> WriteResult<()>
where
    C: ColorType,
    [C::Inner]: TiffValue,
{
    let encode_err = |source| WriteError::Encode {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(|source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(encode_err)?;
    let mut image = encoder
        .new_image::<C>(raster.width() as u32, raster.height() as u32)
        .map_err(encode_err)?;

    let t = raster.transform();
    let scale = [t.pixel_width, t.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, t.west, t.north, 0.0];
    let geo_keys: [u16; 16] = [
        1, 1, 0, 3, // version, revision, minor, key count
        1024, 0, 1, 2, // GTModelTypeGeoKey = geographic
        1025, 0, 1, 1, // GTRasterTypeGeoKey = pixel is area
        2048, 0, 1, raster::EPSG_WGS84, // GeographicTypeGeoKey
    ];

    let dir = image.encoder();
    dir.write_tag(tag(raster::TAG_MODEL_PIXEL_SCALE), &scale[..])
        .map_err(encode_err)?;
    dir.write_tag(tag(raster::TAG_MODEL_TIEPOINT), &tiepoint[..])
        .map_err(encode_err)?;
    dir.write_tag(tag(raster::TAG_GEO_KEY_DIRECTORY), &geo_keys[..])
        .map_err(encode_err)?;
    dir.write_tag(tag(raster::TAG_GDAL_NODATA), nodata)
        .map_err(encode_err)?;

    image.write_data(values).map_err(encode_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn raster() -> Raster {
        Raster::new(
            3,
            2,
            GeoTransform::new(8.0, 47.5, 0.25, 0.25),
            raster::FLOAT_NODATA,
            vec![100.5, 200.25, raster::FLOAT_NODATA, 0.0, -5.5, 1234.0],
        )
        .unwrap()
    }

    #[test]
    fn test_float_write_read_preserves_geometry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dem.tif");
        write_f32(&raster(), &path).unwrap();

        let back = read(&path).unwrap();
        assert_eq!(back.width(), 3);
        assert_eq!(back.height(), 2);
        assert_relative_eq!(back.transform().west, 8.0);
        assert_relative_eq!(back.transform().north, 47.5);
        assert_relative_eq!(back.transform().pixel_width, 0.25);
        assert_eq!(back.data(), raster().data());
        assert_eq!(back.valid_count(), 5);
    }

    #[test]
    fn test_i16_nodata_is_normalized_on_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dem_i16.tif");
        let values = [1005, 2003, i16::MIN, 0, -55, 12340];
        write_i16(&raster(), &values, i16::MIN, &path).unwrap();

        let back = read(&path).unwrap();
        assert_eq!(back.data()[0], 1005.0);
        assert!(back.is_nodata(back.data()[2]));
        assert_eq!(back.nodata(), raster::FLOAT_NODATA);
    }

    #[test]
    fn test_missing_georeference() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.tif");
        let file = File::create(&path).unwrap();
        let mut encoder = TiffEncoder::new(BufWriter::new(file)).unwrap();
        encoder
            .write_image::<colortype::Gray32Float>(2, 1, &[1.0, 2.0])
            .unwrap();
        drop(encoder);

        assert!(matches!(
            read(&path),
            Err(RasterError::MissingGeoreference { .. })
        ));
    }

    #[test]
    fn test_nodata_formatting() {
        assert_eq!(format_nodata(-32767.0), "-32767");
        assert_eq!(format_nodata(-9999.5), "-9999.5");
    }
}
