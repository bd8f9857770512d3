//! DTED level 0/1/2 reader
//!
//! A DTED file is an 80-byte User Header Label (UHL), a 648-byte Data Set
//! Identification record, a 2700-byte Accuracy record, then one data record
//! per longitude line from west to east. Each record holds the posts of
//! that line from south to north as signed-magnitude big-endian 16-bit values.
//!
//! Posts sit on cell corners, so the raster built here is shifted half a
//! post to the south-west to give area-registered cells.

use std::path::Path;

use super::{GeoTransform, Raster};
use crate::constants::raster;
use crate::errors::{RasterError, RasterResult};

const UHL_LEN: usize = 80;
const DSI_LEN: usize = 648;
const ACC_LEN: usize = 2700;
const DATA_OFFSET: usize = UHL_LEN + DSI_LEN + ACC_LEN;
const RECORD_SENTINEL: u8 = 0xAA;
/// Sentinel, block count, longitude count and latitude count
const RECORD_HEADER_LEN: usize = 8;
const RECORD_CHECKSUM_LEN: usize = 4;
/// DTED void marker
const VOID: i16 = -32767;

/// Header fields needed to place the posts
#[derive(Debug, Clone, Copy, PartialEq)]
struct Header {
    origin_lon: f64,
    origin_lat: f64,
    /// Degrees between longitude lines
    lon_interval: f64,
    /// Degrees between posts along a line
    lat_interval: f64,
    lon_lines: usize,
    lat_points: usize,
}

/// Read a DTED file
pub fn read(path: &Path) -> RasterResult<Raster> {
    let bytes = std::fs::read(path)?;
    parse(&bytes, path)
}

fn parse(bytes: &[u8], path: &Path) -> RasterResult<Raster> {
    let malformed = |reason: &str| RasterError::MalformedDted {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let header = parse_header(bytes).ok_or_else(|| malformed("invalid UHL header"))?;
    let record_len = RECORD_HEADER_LEN + 2 * header.lat_points + RECORD_CHECKSUM_LEN;
    let expected = DATA_OFFSET + record_len * header.lon_lines;
    if bytes.len() < expected {
        return Err(malformed("file is truncated"));
    }

    let (width, height) = (header.lon_lines, header.lat_points);
    let mut data = vec![raster::FLOAT_NODATA; width * height];

    for col in 0..width {
        let record = &bytes[DATA_OFFSET + col * record_len..DATA_OFFSET + (col + 1) * record_len];
        if record[0] != RECORD_SENTINEL {
            return Err(malformed("data record sentinel missing"));
        }
        let posts = &record[RECORD_HEADER_LEN..RECORD_HEADER_LEN + 2 * height];
        for (i, post) in posts.chunks_exact(2).enumerate() {
            // Posts run south to north, rows run north to south
            let row = height - 1 - i;
            data[row * width + col] = signed_magnitude(post[0], post[1]) as f32;
        }
    }

    let transform = GeoTransform::new(
        header.origin_lon - header.lon_interval / 2.0,
        header.origin_lat + (height as f64 - 0.5) * header.lat_interval,
        header.lon_interval,
        header.lat_interval,
    );
    let mut raster = Raster::new(width, height, transform, raster::FLOAT_NODATA, data)?;
    raster.normalize_nodata(Some(VOID as f32));
    Ok(raster)
}

fn parse_header(bytes: &[u8]) -> Option<Header> {
    let uhl = bytes.get(..UHL_LEN)?;
    if &uhl[0..3] != b"UHL" {
        return None;
    }
    let field = |range: std::ops::Range<usize>| std::str::from_utf8(&uhl[range]).ok();

    let origin_lon = parse_angle(field(4..12)?)?;
    let origin_lat = parse_angle(field(12..20)?)?;
    // Intervals are in tenths of arc seconds
    let lon_interval = field(20..24)?.trim().parse::<f64>().ok()? / 36_000.0;
    let lat_interval = field(24..28)?.trim().parse::<f64>().ok()? / 36_000.0;
    let lon_lines = field(47..51)?.trim().parse::<usize>().ok()?;
    let lat_points = field(51..55)?.trim().parse::<usize>().ok()?;

    if lon_interval <= 0.0 || lat_interval <= 0.0 || lon_lines == 0 || lat_points == 0 {
        return None;
    }

    Some(Header {
        origin_lon,
        origin_lat,
        lon_interval,
        lat_interval,
        lon_lines,
        lat_points,
    })
}

/// `DDDMMSSH` to signed decimal degrees
fn parse_angle(text: &str) -> Option<f64> {
    if text.len() != 8 || !text.is_ascii() {
        return None;
    }
    let degrees: f64 = text[0..3].parse().ok()?;
    let minutes: f64 = text[3..5].parse().ok()?;
    let seconds: f64 = text[5..7].parse().ok()?;
    let value = degrees + minutes / 60.0 + seconds / 3600.0;
    match &text[7..8] {
        "N" | "E" => Some(value),
        "S" | "W" => Some(-value),
        _ => None,
    }
}

fn signed_magnitude(hi: u8, lo: u8) -> i16 {
    let raw = u16::from_be_bytes([hi, lo]);
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Minimal DTED file: `columns` are west-to-east lines of south-to-north posts
    fn build_dted(origin_lon: &str, origin_lat: &str, interval: u32, columns: &[Vec<i16>]) -> Vec<u8> {
        let lat_points = columns[0].len();
        let mut uhl = vec![b' '; UHL_LEN];
        uhl[0..4].copy_from_slice(b"UHL1");
        uhl[4..12].copy_from_slice(origin_lon.as_bytes());
        uhl[12..20].copy_from_slice(origin_lat.as_bytes());
        uhl[20..24].copy_from_slice(format!("{:04}", interval).as_bytes());
        uhl[24..28].copy_from_slice(format!("{:04}", interval).as_bytes());
        uhl[47..51].copy_from_slice(format!("{:04}", columns.len()).as_bytes());
        uhl[51..55].copy_from_slice(format!("{:04}", lat_points).as_bytes());

        let mut bytes = uhl;
        bytes.extend(vec![b' '; DSI_LEN + ACC_LEN]);
        for (i, column) in columns.iter().enumerate() {
            bytes.push(RECORD_SENTINEL);
            bytes.extend_from_slice(&[0, 0, 0]);
            bytes.extend_from_slice(&(i as u16).to_be_bytes());
            bytes.extend_from_slice(&0u16.to_be_bytes());
            for &v in column {
                let raw = if v < 0 { 0x8000 | (v.unsigned_abs()) } else { v as u16 };
                bytes.extend_from_slice(&raw.to_be_bytes());
            }
            bytes.extend_from_slice(&[0, 0, 0, 0]);
        }
        bytes
    }

    #[test]
    fn test_parse_angle() {
        assert_relative_eq!(parse_angle("0083000E").unwrap(), 8.5);
        assert_relative_eq!(parse_angle("0470000S").unwrap(), -47.0);
        assert!(parse_angle("0470000X").is_none());
        assert!(parse_angle("047000N").is_none());
    }

    #[test]
    fn test_signed_magnitude() {
        assert_eq!(signed_magnitude(0x00, 0x64), 100);
        assert_eq!(signed_magnitude(0x80, 0x64), -100);
        assert_eq!(signed_magnitude(0xFF, 0xFF), -32767);
    }

    #[test]
    fn test_posts_are_placed_north_up() {
        // 10 arc seconds = 100 tenths
        let columns = vec![vec![1, 2, 3], vec![4, -5, VOID]];
        let bytes = build_dted("0080000E", "0470000N", 100, &columns);
        let raster = parse(&bytes, Path::new("t.dt2")).unwrap();

        assert_eq!((raster.width(), raster.height()), (2, 3));
        // Top row holds the northernmost posts
        assert_eq!(raster.get(0, 0), Some(3.0));
        assert_eq!(raster.get(1, 1), Some(-5.0));
        assert_eq!(raster.get(0, 2), Some(1.0));
        assert!(raster.is_nodata(raster.get(1, 0).unwrap()));

        let step = 100.0 / 36_000.0;
        let t = raster.transform();
        assert_relative_eq!(t.west, 8.0 - step / 2.0);
        assert_relative_eq!(t.north, 47.0 + 2.5 * step);
        // The south-west post is centred on the origin
        assert_eq!(raster.sample(8.0, 47.0), Some(1.0));
    }

    #[test]
    fn test_truncated_and_bad_header() {
        let columns = vec![vec![1, 2], vec![3, 4]];
        let bytes = build_dted("0080000E", "0470000N", 100, &columns);
        let err = parse(&bytes[..bytes.len() - 10], Path::new("t.dt1")).unwrap_err();
        assert!(matches!(err, RasterError::MalformedDted { .. }));

        let mut bad = bytes.clone();
        bad[0] = b'X';
        assert!(parse(&bad, Path::new("t.dt1")).is_err());
    }
}
