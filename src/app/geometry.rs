//! Area-of-interest geometry
//!
//! Polygons are held in geographic WGS84 longitude/latitude. GeoJSON input is
//! WGS84 by definition; a legacy `crs` member naming anything else is
//! rejected rather than silently misread.

use std::path::Path;

use serde_json::Value;

use crate::errors::{ResolutionError, ResolutionResult};

/// Axis-aligned rectangle in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Smallest box covering all points, `None` when empty
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a (f64, f64)>) -> Option<Self> {
        let mut iter = points.into_iter();
        let &(x, y) = iter.next()?;
        let mut bbox = Self::new(x, y, x, y);
        for &(x, y) in iter {
            bbox.min_lon = bbox.min_lon.min(x);
            bbox.max_lon = bbox.max_lon.max(x);
            bbox.min_lat = bbox.min_lat.min(y);
            bbox.max_lat = bbox.max_lat.max(y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Closed-interval overlap test
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    /// Overlap with positive area
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.min_lon < other.max_lon
            && other.min_lon < self.max_lon
            && self.min_lat < other.max_lat
            && other.min_lat < self.max_lat
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_lon.min(other.min_lon),
            self.min_lat.min(other.min_lat),
            self.max_lon.max(other.max_lon),
            self.max_lat.max(other.max_lat),
        )
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let bbox = BoundingBox::new(
            self.min_lon.max(other.min_lon),
            self.min_lat.max(other.min_lat),
            self.max_lon.min(other.max_lon),
            self.max_lat.min(other.max_lat),
        );
        (bbox.min_lon < bbox.max_lon && bbox.min_lat < bbox.max_lat).then_some(bbox)
    }

    /// Rectangle as a closed polygon ring
    pub fn to_polygon(&self) -> Polygon {
        Polygon::new(
            vec![
                (self.min_lon, self.min_lat),
                (self.max_lon, self.min_lat),
                (self.max_lon, self.max_lat),
                (self.min_lon, self.max_lat),
                (self.min_lon, self.min_lat),
            ],
            Vec::new(),
        )
    }
}

/// Polygon with an exterior ring and optional holes
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    exterior: Vec<(f64, f64)>,
    holes: Vec<Vec<(f64, f64)>>,
}

impl Polygon {
    pub fn new(exterior: Vec<(f64, f64)>, holes: Vec<Vec<(f64, f64)>>) -> Self {
        Self { exterior, holes }
    }

    pub fn exterior(&self) -> &[(f64, f64)] {
        &self.exterior
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.exterior)
    }

    /// Even-odd point-in-polygon test honouring holes
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        ring_contains(&self.exterior, lon, lat)
            && !self.holes.iter().any(|hole| ring_contains(hole, lon, lat))
    }

    /// Sorted longitudes where the horizontal line at `lat` crosses any ring
    ///
    /// Uses the same half-open rule as [`Polygon::contains`], so a point lies
    /// inside exactly when an odd number of crossings are east of it.
    pub fn scanline_crossings(&self, lat: f64) -> Vec<f64> {
        let mut xs = Vec::new();
        for ring in std::iter::once(&self.exterior).chain(self.holes.iter()) {
            if ring.len() < 3 {
                continue;
            }
            let mut j = ring.len() - 1;
            for i in 0..ring.len() {
                let (xi, yi) = ring[i];
                let (xj, yj) = ring[j];
                if (yi > lat) != (yj > lat) {
                    xs.push((xj - xi) * (lat - yi) / (yj - yi) + xi);
                }
                j = i;
            }
        }
        xs.sort_by(f64::total_cmp);
        xs
    }

    /// Whether the two polygons share any area or boundary
    pub fn intersects(&self, other: &Polygon) -> bool {
        match (self.bbox(), other.bbox()) {
            (Some(a), Some(b)) if a.intersects(&b) => {}
            _ => return false,
        }

        if self.exterior.iter().any(|&(x, y)| other.contains(x, y))
            || other.exterior.iter().any(|&(x, y)| self.contains(x, y))
        {
            return true;
        }

        edges(&self.exterior).any(|(a1, a2)| {
            edges(&other.exterior).any(|(b1, b2)| segments_intersect(a1, a2, b1, b2))
        })
    }
}

fn edges(ring: &[(f64, f64)]) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
    ring.windows(2).map(|w| (w[0], w[1]))
}

fn ring_contains(ring: &[(f64, f64)], x: f64, y: f64) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn orientation(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> f64 {
    (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
}

fn on_segment(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> bool {
    r.0 >= p.0.min(q.0) && r.0 <= p.0.max(q.0) && r.1 >= p.1.min(q.1) && r.1 <= p.1.max(q.1)
}

fn segments_intersect(a1: (f64, f64), a2: (f64, f64), b1: (f64, f64), b2: (f64, f64)) -> bool {
    let d1 = orientation(b1, b2, a1);
    let d2 = orientation(b1, b2, a2);
    let d3 = orientation(a1, a2, b1);
    let d4 = orientation(a1, a2, b2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(b1, b2, a1))
        || (d2 == 0.0 && on_segment(b1, b2, a2))
        || (d3 == 0.0 && on_segment(a1, a2, b1))
        || (d4 == 0.0 && on_segment(a1, a2, b2))
}

/// The caller's area of interest, one or more polygons in WGS84
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterest {
    polygons: Vec<Polygon>,
    bbox: BoundingBox,
}

impl AreaOfInterest {
    /// Build from polygons, rejecting empty or out-of-range input
    pub fn new(polygons: Vec<Polygon>) -> ResolutionResult<Self> {
        let points: Vec<(f64, f64)> = polygons
            .iter()
            .flat_map(|p| p.exterior.iter().copied())
            .collect();
        let bbox = BoundingBox::from_points(&points)
            .ok_or_else(|| ResolutionError::invalid_geometry("area of interest", "no coordinates"))?;

        if bbox.min_lon < -180.0 || bbox.max_lon > 180.0 || bbox.min_lat < -90.0 || bbox.max_lat > 90.0
        {
            return Err(ResolutionError::invalid_geometry(
                "area of interest",
                "coordinates are outside WGS84 longitude/latitude range",
            ));
        }
        if polygons.iter().any(|p| p.exterior.len() < 4) {
            return Err(ResolutionError::invalid_geometry(
                "area of interest",
                "polygon ring needs at least four positions",
            ));
        }

        Ok(Self { polygons, bbox })
    }

    /// Rectangular area of interest
    pub fn from_bbox(bbox: BoundingBox) -> ResolutionResult<Self> {
        Self::new(vec![bbox.to_polygon()])
    }

    /// Read the area of interest from a GeoJSON file
    pub fn from_geojson_file(path: &Path) -> ResolutionResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;
        let polygons = polygons_from_geojson(&value, &path.display().to_string())?;
        Self::new(polygons)
    }

    /// Read the area of interest from a GeoJSON string
    pub fn from_geojson_str(content: &str) -> ResolutionResult<Self> {
        let value: Value = serde_json::from_str(content)?;
        Self::new(polygons_from_geojson(&value, "inline GeoJSON")?)
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Whether a point lies inside any polygon
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.bbox.contains(lon, lat) && self.polygons.iter().any(|p| p.contains(lon, lat))
    }

    /// Whether any polygon intersects the given polygon
    pub fn intersects(&self, other: &Polygon) -> bool {
        self.polygons.iter().any(|p| p.intersects(other))
    }
}

/// Collect every polygon from a GeoJSON object
///
/// Accepts FeatureCollection, Feature, Polygon and MultiPolygon.
pub fn polygons_from_geojson(value: &Value, source_name: &str) -> ResolutionResult<Vec<Polygon>> {
    check_crs(value, source_name)?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ResolutionError::invalid_geometry(source_name, "missing 'type' member"))?;

    match kind {
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    ResolutionError::invalid_geometry(source_name, "missing 'features' array")
                })?;
            let mut polygons = Vec::new();
            for feature in features {
                polygons.extend(polygons_from_geojson(feature, source_name)?);
            }
            Ok(polygons)
        }
        "Feature" => match value.get("geometry") {
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(geometry) => polygons_from_geojson(geometry, source_name),
        },
        "Polygon" => {
            let coords = value.get("coordinates").ok_or_else(|| {
                ResolutionError::invalid_geometry(source_name, "polygon without coordinates")
            })?;
            Ok(vec![parse_polygon(coords, source_name)?])
        }
        "MultiPolygon" => {
            let coords = value
                .get("coordinates")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    ResolutionError::invalid_geometry(source_name, "multipolygon without coordinates")
                })?;
            coords
                .iter()
                .map(|c| parse_polygon(c, source_name))
                .collect()
        }
        other => Err(ResolutionError::invalid_geometry(
            source_name,
            format!("unsupported geometry type '{}'", other),
        )),
    }
}

fn check_crs(value: &Value, source_name: &str) -> ResolutionResult<()> {
    let Some(name) = value
        .get("crs")
        .and_then(|crs| crs.get("properties"))
        .and_then(|props| props.get("name"))
        .and_then(Value::as_str)
    else {
        return Ok(());
    };

    let geographic = ["EPSG:4326", "EPSG::4326", "CRS84", "CRS:84"];
    if geographic.iter().any(|code| name.contains(code)) {
        Ok(())
    } else {
        Err(ResolutionError::invalid_geometry(
            source_name,
            format!("coordinate reference system '{}' is not WGS84", name),
        ))
    }
}

pub(crate) fn parse_polygon(coords: &Value, source_name: &str) -> ResolutionResult<Polygon> {
    let rings = coords
        .as_array()
        .ok_or_else(|| ResolutionError::invalid_geometry(source_name, "polygon rings must be an array"))?;
    let mut parsed = rings
        .iter()
        .map(|ring| parse_ring(ring, source_name))
        .collect::<ResolutionResult<Vec<_>>>()?;
    if parsed.is_empty() {
        return Err(ResolutionError::invalid_geometry(source_name, "polygon has no rings"));
    }
    let exterior = parsed.remove(0);
    Ok(Polygon::new(exterior, parsed))
}

fn parse_ring(ring: &Value, source_name: &str) -> ResolutionResult<Vec<(f64, f64)>> {
    let positions = ring
        .as_array()
        .ok_or_else(|| ResolutionError::invalid_geometry(source_name, "ring must be an array"))?;
    positions
        .iter()
        .map(|pos| {
            let pair = pos.as_array().filter(|p| p.len() >= 2);
            match pair.map(|p| (p[0].as_f64(), p[1].as_f64())) {
                Some((Some(x), Some(y))) => Ok((x, y)),
                _ => Err(ResolutionError::invalid_geometry(
                    source_name,
                    format!("invalid position {}", pos),
                )),
            }
        })
        .collect()
}
