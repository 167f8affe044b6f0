//! Spatial regions used to filter the station catalog.
//!
//! A `Region` is a union of polygons (each an exterior ring with optional
//! holes) in longitude/latitude degrees. Points on a boundary count as
//! inside.

use crate::model::GeoPoint;

/// Points closer than this (in degrees) to an edge are on the boundary.
const BOUNDARY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegionError {
    #[error("invalid WKT: {0}")]
    InvalidWkt(String),
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("a ring needs at least 3 distinct points, got {0}")]
    TooFewPoints(usize),
}

// ---------------------------------------------------------------------------
// Polygon
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    exterior: Vec<GeoPoint>,
    holes: Vec<Vec<GeoPoint>>,
}

impl Polygon {
    /// Builds a polygon from an exterior ring. The ring may or may not
    /// repeat its first point at the end.
    pub fn new(exterior: Vec<(f64, f64)>) -> Result<Self, RegionError> {
        Ok(Self {
            exterior: normalize_ring(exterior)?,
            holes: Vec::new(),
        })
    }

    pub fn with_hole(mut self, hole: Vec<(f64, f64)>) -> Result<Self, RegionError> {
        self.holes.push(normalize_ring(hole)?);
        Ok(self)
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        if on_ring_boundary(&self.exterior, point) {
            return true;
        }
        if !ring_contains(&self.exterior, point) {
            return false;
        }
        for hole in &self.holes {
            // the edge of a hole is still part of the polygon
            if on_ring_boundary(hole, point) {
                return true;
            }
            if ring_contains(hole, point) {
                return false;
            }
        }
        true
    }
}

fn normalize_ring(mut ring: Vec<(f64, f64)>) -> Result<Vec<GeoPoint>, RegionError> {
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    if ring.len() < 3 {
        return Err(RegionError::TooFewPoints(ring.len()));
    }
    ring.into_iter()
        .map(|(lon, lat)| {
            GeoPoint::checked(lon, lat)
                .ok_or_else(|| RegionError::InvalidCoordinate(format!("{} {}", lon, lat)))
        })
        .collect()
}

/// Ray casting: count crossings of a ray running east from `point`.
fn ring_contains(ring: &[GeoPoint], point: &GeoPoint) -> bool {
    let n = ring.len();
    let mut inside = false;
    let mut j = n - 1;

    for i in 0..n {
        let (xi, yi) = (ring[i].lon, ring[i].lat);
        let (xj, yj) = (ring[j].lon, ring[j].lat);

        if ((yi > point.lat) != (yj > point.lat))
            && (point.lon < (xj - xi) * (point.lat - yi) / (yj - yi) + xi)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

fn on_ring_boundary(ring: &[GeoPoint], point: &GeoPoint) -> bool {
    let n = ring.len();
    (0..n).any(|i| on_segment(&ring[i], &ring[(i + 1) % n], point))
}

fn on_segment(a: &GeoPoint, b: &GeoPoint, p: &GeoPoint) -> bool {
    let cross = (b.lon - a.lon) * (p.lat - a.lat) - (b.lat - a.lat) * (p.lon - a.lon);
    if cross.abs() > BOUNDARY_EPSILON {
        return false;
    }
    let within_lon = p.lon >= a.lon.min(b.lon) - BOUNDARY_EPSILON
        && p.lon <= a.lon.max(b.lon) + BOUNDARY_EPSILON;
    let within_lat = p.lat >= a.lat.min(b.lat) - BOUNDARY_EPSILON
        && p.lat <= a.lat.max(b.lat) + BOUNDARY_EPSILON;
    within_lon && within_lat
}

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

/// Union of one or more polygons.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    polygons: Vec<Polygon>,
}

impl Region {
    pub fn polygon(polygon: Polygon) -> Self {
        Self {
            polygons: vec![polygon],
        }
    }

    pub fn multi(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    /// Axis-aligned box from its west/south/east/north edges.
    pub fn bbox(lon_min: f64, lat_min: f64, lon_max: f64, lat_max: f64) -> Result<Self, RegionError> {
        if !(lon_min < lon_max && lat_min < lat_max) {
            return Err(RegionError::InvalidCoordinate(format!(
                "bbox {},{},{},{} has no area",
                lon_min, lat_min, lon_max, lat_max
            )));
        }
        let ring = vec![
            (lon_min, lat_min),
            (lon_max, lat_min),
            (lon_max, lat_max),
            (lon_min, lat_max),
        ];
        Ok(Self::polygon(Polygon::new(ring)?))
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.polygons.iter().any(|p| p.contains(point))
    }

    /// Parses `POLYGON((lon lat, ...), (hole...))` or
    /// `MULTIPOLYGON(((lon lat, ...)),((...)))`.
    pub fn from_wkt(wkt: &str) -> Result<Self, RegionError> {
        let wkt = wkt.trim();
        let upper = wkt.to_ascii_uppercase();

        let (body, multi) = if let Some(rest) = upper.strip_prefix("MULTIPOLYGON") {
            (&wkt[wkt.len() - rest.len()..], true)
        } else if let Some(rest) = upper.strip_prefix("POLYGON") {
            (&wkt[wkt.len() - rest.len()..], false)
        } else {
            return Err(RegionError::InvalidWkt(
                "expected POLYGON or MULTIPOLYGON".to_string(),
            ));
        };

        let body = strip_parens(body.trim())?;
        let polygons = if multi {
            split_top_level(body)?
                .into_iter()
                .map(|part| parse_polygon_body(strip_parens(part.trim())?))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            vec![parse_polygon_body(body)?]
        };

        Ok(Self::multi(polygons))
    }
}

fn strip_parens(s: &str) -> Result<&str, RegionError> {
    s.strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .ok_or_else(|| RegionError::InvalidWkt(format!("unbalanced parentheses in '{}'", s)))
}

/// Splits `(a),(b)` at commas that are not nested in parentheses.
fn split_top_level(s: &str) -> Result<Vec<&str>, RegionError> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(RegionError::InvalidWkt("unbalanced parentheses".to_string()));
                }
            }
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(RegionError::InvalidWkt("unbalanced parentheses".to_string()));
    }
    parts.push(&s[start..]);
    Ok(parts)
}

fn parse_polygon_body(body: &str) -> Result<Polygon, RegionError> {
    let mut rings = split_top_level(body)?
        .into_iter()
        .map(|ring| parse_ring(strip_parens(ring.trim())?));

    let exterior = rings
        .next()
        .ok_or_else(|| RegionError::InvalidWkt("polygon without rings".to_string()))??;
    let mut polygon = Polygon::new(exterior)?;
    for hole in rings {
        polygon = polygon.with_hole(hole?)?;
    }
    Ok(polygon)
}

fn parse_ring(coords: &str) -> Result<Vec<(f64, f64)>, RegionError> {
    coords
        .split(',')
        .map(|pair| {
            let parts: Vec<&str> = pair.split_whitespace().collect();
            if parts.len() != 2 {
                return Err(RegionError::InvalidWkt(format!(
                    "expected 'lon lat', got '{}'",
                    pair.trim()
                )));
            }
            let lon: f64 = parts[0]
                .parse()
                .map_err(|_| RegionError::InvalidCoordinate(parts[0].to_string()))?;
            let lat: f64 = parts[1]
                .parse()
                .map_err(|_| RegionError::InvalidCoordinate(parts[1].to_string()))?;
            Ok((lon, lat))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
