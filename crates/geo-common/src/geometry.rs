//! Region geometry in GeoJSON shape.
//!
//! Geometry is stored as plain coordinate arrays so that serializing the
//! same region twice always yields the same bytes. Measurements (area,
//! centroid, extent) go through the `geo` crate.

use geo::{
    BooleanOps, BoundingRect, Centroid, ChamberlainDuquetteArea, Coord, HaversineDestination,
    HaversineDistance, LineString, MultiPolygon, Point, Polygon, Rect, Translate,
};
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;

/// A linear ring of `[lon, lat]` positions.
pub type Ring = Vec<[f64; 2]>;

/// Polygonal region geometry (GeoJSON `Polygon` or `MultiPolygon`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RegionGeometry {
    /// Exterior ring followed by optional holes.
    Polygon { coordinates: Vec<Ring> },

    /// One or more polygons.
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
}

impl RegionGeometry {
    /// Parse a GeoJSON geometry object, or the geometry of a GeoJSON Feature.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, GeometryError> {
        let geometry_value = match value.get("type").and_then(|t| t.as_str()) {
            Some("Feature") => value
                .get("geometry")
                .ok_or_else(|| GeometryError::Unsupported("Feature without geometry".into()))?,
            Some("Polygon") | Some("MultiPolygon") => value,
            Some(other) => return Err(GeometryError::Unsupported(other.to_string())),
            None => return Err(GeometryError::Unsupported("missing 'type'".into())),
        };

        let geometry: RegionGeometry = serde_json::from_value(geometry_value.clone())
            .map_err(|e| GeometryError::Invalid(e.to_string()))?;
        geometry.validate()?;
        Ok(geometry)
    }

    /// Approximate a geodesic circle around a point.
    ///
    /// Circles crossing the antimeridian are split into a `MultiPolygon`
    /// at ±180. A circle enclosing a pole becomes a polar cap bounded by
    /// the ±180 meridians. Circles enclosing both poles are rejected.
    pub fn circle(lon: f64, lat: f64, radius_m: f64, segments: usize) -> Result<Self, GeometryError> {
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(GeometryError::Invalid(format!(
                "radius must be positive, got {}",
                radius_m
            )));
        }
        check_position([lon, lat])?;

        let segments = segments.max(8);
        let center = Point::new(lon, lat);
        let boundary: Ring = (0..segments)
            .map(|i| {
                let bearing = 360.0 * i as f64 / segments as f64;
                let p = center.haversine_destination(bearing, radius_m);
                [p.x(), p.y()]
            })
            .collect();

        let covers_north = center.haversine_distance(&Point::new(lon, 90.0)) <= radius_m;
        let covers_south = center.haversine_distance(&Point::new(lon, -90.0)) <= radius_m;
        match (covers_north, covers_south) {
            (true, true) => Err(GeometryError::Invalid(format!(
                "radius {} m encloses both poles",
                radius_m
            ))),
            (true, false) => Ok(polar_cap(boundary, 90.0)),
            (false, true) => Ok(polar_cap(boundary, -90.0)),
            (false, false) => Ok(split_at_antimeridian(unwrap_around(boundary, lon))),
        }
    }

    /// All polygons as rings-of-positions, regardless of variant.
    fn polygons(&self) -> Vec<&Vec<Ring>> {
        match self {
            RegionGeometry::Polygon { coordinates } => vec![coordinates],
            RegionGeometry::MultiPolygon { coordinates } => coordinates.iter().collect(),
        }
    }

    /// Check ring closure, minimum ring length and coordinate ranges.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let polygons = self.polygons();
        if polygons.is_empty() {
            return Err(GeometryError::Invalid("geometry has no polygons".into()));
        }

        for rings in polygons {
            if rings.is_empty() {
                return Err(GeometryError::Invalid("polygon has no rings".into()));
            }
            for ring in rings {
                if ring.len() < 4 {
                    return Err(GeometryError::Invalid(format!(
                        "ring needs at least 4 positions, got {}",
                        ring.len()
                    )));
                }
                if ring.first() != ring.last() {
                    return Err(GeometryError::Invalid("ring is not closed".into()));
                }
                for position in ring {
                    check_position(*position)?;
                }
            }
        }
        Ok(())
    }

    /// Convert into `geo` types for measurement.
    pub fn to_multi_polygon(&self) -> MultiPolygon<f64> {
        let polygons = self
            .polygons()
            .into_iter()
            .filter_map(|rings| {
                let mut rings = rings.iter().map(|ring| to_line_string(ring));
                let exterior = rings.next()?;
                Some(Polygon::new(exterior, rings.collect()))
            })
            .collect();
        MultiPolygon::new(polygons)
    }

    /// Geodesic area in square kilometres.
    pub fn area_km2(&self) -> f64 {
        self.to_multi_polygon().chamberlain_duquette_unsigned_area() / 1_000_000.0
    }

    /// Extent of the geometry.
    pub fn bbox(&self) -> Option<BoundingBox> {
        self.to_multi_polygon()
            .bounding_rect()
            .map(|rect| BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }

    /// Planar centroid as `[lon, lat]`.
    pub fn centroid(&self) -> Option<[f64; 2]> {
        self.to_multi_polygon().centroid().map(|p| [p.x(), p.y()])
    }

    /// Total number of positions across all rings.
    pub fn vertex_count(&self) -> usize {
        self.polygons()
            .into_iter()
            .flat_map(|rings| rings.iter())
            .map(Vec::len)
            .sum()
    }
}

/// Shift longitudes so each lies within 180 degrees of `center_lon`.
fn unwrap_around(boundary: Ring, center_lon: f64) -> Ring {
    boundary
        .into_iter()
        .map(|[x, y]| {
            let mut x = x;
            while x - center_lon > 180.0 {
                x -= 360.0;
            }
            while x - center_lon < -180.0 {
                x += 360.0;
            }
            [x, y]
        })
        .collect()
}

/// Close an unwrapped ring, splitting it at ±180 when it leaves that range.
fn split_at_antimeridian(mut ring: Ring) -> RegionGeometry {
    ring.push(ring[0]);
    let crosses = ring.iter().any(|[x, _]| !(-180.0..=180.0).contains(x));
    if !crosses {
        return RegionGeometry::Polygon {
            coordinates: vec![ring],
        };
    }

    let polygon = Polygon::new(to_line_string(&ring), vec![]);
    let world = Rect::new(Coord { x: -180.0, y: -90.0 }, Coord { x: 180.0, y: 90.0 }).to_polygon();
    let mut pieces: Vec<Polygon<f64>> = Vec::new();
    for shift in [-360.0, 0.0, 360.0] {
        let clipped = polygon.translate(shift, 0.0).intersection(&world);
        pieces.extend(clipped.0.into_iter().filter(|p| p.exterior().0.len() >= 4));
    }

    let coordinates: Vec<Vec<Ring>> = pieces
        .iter()
        .map(|p| {
            std::iter::once(p.exterior())
                .chain(p.interiors())
                .map(from_line_string)
                .collect()
        })
        .collect();
    match coordinates.len() {
        1 => RegionGeometry::Polygon {
            coordinates: coordinates.into_iter().flatten().collect(),
        },
        _ => RegionGeometry::MultiPolygon { coordinates },
    }
}

/// Ring enclosing the pole at latitude `pole`, bounded by the boundary
/// points ordered west to east and by the ±180 meridians.
fn polar_cap(mut boundary: Ring, pole: f64) -> RegionGeometry {
    boundary.sort_by(|a, b| a[0].total_cmp(&b[0]));
    let ([west_lon, west_lat], [east_lon, east_lat]) = (boundary[0], boundary[boundary.len() - 1]);

    // latitude where the boundary meets the antimeridian
    let gap = west_lon + 360.0 - east_lon;
    let seam_lat = if gap > 0.0 {
        east_lat + (west_lat - east_lat) * (180.0 - east_lon) / gap
    } else {
        east_lat
    };

    let mut ring: Ring = Vec::with_capacity(boundary.len() + 5);
    ring.push([-180.0, seam_lat]);
    ring.extend(boundary);
    ring.push([180.0, seam_lat]);
    ring.push([180.0, pole]);
    ring.push([-180.0, pole]);
    ring.push([-180.0, seam_lat]);
    RegionGeometry::Polygon {
        coordinates: vec![ring],
    }
}

fn from_line_string(line: &LineString<f64>) -> Ring {
    line.coords()
        .map(|c| [c.x.clamp(-180.0, 180.0), c.y.clamp(-90.0, 90.0)])
        .collect()
}

fn to_line_string(ring: &Ring) -> LineString<f64> {
    LineString::new(ring.iter().map(|[x, y]| Coord { x: *x, y: *y }).collect())
}

fn check_position([lon, lat]: [f64; 2]) -> Result<(), GeometryError> {
    if !lon.is_finite() || !lat.is_finite() || !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return Err(GeometryError::OutOfRange { lon, lat });
    }
    Ok(())
}

/// Errors raised while parsing or validating geometry.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("Unsupported geometry type: {0}")]
    Unsupported(String),

    #[error("Invalid geometry: {0}")]
    Invalid(String),

    #[error("Position out of range: lon={lon}, lat={lat}")]
    OutOfRange { lon: f64, lat: f64 },
}
