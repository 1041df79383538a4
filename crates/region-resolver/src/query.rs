//! Location query input types.

use geo_common::{BoundingBox, RegionGeometry};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ResolveError;

/// Radius applied to bare coordinates that arrive without one.
pub const DEFAULT_POINT_RADIUS_M: f64 = 1_000.0;

/// A location descriptor as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationQuery {
    /// Free-text place name with an optional parent-region hint.
    Name {
        name: String,
        #[serde(default)]
        parent: Option<String>,
    },

    /// A point buffered by a radius in metres.
    Point { lon: f64, lat: f64, radius_m: f64 },

    /// A west/south/east/north box.
    BBox(BoundingBox),

    /// A caller-supplied polygon or multipolygon.
    Geometry(RegionGeometry),
}

impl LocationQuery {
    /// Create a name query.
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name {
            name: name.into(),
            parent: None,
        }
    }

    /// Create a name query with a parent-region hint.
    pub fn name_in(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self::Name {
            name: name.into(),
            parent: Some(parent.into()),
        }
    }

    /// Interpret a loosely-typed region argument.
    ///
    /// Accepted shapes:
    /// - `"San Francisco"` (name)
    /// - `"-122.4,37.7"` (point, default radius) or `"w,s,e,n"` (box)
    /// - `[lon, lat]` or `[w, s, e, n]`
    /// - GeoJSON `Polygon` / `MultiPolygon` / `Feature`
    /// - `{ "name": ..., "parent": ... }`
    /// - `{ "lon": ..., "lat": ..., "radius": ... }`
    /// - `{ "bbox": [w, s, e, n] }` or `{ "west", "south", "east", "north" }`
    pub fn from_value(value: &Value) -> Result<Self, ResolveError> {
        match value {
            Value::String(s) => Self::from_text(s),
            Value::Array(items) => {
                let numbers = numeric_array(items)?;
                Self::from_numbers(&numbers)
            }
            Value::Object(map) => {
                if map.contains_key("type") {
                    return RegionGeometry::from_value(value)
                        .map(LocationQuery::Geometry)
                        .map_err(|e| ResolveError::MalformedInput(e.to_string()));
                }

                if let Some(name) = map.get("name").and_then(Value::as_str) {
                    let parent = ["parent", "parentRegion", "parent_region", "country"]
                        .iter()
                        .find_map(|k| map.get(*k).and_then(Value::as_str))
                        .map(str::to_string);
                    return Ok(LocationQuery::Name {
                        name: name.to_string(),
                        parent,
                    });
                }

                if let (Some(lon), Some(lat)) = (
                    map.get("lon").and_then(Value::as_f64),
                    map.get("lat").and_then(Value::as_f64),
                ) {
                    let radius_m = ["radius_m", "radius", "radiusMeters"]
                        .iter()
                        .find_map(|k| map.get(*k).and_then(Value::as_f64))
                        .unwrap_or(DEFAULT_POINT_RADIUS_M);
                    return Self::point(lon, lat, radius_m);
                }

                if let Some(Value::Array(items)) = map.get("bbox") {
                    let numbers = numeric_array(items)?;
                    return Self::bbox(&numbers);
                }

                let corners: Option<Vec<f64>> = ["west", "south", "east", "north"]
                    .iter()
                    .map(|k| map.get(*k).and_then(Value::as_f64))
                    .collect();
                if let Some(corners) = corners {
                    return Self::bbox(&corners);
                }

                Err(ResolveError::MalformedInput(
                    "region object needs one of: type, name, lon/lat, bbox, west/south/east/north"
                        .to_string(),
                ))
            }
            other => Err(ResolveError::MalformedInput(format!(
                "unsupported region value: {}",
                other
            ))),
        }
    }

    fn from_text(s: &str) -> Result<Self, ResolveError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ResolveError::MalformedInput("empty region name".to_string()));
        }

        let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        let numbers: Option<Vec<f64>> = parts.iter().map(|p| p.parse::<f64>().ok()).collect();
        match numbers {
            Some(numbers) if numbers.len() == 2 || numbers.len() == 4 => {
                Self::from_numbers(&numbers)
            }
            _ => Ok(Self::name(trimmed)),
        }
    }

    fn from_numbers(numbers: &[f64]) -> Result<Self, ResolveError> {
        match numbers.len() {
            2 => Self::point(numbers[0], numbers[1], DEFAULT_POINT_RADIUS_M),
            4 => Self::bbox(numbers),
            n => Err(ResolveError::MalformedInput(format!(
                "expected [lon, lat] or [west, south, east, north], got {} numbers",
                n
            ))),
        }
    }

    fn point(lon: f64, lat: f64, radius_m: f64) -> Result<Self, ResolveError> {
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Err(ResolveError::MalformedInput(format!(
                "point out of range: lon={}, lat={}",
                lon, lat
            )));
        }
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(ResolveError::MalformedInput(format!(
                "radius must be positive, got {}",
                radius_m
            )));
        }
        Ok(LocationQuery::Point { lon, lat, radius_m })
    }

    fn bbox(numbers: &[f64]) -> Result<Self, ResolveError> {
        BoundingBox::from_slice(numbers)
            .map(LocationQuery::BBox)
            .map_err(|e| ResolveError::MalformedInput(e.to_string()))
    }

    /// Short human-readable description for logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            LocationQuery::Name { name, parent: None } => name.clone(),
            LocationQuery::Name {
                name,
                parent: Some(parent),
            } => format!("{} ({})", name, parent),
            LocationQuery::Point { lon, lat, radius_m } => {
                format!("point({:.5},{:.5}) r={}m", lon, lat, radius_m)
            }
            LocationQuery::BBox(b) => format!("bbox({})", b.cache_key()),
            LocationQuery::Geometry(g) => format!("geometry({} vertices)", g.vertex_count()),
        }
    }
}

fn numeric_array(items: &[Value]) -> Result<Vec<f64>, ResolveError> {
    items
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                ResolveError::MalformedInput(format!("expected a number, got {}", v))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_name() {
        let q = LocationQuery::from_value(&json!("San Francisco")).unwrap();
        assert_eq!(q, LocationQuery::name("San Francisco"));
    }

    #[test]
    fn test_name_object_with_parent() {
        let q = LocationQuery::from_value(&json!({"name": "Springfield", "parent": "Illinois"}))
            .unwrap();
        assert_eq!(q, LocationQuery::name_in("Springfield", "Illinois"));
    }

    #[test]
    fn test_coordinate_text_is_point() {
        let q = LocationQuery::from_value(&json!("-122.42, 37.77")).unwrap();
        assert!(matches!(q, LocationQuery::Point { radius_m, .. } if radius_m == DEFAULT_POINT_RADIUS_M));
    }

    #[test]
    fn test_four_numbers_is_bbox() {
        let q = LocationQuery::from_value(&json!([-122.55, 37.65, -122.3, 37.9])).unwrap();
        assert!(matches!(q, LocationQuery::BBox(_)));
    }

    #[test]
    fn test_point_object_with_radius() {
        let q = LocationQuery::from_value(&json!({"lon": 10.0, "lat": 50.0, "radius": 2500}))
            .unwrap();
        assert_eq!(
            q,
            LocationQuery::Point {
                lon: 10.0,
                lat: 50.0,
                radius_m: 2500.0
            }
        );
    }

    #[test]
    fn test_geojson_object() {
        let q = LocationQuery::from_value(&json!({
            "type": "Polygon",
            "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]
        }))
        .unwrap();
        assert!(matches!(q, LocationQuery::Geometry(_)));
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(
            LocationQuery::from_value(&json!([1.0, 2.0, 3.0])),
            Err(ResolveError::MalformedInput(_))
        ));
        assert!(matches!(
            LocationQuery::from_value(&json!(42)),
            Err(ResolveError::MalformedInput(_))
        ));
        assert!(matches!(
            LocationQuery::from_value(&json!({"lon": 200.0, "lat": 0.0})),
            Err(ResolveError::MalformedInput(_))
        ));
        assert!(matches!(
            LocationQuery::from_value(&json!("   ")),
            Err(ResolveError::MalformedInput(_))
        ));
    }
}
