//! Lon/lat rectangles.

use serde::{Deserialize, Serialize};

use crate::geometry::RegionGeometry;

/// A geographic bounding box in EPSG:4326 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            min_x: west,
            min_y: south,
            max_x: east,
            max_y: north,
        }
    }

    /// Parse `"west,south,east,north"`.
    pub fn parse_csv(text: &str) -> Result<Self, BboxParseError> {
        let values = text
            .split(',')
            .map(|part| {
                let part = part.trim();
                part.parse::<f64>()
                    .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        if values.len() != 4 {
            return Err(BboxParseError::InvalidFormat(text.to_string()));
        }
        Self::from_slice(&values)
    }

    /// Build from a `[west, south, east, north]` slice.
    pub fn from_slice(values: &[f64]) -> Result<Self, BboxParseError> {
        if values.len() != 4 {
            return Err(BboxParseError::InvalidFormat(format!("{:?}", values)));
        }
        let bbox = Self::new(values[0], values[1], values[2], values[3]);
        bbox.validate()?;
        Ok(bbox)
    }

    /// Check that the corners are finite, ordered and within lon/lat range.
    pub fn validate(&self) -> Result<(), BboxParseError> {
        let corners = [self.min_x, self.min_y, self.max_x, self.max_y];
        if corners.iter().any(|v| !v.is_finite()) {
            return Err(BboxParseError::OutOfRange(format!("{:?}", corners)));
        }
        if self.min_x < -180.0 || self.max_x > 180.0 || self.min_y < -90.0 || self.max_y > 90.0 {
            return Err(BboxParseError::OutOfRange(format!("{:?}", corners)));
        }
        if self.min_x >= self.max_x || self.min_y >= self.max_y {
            return Err(BboxParseError::Degenerate(format!("{:?}", corners)));
        }
        Ok(())
    }

    /// True when the two boxes share interior area; touching edges do not count.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        let lon_overlap = self.min_x.max(other.min_x) < self.max_x.min(other.max_x);
        let lat_overlap = self.min_y.max(other.min_y) < self.max_y.min(other.max_y);
        lon_overlap && lat_overlap
    }

    /// Edge-inclusive point test.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        (self.min_x..=self.max_x).contains(&lon) && (self.min_y..=self.max_y).contains(&lat)
    }

    /// Center point as `[lon, lat]`.
    pub fn center(&self) -> [f64; 2] {
        [
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        ]
    }

    /// Closed rectangular polygon covering this bbox.
    pub fn to_geometry(&self) -> RegionGeometry {
        RegionGeometry::Polygon {
            coordinates: vec![vec![
                [self.min_x, self.min_y],
                [self.max_x, self.min_y],
                [self.max_x, self.max_y],
                [self.min_x, self.max_y],
                [self.min_x, self.min_y],
            ]],
        }
    }

    /// Stable text form at micro-degree precision.
    pub fn cache_key(&self) -> String {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .map(|v| format!("{v:.6}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid bbox format: {0}. Expected 'west,south,east,north'")]
    InvalidFormat(String),

    #[error("Invalid number in bbox: {0}")]
    InvalidNumber(String),

    #[error("Bbox outside lon/lat range: {0}")]
    OutOfRange(String),

    #[error("Bbox has zero or negative extent: {0}")]
    Degenerate(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox_string() {
        let bbox = BoundingBox::parse_csv("-122.55, 37.65, -122.3, 37.9").unwrap();
        assert_eq!(bbox.min_x, -122.55);
        assert_eq!(bbox.min_y, 37.65);
        assert_eq!(bbox.max_x, -122.3);
        assert_eq!(bbox.max_y, 37.9);
    }

    #[test]
    fn test_reject_inverted_bbox() {
        let result = BoundingBox::from_slice(&[10.0, 10.0, 5.0, 5.0]);
        assert!(matches!(result, Err(BboxParseError::Degenerate(_))));
    }

    #[test]
    fn test_to_geometry_is_closed_ring() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        match bbox.to_geometry() {
            RegionGeometry::Polygon { coordinates } => {
                let ring = &coordinates[0];
                assert_eq!(ring.len(), 5);
                assert_eq!(ring.first(), ring.last());
            }
            other => panic!("unexpected geometry {:?}", other),
        }
    }
}
