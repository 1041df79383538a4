//! Resolved region output type.

use geo_common::{BoundingBox, RegionGeometry};
use serde::{Deserialize, Serialize};

use crate::boundary::BoundaryMatch;
use crate::error::ResolveError;
use crate::tier::Tier;

/// Dataset id reported for caller-supplied geometry.
pub const RAW_DATASET_ID: &str = "raw";

/// Canonical region geometry plus provenance.
///
/// Read-only once created; shared behind an `Arc` by the resolver cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRegion {
    pub geometry: RegionGeometry,
    pub source_tier: Tier,
    pub source_dataset: String,
    pub area_km2: f64,
    pub bbox: BoundingBox,
    pub centroid: [f64; 2],
    pub matched_canonical_name: Option<String>,

    /// Parent unit of the matched feature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Best-effort containing unit for raw geometry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containing_unit: Option<String>,
}

impl ResolvedRegion {
    /// Build from a boundary-dataset match.
    pub fn from_match(m: &BoundaryMatch, tier: Tier, dataset_id: &str) -> Result<Self, ResolveError> {
        let geometry = m.feature.geometry.clone();
        let (bbox, centroid) = measure(&geometry)?;
        Ok(Self {
            geometry,
            source_tier: tier,
            source_dataset: dataset_id.to_string(),
            area_km2: m.area_km2,
            bbox,
            centroid,
            matched_canonical_name: Some(m.feature.name.clone()),
            parent: m.feature.parent.clone(),
            containing_unit: None,
        })
    }

    /// Accept caller geometry as-is.
    pub fn raw(geometry: RegionGeometry) -> Result<Self, ResolveError> {
        geometry
            .validate()
            .map_err(|e| ResolveError::MalformedInput(e.to_string()))?;
        let (bbox, centroid) = measure(&geometry)?;
        let area_km2 = geometry.area_km2();
        Ok(Self {
            geometry,
            source_tier: Tier::Raw,
            source_dataset: RAW_DATASET_ID.to_string(),
            area_km2,
            bbox,
            centroid,
            matched_canonical_name: None,
            parent: None,
            containing_unit: None,
        })
    }

    /// Display label: canonical name, else the containing unit, else "custom region".
    pub fn label(&self) -> &str {
        self.matched_canonical_name
            .as_deref()
            .or(self.containing_unit.as_deref())
            .unwrap_or("custom region")
    }
}

fn measure(geometry: &RegionGeometry) -> Result<(BoundingBox, [f64; 2]), ResolveError> {
    let bbox = geometry
        .bbox()
        .ok_or_else(|| ResolveError::MalformedInput("geometry has no extent".to_string()))?;
    let centroid = geometry.centroid().unwrap_or_else(|| bbox.center());
    Ok((bbox, centroid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_region_measurements() {
        let region = ResolvedRegion::raw(BoundingBox::new(0.0, 0.0, 2.0, 2.0).to_geometry()).unwrap();
        assert_eq!(region.source_tier, Tier::Raw);
        assert_eq!(region.source_dataset, RAW_DATASET_ID);
        assert_eq!(region.bbox, BoundingBox::new(0.0, 0.0, 2.0, 2.0));
        assert!((region.centroid[0] - 1.0).abs() < 1e-9);
        assert!(region.area_km2 > 0.0);
        assert_eq!(region.label(), "custom region");
    }
}
