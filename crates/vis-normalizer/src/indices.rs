//! Spectral index catalog.
//!
//! Normalized-difference style indices are canonically bounded to -1..1.
//! Formulas are written over band roles and bound to concrete band names
//! per sensor.

use serde::Serialize;
use std::collections::BTreeMap;

/// Canonical display range of a derived index.
pub const INDEX_RANGE: (f64, f64) = (-1.0, 1.0);

/// Sensors with a known band layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensor {
    Sentinel2,
    Landsat89,
}

impl Sensor {
    /// Detect the sensor from a dataset id.
    pub fn from_dataset(dataset_id: &str) -> Option<Self> {
        let id = dataset_id.to_ascii_uppercase();
        if id.starts_with("COPERNICUS/S2") {
            Some(Sensor::Sentinel2)
        } else if id.starts_with("LANDSAT/LC08") || id.starts_with("LANDSAT/LC09") {
            Some(Sensor::Landsat89)
        } else {
            None
        }
    }

    /// Band carrying a spectral role.
    pub fn band(&self, role: &str) -> Option<&'static str> {
        let band = match (self, role) {
            (Sensor::Sentinel2, "BLUE") => "B2",
            (Sensor::Sentinel2, "GREEN") => "B3",
            (Sensor::Sentinel2, "RED") => "B4",
            (Sensor::Sentinel2, "NIR") => "B8",
            (Sensor::Sentinel2, "SWIR1") => "B11",
            (Sensor::Sentinel2, "SWIR2") => "B12",
            (Sensor::Landsat89, "BLUE") => "SR_B2",
            (Sensor::Landsat89, "GREEN") => "SR_B3",
            (Sensor::Landsat89, "RED") => "SR_B4",
            (Sensor::Landsat89, "NIR") => "SR_B5",
            (Sensor::Landsat89, "SWIR1") => "SR_B6",
            (Sensor::Landsat89, "SWIR2") => "SR_B7",
            _ => return None,
        };
        Some(band)
    }
}

/// A derived single-band index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpectralIndex {
    pub name: &'static str,
    pub long_name: &'static str,
    /// Band-math expression over role names.
    pub expression: &'static str,
    pub roles: &'static [&'static str],
}

pub const CATALOG: &[SpectralIndex] = &[
    SpectralIndex {
        name: "NDVI",
        long_name: "Normalized Difference Vegetation Index",
        expression: "(NIR - RED) / (NIR + RED)",
        roles: &["NIR", "RED"],
    },
    SpectralIndex {
        name: "NDWI",
        long_name: "Normalized Difference Water Index",
        expression: "(GREEN - NIR) / (GREEN + NIR)",
        roles: &["GREEN", "NIR"],
    },
    SpectralIndex {
        name: "MNDWI",
        long_name: "Modified Normalized Difference Water Index",
        expression: "(GREEN - SWIR1) / (GREEN + SWIR1)",
        roles: &["GREEN", "SWIR1"],
    },
    SpectralIndex {
        name: "NDBI",
        long_name: "Normalized Difference Built-up Index",
        expression: "(SWIR1 - NIR) / (SWIR1 + NIR)",
        roles: &["SWIR1", "NIR"],
    },
    SpectralIndex {
        name: "NBR",
        long_name: "Normalized Burn Ratio",
        expression: "(NIR - SWIR2) / (NIR + SWIR2)",
        roles: &["NIR", "SWIR2"],
    },
    SpectralIndex {
        name: "NDMI",
        long_name: "Normalized Difference Moisture Index",
        expression: "(NIR - SWIR1) / (NIR + SWIR1)",
        roles: &["NIR", "SWIR1"],
    },
    SpectralIndex {
        name: "EVI",
        long_name: "Enhanced Vegetation Index",
        expression: "2.5 * ((NIR - RED) / (NIR + 6 * RED - 7.5 * BLUE + 1))",
        roles: &["NIR", "RED", "BLUE"],
    },
    SpectralIndex {
        name: "SAVI",
        long_name: "Soil Adjusted Vegetation Index",
        expression: "1.5 * (NIR - RED) / (NIR + RED + 0.5)",
        roles: &["NIR", "RED"],
    },
];

/// Band names produced by derived indices that are not in the catalog.
const EXTRA_INDEX_BANDS: &[&str] = &["dNBR", "NDSI", "BSI", "GNDVI"];

impl SpectralIndex {
    /// Case-insensitive catalog lookup.
    pub fn find(name: &str) -> Option<&'static SpectralIndex> {
        CATALOG.iter().find(|i| i.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Role-to-band bindings for a sensor, or `None` if a role is unmapped.
    pub fn bindings(&self, sensor: Sensor) -> Option<BTreeMap<String, String>> {
        self.roles
            .iter()
            .map(|role| sensor.band(role).map(|b| (role.to_string(), b.to_string())))
            .collect()
    }
}

/// Whether a band name denotes a derived index.
pub fn is_index_band(name: &str) -> bool {
    let name = name.trim();
    SpectralIndex::find(name).is_some()
        || EXTRA_INDEX_BANDS.iter().any(|b| b.eq_ignore_ascii_case(name))
}

/// Every recognised index band name.
pub fn vocabulary() -> Vec<String> {
    CATALOG
        .iter()
        .map(|i| i.name)
        .chain(EXTRA_INDEX_BANDS.iter().copied())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_detection() {
        assert_eq!(
            Sensor::from_dataset("COPERNICUS/S2_SR_HARMONIZED"),
            Some(Sensor::Sentinel2)
        );
        assert_eq!(
            Sensor::from_dataset("LANDSAT/LC09/C02/T1_L2"),
            Some(Sensor::Landsat89)
        );
        assert_eq!(Sensor::from_dataset("USDA/NAIP/DOQQ"), None);
    }

    #[test]
    fn test_ndvi_bindings() {
        let ndvi = SpectralIndex::find("ndvi").unwrap();
        let s2 = ndvi.bindings(Sensor::Sentinel2).unwrap();
        assert_eq!(s2["NIR"], "B8");
        assert_eq!(s2["RED"], "B4");
        let landsat = ndvi.bindings(Sensor::Landsat89).unwrap();
        assert_eq!(landsat["NIR"], "SR_B5");
    }

    #[test]
    fn test_vocabulary() {
        assert!(is_index_band("NDVI"));
        assert!(is_index_band(" nbr "));
        assert!(is_index_band("dNBR"));
        assert!(!is_index_band("B4"));
        assert!(vocabulary().len() >= CATALOG.len());
    }
}
