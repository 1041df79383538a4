//! Per-collection preprocessing applied when building composites.

use serde::{Deserialize, Serialize};

/// Drop pixels whose QA band has any of the given bits set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudMask {
    pub band: String,
    pub bits: Vec<u8>,
}

/// `value * factor + offset`, applied to optical bands after masking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rescale {
    pub factor: f64,
    pub offset: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preprocessing {
    pub cloud_mask: Option<CloudMask>,
    pub rescale: Option<Rescale>,
}

/// Preprocessing for a dataset id. Unknown collections get none.
pub fn for_dataset(dataset: &str) -> Preprocessing {
    let id = dataset.trim().to_ascii_uppercase();

    if id.starts_with("COPERNICUS/S2") {
        // QA60: bit 10 opaque clouds, bit 11 cirrus
        let cloud_mask = Some(CloudMask {
            band: "QA60".to_string(),
            bits: vec![10, 11],
        });
        // surface reflectance is stored scaled by 10000
        let rescale = id.starts_with("COPERNICUS/S2_SR").then_some(Rescale {
            factor: 1.0 / 10_000.0,
            offset: 0.0,
        });
        return Preprocessing {
            cloud_mask,
            rescale,
        };
    }

    if id.starts_with("LANDSAT/LC08/C02") || id.starts_with("LANDSAT/LC09/C02") {
        // QA_PIXEL: bit 3 cloud, bit 4 cloud shadow
        let cloud_mask = Some(CloudMask {
            band: "QA_PIXEL".to_string(),
            bits: vec![3, 4],
        });
        let rescale = id.ends_with("_L2").then_some(Rescale {
            factor: 0.000_027_5,
            offset: -0.2,
        });
        return Preprocessing {
            cloud_mask,
            rescale,
        };
    }

    Preprocessing::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel2_surface_reflectance() {
        let p = for_dataset("COPERNICUS/S2_SR_HARMONIZED");
        assert_eq!(p.cloud_mask.unwrap().bits, vec![10, 11]);
        assert_eq!(p.rescale.unwrap().factor, 1.0 / 10_000.0);
    }

    #[test]
    fn test_sentinel2_toa_keeps_integer_scale() {
        let p = for_dataset("COPERNICUS/S2_HARMONIZED");
        assert_eq!(p.cloud_mask.unwrap().band, "QA60");
        assert!(p.rescale.is_none());
    }

    #[test]
    fn test_landsat() {
        let l2 = for_dataset("LANDSAT/LC09/C02/T1_L2");
        assert_eq!(l2.cloud_mask.as_ref().unwrap().band, "QA_PIXEL");
        assert_eq!(l2.rescale.unwrap().offset, -0.2);

        assert!(for_dataset("LANDSAT/LC08/C02/T1_TOA").rescale.is_none());
    }

    #[test]
    fn test_unknown_collection() {
        assert_eq!(for_dataset("USDA/NAIP/DOQQ"), Preprocessing::default());
    }
}
