//! Product profile table.
//!
//! Profiles are matched by a glob-style dataset id pattern (`*` matches any
//! run of characters, `?` a single one). Profiles loaded from YAML take
//! precedence over the built-ins; within each group the first match wins.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::NormalizeError;
use crate::indices;

/// Native value convention of a raster product family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductProfile {
    /// Glob-style dataset id pattern, e.g. `COPERNICUS/S2_SR*`.
    pub dataset_pattern: String,

    pub native_min: f64,
    pub native_max: f64,

    /// Reflectance stored as 0-1 floats.
    #[serde(default)]
    pub is_fractional: bool,

    /// Value representing full reflectance; defaults to 1 for fractional
    /// products and to `native_max` otherwise.
    #[serde(default)]
    pub scale: Option<f64>,

    /// Bands shown when the caller names none.
    #[serde(default)]
    pub default_bands: Vec<String>,

    /// Every band the product carries; empty when unknown.
    #[serde(default)]
    pub band_names: Vec<String>,

    /// Band names recognised as derived indices.
    #[serde(default = "indices::vocabulary")]
    pub index_vocabulary: Vec<String>,
}

impl ProductProfile {
    /// Value that stands for full reflectance.
    pub fn full_scale(&self) -> f64 {
        match self.scale {
            Some(scale) => scale,
            None if self.is_fractional => 1.0,
            None => self.native_max,
        }
    }

    pub fn is_index_band(&self, band: &str) -> bool {
        indices::is_index_band(band)
            || self
                .index_vocabulary
                .iter()
                .any(|v| v.eq_ignore_ascii_case(band.trim()))
    }

    fn validate(&self) -> Result<(), String> {
        if !self.native_min.is_finite() || !self.native_max.is_finite() {
            return Err("native range must be finite".to_string());
        }
        if self.native_min >= self.native_max {
            return Err(format!(
                "native_min {} must be below native_max {}",
                self.native_min, self.native_max
            ));
        }
        if self.full_scale() <= 0.0 {
            return Err("scale must be positive".to_string());
        }
        Ok(())
    }
}

/// On-disk profile file layout.
#[derive(Debug, Default, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    profiles: Vec<ProductProfile>,
}

struct CompiledProfile {
    pattern: Regex,
    profile: ProductProfile,
}

/// Ordered collection of product profiles.
pub struct ProfileTable {
    profiles: Vec<CompiledProfile>,
}

fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
}

fn s2_bands() -> Vec<String> {
    [
        "B1", "B2", "B3", "B4", "B5", "B6", "B7", "B8", "B8A", "B9", "B11", "B12",
    ]
    .iter()
    .map(|b| b.to_string())
    .collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn builtin_profiles() -> Vec<ProductProfile> {
    vec![
        // surface reflectance composites are scaled by 1/10000 when built
        ProductProfile {
            dataset_pattern: "COPERNICUS/S2_SR*".to_string(),
            native_min: 0.0,
            native_max: 1.0,
            is_fractional: true,
            scale: None,
            default_bands: strings(&["B4", "B3", "B2"]),
            band_names: s2_bands(),
            index_vocabulary: indices::vocabulary(),
        },
        ProductProfile {
            dataset_pattern: "COPERNICUS/S2*".to_string(),
            native_min: 0.0,
            native_max: 10000.0,
            is_fractional: false,
            scale: Some(10000.0),
            default_bands: strings(&["B4", "B3", "B2"]),
            band_names: {
                let mut bands = s2_bands();
                bands.push("B10".to_string());
                bands
            },
            index_vocabulary: indices::vocabulary(),
        },
        ProductProfile {
            dataset_pattern: "LANDSAT/LC0?/C02/T1_L2".to_string(),
            native_min: 0.0,
            native_max: 1.0,
            is_fractional: true,
            scale: None,
            default_bands: strings(&["SR_B4", "SR_B3", "SR_B2"]),
            band_names: strings(&[
                "SR_B1", "SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B6", "SR_B7",
            ]),
            index_vocabulary: indices::vocabulary(),
        },
        ProductProfile {
            dataset_pattern: "LANDSAT/LC0?/C02/T1_TOA".to_string(),
            native_min: 0.0,
            native_max: 1.0,
            is_fractional: true,
            scale: None,
            default_bands: strings(&["B4", "B3", "B2"]),
            band_names: strings(&[
                "B1", "B2", "B3", "B4", "B5", "B6", "B7", "B8", "B9", "B10", "B11",
            ]),
            index_vocabulary: indices::vocabulary(),
        },
        ProductProfile {
            dataset_pattern: "USDA/NAIP/DOQQ".to_string(),
            native_min: 0.0,
            native_max: 255.0,
            is_fractional: false,
            scale: None,
            default_bands: strings(&["R", "G", "B"]),
            band_names: strings(&["R", "G", "B", "N"]),
            index_vocabulary: indices::vocabulary(),
        },
    ]
}

impl ProfileTable {
    /// Empty table.
    pub fn new() -> Self {
        Self {
            profiles: Vec::new(),
        }
    }

    /// Table of the built-in profiles.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for profile in builtin_profiles() {
            // built-in patterns are valid globs
            if let Err(e) = table.push(profile) {
                tracing::error!(error = %e, "Invalid built-in profile");
            }
        }
        table
    }

    /// Built-ins overlaid with a profiles file; file entries are tried first.
    pub fn load_file(path: &Path) -> Result<Self> {
        let builtin = Self::builtin();
        if !path.exists() {
            tracing::warn!("Profile file {:?} does not exist, using built-in profiles", path);
            return Ok(builtin);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read: {:?}", path))?;
        let file: ProfileFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse profile file: {:?}", path))?;

        let mut table = Self::new();
        for profile in file.profiles {
            let pattern = profile.dataset_pattern.clone();
            table
                .push(profile)
                .with_context(|| format!("Invalid profile '{}' in {:?}", pattern, path))?;
        }
        tracing::info!("Loaded {} product profiles from {:?}", table.len(), path);

        table.profiles.extend(builtin.profiles);
        Ok(table)
    }

    /// Append a profile (lowest precedence so far).
    pub fn push(&mut self, profile: ProductProfile) -> Result<()> {
        profile
            .validate()
            .map_err(|e| anyhow::anyhow!(e))
            .with_context(|| format!("Invalid profile '{}'", profile.dataset_pattern))?;
        let pattern = glob_to_regex(&profile.dataset_pattern)
            .with_context(|| format!("Invalid pattern '{}'", profile.dataset_pattern))?;
        self.profiles.push(CompiledProfile { pattern, profile });
        Ok(())
    }

    /// First profile whose pattern matches the dataset id.
    pub fn lookup(&self, dataset_id: &str) -> Option<&ProductProfile> {
        let id = dataset_id.trim();
        self.profiles
            .iter()
            .find(|p| p.pattern.is_match(id))
            .map(|p| &p.profile)
    }

    /// Like [`lookup`](Self::lookup), but a miss is an `UnknownProduct` error.
    pub fn require(&self, dataset_id: &str) -> Result<&ProductProfile, NormalizeError> {
        self.lookup(dataset_id)
            .ok_or_else(|| NormalizeError::UnknownProduct {
                dataset_id: dataset_id.to_string(),
                known_patterns: self.patterns(),
            })
    }

    pub fn patterns(&self) -> Vec<String> {
        self.profiles
            .iter()
            .map(|p| p.profile.dataset_pattern.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_patterns() {
        let re = glob_to_regex("LANDSAT/LC0?/C02/T1_L2").unwrap();
        assert!(re.is_match("LANDSAT/LC08/C02/T1_L2"));
        assert!(re.is_match("LANDSAT/LC09/C02/T1_L2"));
        assert!(!re.is_match("LANDSAT/LC08/C02/T1_L2_extra"));

        let re = glob_to_regex("COPERNICUS/S2_SR*").unwrap();
        assert!(re.is_match("COPERNICUS/S2_SR_HARMONIZED"));
        assert!(!re.is_match("COPERNICUS/S2_HARMONIZED"));
    }

    #[test]
    fn test_builtin_lookup_order() {
        let table = ProfileTable::builtin();
        let sr = table.lookup("COPERNICUS/S2_SR_HARMONIZED").unwrap();
        assert!(sr.is_fractional);
        assert_eq!(sr.full_scale(), 1.0);

        let toa = table.lookup("COPERNICUS/S2_HARMONIZED").unwrap();
        assert_eq!(toa.native_max, 10000.0);
        assert_eq!(toa.full_scale(), 10000.0);

        let naip = table.lookup("USDA/NAIP/DOQQ").unwrap();
        assert_eq!(naip.full_scale(), 255.0);
    }

    #[test]
    fn test_require_unknown_product() {
        let table = ProfileTable::builtin();
        match table.require("ACME/UNKNOWN") {
            Err(NormalizeError::UnknownProduct { known_patterns, .. }) => {
                assert_eq!(known_patterns.len(), table.len());
            }
            other => panic!("expected UnknownProduct, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let mut table = ProfileTable::new();
        let mut profile = builtin_profiles().remove(0);
        profile.native_max = profile.native_min;
        assert!(table.push(profile).is_err());
        assert!(table.is_empty());
    }
}
