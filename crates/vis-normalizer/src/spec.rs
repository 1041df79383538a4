//! Display spec types and the record of applied corrections.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A display bound: one value for all bands, or one per band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Range {
    Scalar(f64),
    PerBand(Vec<f64>),
}

impl Range {
    pub fn values(&self) -> Vec<f64> {
        match self {
            Range::Scalar(v) => vec![*v],
            Range::PerBand(vs) => vs.clone(),
        }
    }

    /// Largest value across bands.
    pub fn max_value(&self) -> f64 {
        self.values().into_iter().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Range {
        match self {
            Range::Scalar(v) => Range::Scalar(f(*v)),
            Range::PerBand(vs) => Range::PerBand(vs.iter().map(|v| f(*v)).collect()),
        }
    }

    fn is_finite(&self) -> bool {
        self.values().iter().all(|v| v.is_finite())
    }
}

impl From<f64> for Range {
    fn from(v: f64) -> Self {
        Range::Scalar(v)
    }
}

/// Caller-supplied display parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualizationSpec {
    /// Bands to display; a comma-separated string is accepted too.
    #[serde(default, deserialize_with = "list_or_csv")]
    pub bands: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Range>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Range>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,

    #[serde(
        default,
        deserialize_with = "optional_list_or_csv",
        skip_serializing_if = "Option::is_none"
    )]
    pub palette: Option<Vec<String>>,

    /// Keep the caller's range on index-like output.
    #[serde(default, alias = "preserveRange", skip_serializing_if = "is_false")]
    pub preserve_range: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl VisualizationSpec {
    /// Spec naming only bands.
    pub fn bands<I, S>(bands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bands: bands.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_range(mut self, min: impl Into<Range>, max: impl Into<Range>) -> Self {
        self.min = Some(min.into());
        self.max = Some(max.into());
        self
    }

    pub fn with_palette<I, S>(mut self, palette: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.palette = Some(palette.into_iter().map(Into::into).collect());
        self
    }

    /// Structural checks that do not need a profile.
    pub(crate) fn check(&self) -> Result<(), String> {
        for (name, bound) in [("min", &self.min), ("max", &self.max)] {
            if let Some(range) = bound {
                if !range.is_finite() {
                    return Err(format!("{} must be finite", name));
                }
                if let Range::PerBand(values) = range {
                    if values.is_empty() {
                        return Err(format!("{} must not be an empty list", name));
                    }
                }
            }
        }
        if let (Some(Range::Scalar(lo)), Some(Range::Scalar(hi))) = (&self.min, &self.max) {
            if lo > hi {
                return Err(format!("min {} exceeds max {}", lo, hi));
            }
        }
        if let Some(gamma) = self.gamma {
            if !gamma.is_finite() || gamma <= 0.0 {
                return Err(format!("gamma must be positive, got {}", gamma));
            }
        }
        if self.bands.iter().any(|b| b.trim().is_empty()) {
            return Err("band names must not be empty".to_string());
        }
        Ok(())
    }
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrCsv {
    List(Vec<String>),
    Csv(String),
}

impl ListOrCsv {
    fn into_vec(self) -> Vec<String> {
        match self {
            ListOrCsv::List(v) => v,
            ListOrCsv::Csv(s) => split_csv(&s),
        }
    }
}

fn list_or_csv<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<ListOrCsv>::deserialize(deserializer)?
        .map(ListOrCsv::into_vec)
        .unwrap_or_default())
}

fn optional_list_or_csv<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error> {
    Ok(Option::<ListOrCsv>::deserialize(deserializer)?.map(ListOrCsv::into_vec))
}

/// Which bound a range correction touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Min,
    Max,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Bound::Min => "min",
            Bound::Max => "max",
        })
    }
}

/// One change applied to a caller's spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "correction", rename_all = "snake_case")]
pub enum Correction {
    /// Bands replaced by the product's own band(s).
    BandsOverridden { from: Vec<String>, to: Vec<String> },

    /// No bands were given; defaults filled in.
    BandsDefaulted { to: Vec<String> },

    /// Range forced to the canonical index range.
    IndexRangeApplied {
        bound: Bound,
        from: Option<Range>,
        to: Range,
    },

    /// Range converted from another value convention.
    RangeRescaled {
        bound: Bound,
        from: Range,
        to: Range,
        factor: f64,
    },

    /// Range limited to the product's native range.
    RangeClamped { bound: Bound, from: Range, to: Range },

    /// Palettes only apply to single-band output.
    PaletteDropped { palette: Vec<String> },
}

/// How far the output could be checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    /// Checked against a product profile.
    Profile { pattern: String },
    /// Treated as a derived index.
    Index,
    /// No profile matched; values passed through unchecked.
    Unverified,
}

/// Result of normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSpec {
    pub spec: VisualizationSpec,
    pub corrections: Vec<Correction>,
    pub verification: Verification,
}

impl NormalizedSpec {
    pub fn is_unchanged(&self) -> bool {
        self.corrections.is_empty()
    }
}
