//! The normalization algorithm.

use tracing::{debug, warn};

use crate::error::NormalizeError;
use crate::indices::{self, INDEX_RANGE};
use crate::profile::ProductProfile;
use crate::spec::{Bound, Correction, NormalizedSpec, Range, Verification, VisualizationSpec};

/// Full-scale values of the common storage conventions, smallest first.
const CONVENTIONS: [f64; 4] = [1.0, 255.0, 10_000.0, 65_535.0];

/// Headroom above a convention's full scale still attributed to it.
const CONVENTION_HEADROOM: f64 = 1.5;

/// Reconcile a display spec with its product.
///
/// * `profile` - profile of the dataset the object came from, if known
/// * `entry_bands` - bands of the cached object being rendered, if any
///
/// The caller's spec is never modified; the corrected copy and the list of
/// corrections are returned. Normalizing an already-normalized spec applies
/// no further corrections.
pub fn normalize(
    spec: &VisualizationSpec,
    profile: Option<&ProductProfile>,
    entry_bands: Option<&[String]>,
) -> Result<NormalizedSpec, NormalizeError> {
    spec.check().map_err(NormalizeError::MalformedInput)?;

    let entry_bands = entry_bands.filter(|bands| !bands.is_empty());
    let is_index_band = |band: &str| match profile {
        Some(p) => p.is_index_band(band),
        None => indices::is_index_band(band),
    };

    let mut out = spec.clone();
    let mut corrections = Vec::new();

    let single_band_entry = entry_bands.is_some_and(|bands| bands.len() == 1);
    let index_like = single_band_entry || spec.bands.iter().any(|b| is_index_band(b));

    let verification = if index_like {
        apply_index_bands(&mut out, entry_bands, &mut corrections)?;
        if !out.preserve_range {
            force_bound(&mut out.min, Bound::Min, INDEX_RANGE.0, &mut corrections);
            force_bound(&mut out.max, Bound::Max, INDEX_RANGE.1, &mut corrections);
        }
        Verification::Index
    } else {
        apply_bands(&mut out, profile, entry_bands, &mut corrections)?;
        match profile {
            Some(profile) => {
                apply_native_range(&mut out, profile, &mut corrections);
                Verification::Profile {
                    pattern: profile.dataset_pattern.clone(),
                }
            }
            None => Verification::Unverified,
        }
    };

    check_cardinality(&out)?;

    if out.bands.len() == 3 {
        if let Some(palette) = out.palette.take() {
            corrections.push(Correction::PaletteDropped { palette });
        }
    }

    for correction in &corrections {
        debug!(?correction, "Visualization spec corrected");
        metrics::counter!("normalizer_corrections_total", "correction" => label(correction))
            .increment(1);
    }
    if verification == Verification::Unverified {
        warn!(bands = ?out.bands, "No product profile matched; visualization passed through unverified");
        metrics::counter!("normalizer_unverified_total").increment(1);
    }

    Ok(NormalizedSpec {
        spec: out,
        corrections,
        verification,
    })
}

fn apply_index_bands(
    out: &mut VisualizationSpec,
    entry_bands: Option<&[String]>,
    corrections: &mut Vec<Correction>,
) -> Result<(), NormalizeError> {
    let target = match entry_bands {
        Some(bands) if bands.len() == 1 => bands.to_vec(),
        Some(bands) => {
            require_available(&out.bands, bands)?;
            out.bands.clone()
        }
        None => out.bands.clone(),
    };

    if target != out.bands {
        corrections.push(Correction::BandsOverridden {
            from: std::mem::take(&mut out.bands),
            to: target.clone(),
        });
        out.bands = target;
    }
    Ok(())
}

fn apply_bands(
    out: &mut VisualizationSpec,
    profile: Option<&ProductProfile>,
    entry_bands: Option<&[String]>,
    corrections: &mut Vec<Correction>,
) -> Result<(), NormalizeError> {
    if out.bands.is_empty() {
        if let Some(defaults) = default_bands(profile, entry_bands) {
            corrections.push(Correction::BandsDefaulted {
                to: defaults.clone(),
            });
            out.bands = defaults;
        }
    }

    let available = entry_bands.or_else(|| {
        profile
            .map(|p| p.band_names.as_slice())
            .filter(|bands| !bands.is_empty())
    });
    if let Some(available) = available {
        require_available(&out.bands, available)?;
    }
    Ok(())
}

fn default_bands(
    profile: Option<&ProductProfile>,
    entry_bands: Option<&[String]>,
) -> Option<Vec<String>> {
    let profile_defaults = profile
        .map(|p| p.default_bands.clone())
        .filter(|d| !d.is_empty());

    match (profile_defaults, entry_bands) {
        (Some(defaults), Some(entry)) if defaults.iter().all(|b| entry.contains(b)) => {
            Some(defaults)
        }
        (Some(defaults), None) => Some(defaults),
        (_, Some(entry)) if entry.len() >= 3 => Some(entry[..3].to_vec()),
        _ => None,
    }
}

fn require_available(requested: &[String], available: &[String]) -> Result<(), NormalizeError> {
    let missing: Vec<String> = requested
        .iter()
        .filter(|b| !available.contains(b))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(NormalizeError::ConflictingBands {
            requested: missing,
            available: available.to_vec(),
        })
    }
}

fn force_bound(slot: &mut Option<Range>, bound: Bound, value: f64, corrections: &mut Vec<Correction>) {
    let target = Range::Scalar(value);
    if slot.as_ref() != Some(&target) {
        corrections.push(Correction::IndexRangeApplied {
            bound,
            from: slot.take(),
            to: target.clone(),
        });
        *slot = Some(target);
    }
}

/// Full scale of the convention a value was most likely written in.
fn source_convention(value: f64) -> f64 {
    CONVENTIONS
        .iter()
        .copied()
        .find(|scale| value.abs() <= scale * CONVENTION_HEADROOM)
        .unwrap_or(CONVENTIONS[CONVENTIONS.len() - 1])
}

/// Factor that moves the caller's range into the profile's convention.
fn rescale_factor(top: f64, profile: &ProductProfile) -> f64 {
    let (lo, hi) = (profile.native_min, profile.native_max);
    let full = profile.full_scale();

    if top > hi + (hi - lo) {
        // far above the native range, e.g. 3000 against 0-1
        full / source_convention(top)
    } else if !profile.is_fractional && hi > 1.0 && top > 0.0 && top <= 1.0 && top * full > 1.0 {
        // fractional values against an integer product
        full
    } else {
        1.0
    }
}

fn apply_native_range(
    out: &mut VisualizationSpec,
    profile: &ProductProfile,
    corrections: &mut Vec<Correction>,
) {
    let top = match out.max.as_ref().or(out.min.as_ref()) {
        Some(range) => range.max_value(),
        None => return,
    };
    let factor = rescale_factor(top, profile);
    let (lo, hi) = (profile.native_min, profile.native_max);

    for bound in [Bound::Min, Bound::Max] {
        let slot = match bound {
            Bound::Min => &mut out.min,
            Bound::Max => &mut out.max,
        };
        let Some(mut current) = slot.clone() else {
            continue;
        };

        if factor != 1.0 {
            let scaled = current.map(|v| v * factor);
            if scaled != current {
                corrections.push(Correction::RangeRescaled {
                    bound,
                    from: current,
                    to: scaled.clone(),
                    factor,
                });
                current = scaled;
            }
        }

        let clamped = current.map(|v| v.clamp(lo, hi));
        if clamped != current {
            corrections.push(Correction::RangeClamped {
                bound,
                from: current,
                to: clamped.clone(),
            });
            current = clamped;
        }

        *slot = Some(current);
    }
}

fn check_cardinality(spec: &VisualizationSpec) -> Result<(), NormalizeError> {
    let count = spec.bands.len();
    match count {
        0 => {
            return Err(NormalizeError::MalformedInput(
                "no bands requested and no default bands are known for this product".to_string(),
            ))
        }
        1 | 3 => {}
        n => {
            return Err(NormalizeError::MalformedInput(format!(
                "{} bands requested; display takes 1 band (optionally with a palette) or 3 bands (RGB)",
                n
            )))
        }
    }

    for (bound, range) in [(Bound::Min, &spec.min), (Bound::Max, &spec.max)] {
        if let Some(Range::PerBand(values)) = range {
            if values.len() != count {
                return Err(NormalizeError::MalformedInput(format!(
                    "{} has {} values for {} bands",
                    bound,
                    values.len(),
                    count
                )));
            }
        }
    }
    Ok(())
}

fn label(correction: &Correction) -> &'static str {
    match correction {
        Correction::BandsOverridden { .. } => "bands_overridden",
        Correction::BandsDefaulted { .. } => "bands_defaulted",
        Correction::IndexRangeApplied { .. } => "index_range_applied",
        Correction::RangeRescaled { .. } => "range_rescaled",
        Correction::RangeClamped { .. } => "range_clamped",
        Correction::PaletteDropped { .. } => "palette_dropped",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileTable;

    fn s2_sr() -> ProductProfile {
        ProfileTable::builtin()
            .lookup("COPERNICUS/S2_SR_HARMONIZED")
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_source_convention() {
        assert_eq!(source_convention(0.3), 1.0);
        assert_eq!(source_convention(200.0), 255.0);
        assert_eq!(source_convention(3000.0), 10_000.0);
        assert_eq!(source_convention(40_000.0), 65_535.0);
        assert_eq!(source_convention(1e9), 65_535.0);
    }

    #[test]
    fn test_in_range_spec_unchanged() {
        let spec = VisualizationSpec::bands(["B4", "B3", "B2"]).with_range(0.0, 0.3);
        let result = normalize(&spec, Some(&s2_sr()), None).unwrap();
        assert!(result.is_unchanged());
        assert_eq!(result.spec, spec);
    }

    #[test]
    fn test_slightly_high_max_is_clamped_not_rescaled() {
        let spec = VisualizationSpec::bands(["B4", "B3", "B2"]).with_range(0.0, 1.4);
        let result = normalize(&spec, Some(&s2_sr()), None).unwrap();
        assert_eq!(result.spec.max, Some(Range::Scalar(1.0)));
        assert!(matches!(
            result.corrections.as_slice(),
            [Correction::RangeClamped { bound: Bound::Max, .. }]
        ));
    }

    #[test]
    fn test_gamma_and_caller_input_untouched() {
        let spec = VisualizationSpec {
            gamma: Some(1.4),
            ..VisualizationSpec::bands(["B4", "B3", "B2"]).with_range(0.0, 3000.0)
        };
        let before = spec.clone();
        let result = normalize(&spec, Some(&s2_sr()), None).unwrap();
        assert_eq!(spec, before);
        assert_eq!(result.spec.gamma, Some(1.4));
    }

    #[test]
    fn test_label_names_every_correction() {
        let correction = Correction::BandsDefaulted { to: vec![] };
        assert_eq!(label(&correction), "bands_defaulted");
    }
}
