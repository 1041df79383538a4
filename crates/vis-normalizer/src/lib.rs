//! Visualization parameter normalization.
//!
//! Raster products disagree on value ranges (fractional reflectance 0-1,
//! scaled integers 0-10000, 8-bit 0-255) and on band cardinality. A display
//! spec that does not match its product renders blank or saturated without
//! any backend error, so every spec is reconciled against the
//! [`ProductProfile`] table (and the producing entry's bands) before render.
//!
//! Corrections are explicit: [`normalize`] returns the corrected copy plus
//! the list of [`Correction`]s it applied.

pub mod error;
pub mod indices;
pub mod normalize;
pub mod profile;
pub mod spec;

pub use error::NormalizeError;
pub use indices::{is_index_band, Sensor, SpectralIndex, INDEX_RANGE};
pub use normalize::normalize;
pub use profile::{ProductProfile, ProfileTable};
pub use spec::{Bound, Correction, NormalizedSpec, Range, Verification, VisualizationSpec};
