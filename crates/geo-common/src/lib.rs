//! Common types shared across the geospatial pipeline crates.

pub mod bbox;
pub mod error;
pub mod geometry;

pub use bbox::{BboxParseError, BoundingBox};
pub use error::ErrorKind;
pub use geometry::{GeometryError, RegionGeometry};
