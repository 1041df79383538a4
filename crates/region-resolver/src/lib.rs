//! Location resolution for the geospatial pipeline.
//!
//! Turns heterogeneous location descriptors (place names, points with a
//! radius, bounding boxes, raw polygons) into a canonical [`ResolvedRegion`].
//! Names are resolved through an alias table and then through tiered
//! administrative-boundary datasets, finest tier first.
//!
//! ## Components
//! - [`LocationQuery`]: tagged union of accepted inputs
//! - [`AliasTable`]: nickname to canonical name mapping
//! - [`BoundarySource`]: seam to the external boundary datasets
//! - [`ResolutionCache`]: TTL cache of successful and not-found resolutions
//! - [`LocationResolver`]: the tiered fallback algorithm

pub mod alias;
pub mod boundary;
pub mod cache;
pub mod config;
pub mod error;
pub mod normalize;
pub mod query;
pub mod region;
pub mod resolver;
pub mod strategy;
pub mod suggest;
pub mod tiebreak;
pub mod tier;

pub use alias::{AliasEntry, AliasTable};
pub use boundary::{
    BoundaryDataset, BoundaryFeature, BoundaryMatch, BoundarySource, InMemoryBoundarySource,
    MatchKind, SourceError,
};
pub use cache::{CachedOutcome, ResolutionCache, ResolutionCacheStats, ResolutionKey};
pub use config::ResolverConfig;
pub use error::{Candidate, ResolveError};
pub use normalize::normalize_name;
pub use query::LocationQuery;
pub use region::ResolvedRegion;
pub use resolver::LocationResolver;
pub use tier::Tier;
