//! Location resolver error types.

use geo_common::ErrorKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::boundary::MatchKind;
use crate::tier::Tier;

/// Summary of one candidate returned with an ambiguous match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub canonical_name: String,
    pub parent: Option<String>,
    pub country: Option<String>,
    pub tier: Tier,
    pub dataset_id: String,
    pub area_km2: f64,
    pub match_kind: MatchKind,
}

/// Errors that can occur while resolving a location.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// No tier produced a match.
    #[error("Location not found: {query}")]
    NotFound {
        query: String,
        suggestions: Vec<String>,
    },

    /// Several distinct units tied after every tie-break rule.
    #[error("Ambiguous location '{query}': {} candidates", candidates.len())]
    AmbiguousMatch {
        query: String,
        candidates: Vec<Candidate>,
    },

    /// A boundary dataset failed; safe to retry.
    #[error("Boundary dataset {dataset} unavailable: {message}")]
    UpstreamUnavailable { dataset: String, message: String },

    /// A boundary dataset did not answer in time; safe to retry.
    #[error("Boundary dataset {dataset} timed out after {timeout:?}")]
    UpstreamTimeout { dataset: String, timeout: Duration },

    /// The query could not be interpreted.
    #[error("Malformed location: {0}")]
    MalformedInput(String),
}

impl ResolveError {
    /// Map onto the shared error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::NotFound { .. } => ErrorKind::NotFound,
            ResolveError::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            ResolveError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            ResolveError::UpstreamTimeout { .. } => ErrorKind::UpstreamTimeout,
            ResolveError::MalformedInput(_) => ErrorKind::MalformedInput,
        }
    }

    /// Whether the same call may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
