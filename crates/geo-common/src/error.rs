//! Error taxonomy shared by every pipeline component.
//!
//! Each component keeps its own `thiserror` enum and maps it onto an
//! [`ErrorKind`]; the dispatch boundary uses the kind to decide retry
//! guidance and the status code.

use serde::{Deserialize, Serialize};

/// Coarse classification of a component failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // === Location Resolver ===
    NotFound,
    AmbiguousMatch,

    // === Upstream / backend ===
    UpstreamUnavailable,
    UpstreamTimeout,

    // === Reference Cache ===
    InvalidKey,
    ExpiredOrEvictedKey,

    // === Visualization Normalizer ===
    UnknownProduct,
    ConflictingBands,

    // === Any component ===
    MalformedInput,
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AmbiguousMatch => "AmbiguousMatch",
            ErrorKind::UpstreamUnavailable => "UpstreamUnavailable",
            ErrorKind::UpstreamTimeout => "UpstreamTimeout",
            ErrorKind::InvalidKey => "InvalidKey",
            ErrorKind::ExpiredOrEvictedKey => "ExpiredOrEvictedKey",
            ErrorKind::UnknownProduct => "UnknownProduct",
            ErrorKind::ConflictingBands => "ConflictingBands",
            ErrorKind::MalformedInput => "MalformedInput",
            ErrorKind::Internal => "Internal",
        }
    }

    /// Transient failures that are safe to retry unchanged (or with reduced scope).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::UpstreamUnavailable | ErrorKind::UpstreamTimeout
        )
    }

    /// Get the HTTP status code for this kind.
    pub fn http_status_code(&self) -> u16 {
        match self {
            ErrorKind::MalformedInput
            | ErrorKind::InvalidKey
            | ErrorKind::ConflictingBands
            | ErrorKind::UnknownProduct => 400,

            ErrorKind::NotFound => 404,
            ErrorKind::AmbiguousMatch => 409,
            ErrorKind::ExpiredOrEvictedKey => 410,

            ErrorKind::UpstreamUnavailable => 503,
            ErrorKind::UpstreamTimeout => 504,

            ErrorKind::Internal => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
