//! Normalizer error types.

use geo_common::ErrorKind;
use thiserror::Error;

/// Errors that can occur while normalizing a display spec.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    /// Requested bands do not exist on the product.
    #[error("Bands {requested:?} not available; product has {available:?}")]
    ConflictingBands {
        requested: Vec<String>,
        available: Vec<String>,
    },

    /// No profile matches the dataset id.
    #[error("Unknown product '{dataset_id}'")]
    UnknownProduct {
        dataset_id: String,
        known_patterns: Vec<String>,
    },

    #[error("Malformed visualization parameters: {0}")]
    MalformedInput(String),
}

impl NormalizeError {
    /// Map onto the shared error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NormalizeError::ConflictingBands { .. } => ErrorKind::ConflictingBands,
            NormalizeError::UnknownProduct { .. } => ErrorKind::UnknownProduct,
            NormalizeError::MalformedInput(_) => ErrorKind::MalformedInput,
        }
    }
}
