//! Operation errors and their wire representation.

use std::time::Duration;

use geo_common::ErrorKind;
use reference_cache::{CacheMiss, KEY_FORMAT};
use region_resolver::ResolveError;
use serde_json::{json, Value};
use thiserror::Error;
use vis_normalizer::NormalizeError;

use crate::backend::BackendError;

/// Errors returned by pipeline operations.
///
/// Component errors pass through unchanged so the caller sees the original
/// kind and detail.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Cache(#[from] CacheMiss),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The backend did not answer within the caller's wait.
    ///
    /// For producing calls the result is still stored under `pending_key`
    /// when the backend finishes.
    #[error("{operation} did not finish within {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
        pending_key: Option<String>,
    },

    #[error("Malformed arguments: {0}")]
    MalformedInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OperationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OperationError::Resolve(e) => e.kind(),
            OperationError::Cache(e) => e.kind(),
            OperationError::Normalize(e) => e.kind(),
            OperationError::Backend(e) => e.kind(),
            OperationError::Timeout { .. } => ErrorKind::UpstreamTimeout,
            OperationError::MalformedInput(_) => ErrorKind::MalformedInput,
            OperationError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Actionable detail for the caller, if any.
    pub fn detail(&self) -> Option<Value> {
        match self {
            OperationError::Resolve(ResolveError::NotFound { suggestions, .. }) => {
                Some(json!({ "suggestions": suggestions }))
            }
            OperationError::Resolve(ResolveError::AmbiguousMatch { candidates, .. }) => Some(json!({
                "candidates": candidates,
                "hint": "add a parent region to disambiguate",
            })),
            OperationError::Resolve(ResolveError::UpstreamTimeout { .. })
            | OperationError::Resolve(ResolveError::UpstreamUnavailable { .. }) => Some(json!({
                "hint": "boundary lookup failed; retry, or pass a bounding box instead",
            })),
            OperationError::Cache(miss) => {
                let mut detail = json!({ "key": miss.key(), "hint": miss.hint() });
                if let CacheMiss::MalformedKey { .. } = miss {
                    detail["expected_format"] = json!(KEY_FORMAT);
                }
                if let CacheMiss::ExpiredOrEvicted { reason, .. } = miss {
                    detail["reason"] = json!(reason);
                }
                Some(detail)
            }
            OperationError::Normalize(NormalizeError::ConflictingBands {
                requested,
                available,
            }) => Some(json!({ "requested": requested, "available": available })),
            OperationError::Normalize(NormalizeError::UnknownProduct { known_patterns, .. }) => {
                Some(json!({ "known_patterns": known_patterns }))
            }
            OperationError::Timeout { pending_key, .. } => {
                let mut detail = json!({
                    "hint": "retry with a shorter date range, a smaller region or a coarser scale",
                });
                if let Some(key) = pending_key {
                    detail["pending_key"] = json!(key);
                }
                Some(detail)
            }
            _ => None,
        }
    }

    /// JSON body returned across the dispatch boundary.
    pub fn to_json(&self) -> Value {
        let kind = self.kind();
        let mut body = json!({
            "error": kind.code(),
            "message": self.to_string(),
            "retryable": kind.is_retryable(),
        });
        if let Some(detail) = self.detail() {
            body["detail"] = detail;
        }
        body
    }
}
