//! Cache miss classification.

use geo_common::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a once-valid key stopped resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Idle past the TTL.
    Expired,
    /// Removed to satisfy the capacity bound.
    Capacity,
    /// Removed by an explicit bulk clear.
    Cleared,
    /// Reserved, but the producing computation failed or never finished.
    Abandoned,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvictionReason::Expired => "expired",
            EvictionReason::Capacity => "evicted for capacity",
            EvictionReason::Cleared => "cleared",
            EvictionReason::Abandoned => "producer did not complete",
        };
        f.write_str(s)
    }
}

/// A key that does not currently resolve to an entry.
///
/// Misses are normal return values, not failures of the cache.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheMiss {
    #[error("Malformed key '{key}': expected {expected}")]
    MalformedKey { key: String, expected: &'static str },

    #[error("Key '{key}' was never issued by this cache")]
    NeverExisted { key: String },

    #[error("Key '{key}' is no longer available ({reason})")]
    ExpiredOrEvicted { key: String, reason: EvictionReason },

    #[error("Key '{key}' is still being computed")]
    Pending { key: String },
}

impl CacheMiss {
    pub fn key(&self) -> &str {
        match self {
            CacheMiss::MalformedKey { key, .. }
            | CacheMiss::NeverExisted { key }
            | CacheMiss::ExpiredOrEvicted { key, .. }
            | CacheMiss::Pending { key } => key,
        }
    }

    /// Map onto the shared error taxonomy.
    ///
    /// A pending key reports as a timeout: the same call succeeds later.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheMiss::MalformedKey { .. } | CacheMiss::NeverExisted { .. } => ErrorKind::InvalidKey,
            CacheMiss::ExpiredOrEvicted { .. } => ErrorKind::ExpiredOrEvictedKey,
            CacheMiss::Pending { .. } => ErrorKind::UpstreamTimeout,
        }
    }

    /// What the caller should do next.
    pub fn hint(&self) -> &'static str {
        match self {
            CacheMiss::MalformedKey { .. } => "pass a key exactly as returned by a producing call",
            CacheMiss::NeverExisted { .. } => {
                "the key is unknown to this process; re-run the producing call"
            }
            CacheMiss::ExpiredOrEvicted { .. } => "recompute from scratch with the original arguments",
            CacheMiss::Pending { .. } => "retry later with the same key",
        }
    }
}
