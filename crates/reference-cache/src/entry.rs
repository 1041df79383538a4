//! Cache entries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::key::CacheKind;

/// Metadata about a backend object plus its handle.
///
/// Everything except the recency stamp is immutable after creation. Callers
/// receive entries behind an `Arc`, so a handle captured before eviction
/// stays valid for as long as the caller holds it.
#[derive(Debug)]
pub struct CacheEntry<H> {
    pub key: String,
    pub kind: CacheKind,
    pub created_at: DateTime<Utc>,
    /// Arguments of the call that produced the object.
    pub source_params: serde_json::Value,
    pub band_names: Vec<String>,
    pub object_handle: H,

    // milliseconds on the owning cache's monotonic clock
    created_ms: u64,
    last_access_ms: AtomicU64,
    // logical access order, used for LRU ranking
    last_access_seq: AtomicU64,
}

impl<H> CacheEntry<H> {
    pub(crate) fn new(
        key: String,
        kind: CacheKind,
        source_params: serde_json::Value,
        band_names: Vec<String>,
        object_handle: H,
        now_ms: u64,
        seq: u64,
    ) -> Self {
        Self {
            key,
            kind,
            created_at: Utc::now(),
            source_params,
            band_names,
            object_handle,
            created_ms: now_ms,
            last_access_ms: AtomicU64::new(now_ms),
            last_access_seq: AtomicU64::new(seq),
        }
    }

    pub(crate) fn touch(&self, now_ms: u64, seq: u64) {
        self.last_access_ms.fetch_max(now_ms, Ordering::Relaxed);
        self.last_access_seq.fetch_max(seq, Ordering::Relaxed);
    }

    pub(crate) fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_access_ms.load(Ordering::Relaxed))
    }

    pub(crate) fn access_seq(&self) -> u64 {
        self.last_access_seq.load(Ordering::Relaxed)
    }

    /// Wall-clock time of the last successful `get` (or creation).
    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        let since_creation = self
            .last_access_ms
            .load(Ordering::Relaxed)
            .saturating_sub(self.created_ms);
        self.created_at + chrono::Duration::milliseconds(since_creation as i64)
    }

    /// Serializable view without the handle.
    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            key: self.key.clone(),
            kind: self.kind,
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at(),
            band_names: self.band_names.clone(),
            source_params: self.source_params.clone(),
        }
    }
}

/// Entry metadata as reported by `cache_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySummary {
    pub key: String,
    pub kind: CacheKind,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub band_names: Vec<String>,
    pub source_params: serde_json::Value,
}
