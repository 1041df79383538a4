//! The reference cache proper.

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::config::ReferenceCacheConfig;
use crate::entry::{CacheEntry, EntrySummary};
use crate::error::{CacheMiss, EvictionReason};
use crate::key::{parse_key, CacheKind, KEY_FORMAT};

/// Statistics for the reference cache.
#[derive(Debug, Default)]
pub struct ReferenceCacheStats {
    pub puts: AtomicU64,
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    /// Entries removed because their TTL lapsed.
    pub expired: AtomicU64,
    /// Entries removed to satisfy the capacity bound.
    pub evictions: AtomicU64,
    /// Entries removed by `clear`.
    pub cleared: AtomicU64,
}

impl ReferenceCacheStats {
    /// Calculate cache hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    pub expired: usize,
    pub evicted: usize,
    pub abandoned: usize,
}

#[derive(Debug, Clone, Copy)]
struct Reservation {
    kind: CacheKind,
    reserved_ms: u64,
}

/// Concurrent key to backend-handle store.
///
/// Every operation is short bookkeeping on a concurrent map; nothing here
/// waits on the backend.
pub struct ReferenceCache<H> {
    entries: DashMap<String, Arc<CacheEntry<H>>>,
    reserved: DashMap<String, Reservation>,
    tombstones: Mutex<LruCache<String, EvictionReason>>,
    config: ReferenceCacheConfig,
    clock: Instant,
    seq: AtomicU64,
    stats: ReferenceCacheStats,
    pub(crate) pressure: Arc<Notify>,
}

impl<H> ReferenceCache<H> {
    pub fn new(config: ReferenceCacheConfig) -> Self {
        let tombstones = NonZeroUsize::new(config.tombstone_capacity).unwrap_or(NonZeroUsize::MIN);

        info!(
            max_entries = config.max_entries,
            ttl_secs = config.ttl.as_secs(),
            min_idle_secs = config.min_idle.as_secs(),
            "ReferenceCache initialized"
        );

        Self {
            entries: DashMap::new(),
            reserved: DashMap::new(),
            tombstones: Mutex::new(LruCache::new(tombstones)),
            config,
            clock: Instant::now(),
            seq: AtomicU64::new(0),
            stats: ReferenceCacheStats::default(),
            pressure: Arc::new(Notify::new()),
        }
    }

    fn now_ms(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// A fresh key not held by any live or reserved entry.
    fn fresh_key(&self, kind: CacheKind) -> String {
        loop {
            let key = kind.new_key();
            if !self.entries.contains_key(&key) && !self.reserved.contains_key(&key) {
                return key;
            }
        }
    }

    /// Store a completed backend object and return its key.
    pub fn put(
        &self,
        kind: CacheKind,
        source_params: serde_json::Value,
        band_names: Vec<String>,
        object_handle: H,
    ) -> String {
        let key = self.fresh_key(kind);
        self.insert(key.clone(), kind, source_params, band_names, object_handle);
        key
    }

    /// Reserve a key for an object that is still being computed.
    ///
    /// `get` reports the key as pending until [`fulfil`](Self::fulfil) or
    /// [`abandon`](Self::abandon) is called.
    pub fn reserve(&self, kind: CacheKind) -> String {
        let key = self.fresh_key(kind);
        self.reserved.insert(
            key.clone(),
            Reservation {
                kind,
                reserved_ms: self.now_ms(),
            },
        );
        debug!(key = %key, "Reserved reference");
        key
    }

    /// Complete a reservation. Fails if the key is not currently reserved,
    /// e.g. because it was cleared while the computation ran.
    pub fn fulfil(
        &self,
        key: &str,
        source_params: serde_json::Value,
        band_names: Vec<String>,
        object_handle: H,
    ) -> Result<Arc<CacheEntry<H>>, CacheMiss> {
        let (key, reservation) = self.reserved.remove(key).ok_or_else(|| self.classify(key))?;
        Ok(self.insert(key, reservation.kind, source_params, band_names, object_handle))
    }

    /// Give up on a reservation; later lookups report it as abandoned.
    pub fn abandon(&self, key: &str) {
        if let Some((key, _)) = self.reserved.remove(key) {
            debug!(key = %key, "Abandoned reservation");
            self.tombstones.lock().put(key, EvictionReason::Abandoned);
        }
    }

    fn insert(
        &self,
        key: String,
        kind: CacheKind,
        source_params: serde_json::Value,
        band_names: Vec<String>,
        object_handle: H,
    ) -> Arc<CacheEntry<H>> {
        let entry = Arc::new(CacheEntry::new(
            key.clone(),
            kind,
            source_params,
            band_names,
            object_handle,
            self.now_ms(),
            self.next_seq(),
        ));
        self.entries.insert(key.clone(), Arc::clone(&entry));

        self.stats.puts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("refcache_puts_total", "kind" => kind.as_str()).increment(1);
        let len = self.entries.len();
        metrics::gauge!("refcache_entries").set(len as f64);
        info!(key = %key, kind = %kind, "Stored reference");

        if len > self.config.max_entries {
            self.pressure.notify_one();
        }
        entry
    }

    /// Redeem a key.
    ///
    /// A hit refreshes the entry's recency. Repeated hits on a live key
    /// return the same `Arc`.
    pub fn get(&self, key: &str) -> Result<Arc<CacheEntry<H>>, CacheMiss> {
        let result = self.lookup(key);
        match &result {
            Ok(_) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("refcache_hits_total").increment(1);
            }
            Err(miss) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("refcache_misses_total", "reason" => miss_label(miss)).increment(1);
                debug!(key = %key, reason = miss_label(miss), "Reference miss");
            }
        }
        result
    }

    fn lookup(&self, key: &str) -> Result<Arc<CacheEntry<H>>, CacheMiss> {
        if parse_key(key).is_none() {
            return Err(CacheMiss::MalformedKey {
                key: key.to_string(),
                expected: KEY_FORMAT,
            });
        }

        // clone out of the map so no shard lock is held below
        let found = self.entries.get(key).map(|e| Arc::clone(e.value()));
        if let Some(entry) = found {
            let now = self.now_ms();
            if entry.idle_ms(now) <= self.config.ttl.as_millis() as u64 {
                entry.touch(now, self.next_seq());
                return Ok(entry);
            }
            self.remove_entry(&entry, EvictionReason::Expired);
        }

        Err(self.classify(key))
    }

    fn classify(&self, key: &str) -> CacheMiss {
        if self.reserved.contains_key(key) {
            return CacheMiss::Pending {
                key: key.to_string(),
            };
        }
        match self.tombstones.lock().get(key).copied() {
            Some(reason) => CacheMiss::ExpiredOrEvicted {
                key: key.to_string(),
                reason,
            },
            None => CacheMiss::NeverExisted {
                key: key.to_string(),
            },
        }
    }

    /// Remove `entry` if it is still the live entry for its key.
    fn remove_entry(&self, entry: &Arc<CacheEntry<H>>, reason: EvictionReason) -> bool {
        let removed = self
            .entries
            .remove_if(&entry.key, |_, live| Arc::ptr_eq(live, entry))
            .is_some();
        if removed {
            self.tombstones.lock().put(entry.key.clone(), reason);
            let counter = match reason {
                EvictionReason::Expired => &self.stats.expired,
                EvictionReason::Capacity => &self.stats.evictions,
                EvictionReason::Cleared | EvictionReason::Abandoned => &self.stats.cleared,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Remove expired entries, then enforce the capacity bound.
    ///
    /// Capacity eviction removes exactly `len - max_entries` entries (fewer
    /// if not enough are idle for `min_idle`), least recently used first.
    pub fn evict(&self) -> EvictionReport {
        let mut report = EvictionReport::default();
        let now = self.now_ms();
        let ttl_ms = self.config.ttl.as_millis() as u64;
        let min_idle_ms = self.config.min_idle.as_millis() as u64;

        let expired: Vec<Arc<CacheEntry<H>>> = self
            .entries
            .iter()
            .filter(|e| e.value().idle_ms(now) > ttl_ms)
            .map(|e| Arc::clone(e.value()))
            .collect();
        for entry in &expired {
            if self.remove_entry(entry, EvictionReason::Expired) {
                report.expired += 1;
            }
        }

        let excess = self.entries.len().saturating_sub(self.config.max_entries);
        if excess > 0 {
            let mut candidates: Vec<(u64, Arc<CacheEntry<H>>)> = self
                .entries
                .iter()
                .filter(|e| e.value().idle_ms(now) >= min_idle_ms)
                .map(|e| (e.value().access_seq(), Arc::clone(e.value())))
                .collect();
            candidates.sort_by_key(|(seq, _)| *seq);

            for (seq, entry) in candidates {
                if report.evicted >= excess {
                    break;
                }
                // skip entries touched since the snapshot
                if entry.access_seq() != seq {
                    continue;
                }
                if self.remove_entry(&entry, EvictionReason::Capacity) {
                    report.evicted += 1;
                }
            }
        }

        let pending_ttl_ms = self.config.pending_ttl.as_millis() as u64;
        let stale: Vec<String> = self
            .reserved
            .iter()
            .filter(|r| now.saturating_sub(r.value().reserved_ms) > pending_ttl_ms)
            .map(|r| r.key().clone())
            .collect();
        for key in stale {
            if self.reserved.remove(&key).is_some() {
                self.tombstones.lock().put(key, EvictionReason::Abandoned);
                report.abandoned += 1;
            }
        }

        if report != EvictionReport::default() {
            metrics::counter!("refcache_expired_total").increment(report.expired as u64);
            metrics::counter!("refcache_evictions_total").increment(report.evicted as u64);
            metrics::gauge!("refcache_entries").set(self.entries.len() as f64);
            info!(
                expired = report.expired,
                evicted = report.evicted,
                abandoned = report.abandoned,
                remaining = self.entries.len(),
                "Reference cache sweep"
            );
        }
        report
    }

    /// Drop every entry (and reservation) of `kind`, or everything when `None`.
    pub fn clear(&self, kind: Option<CacheKind>) -> usize {
        let matches = |k: CacheKind| kind.map_or(true, |wanted| wanted == k);

        let doomed: Vec<Arc<CacheEntry<H>>> = self
            .entries
            .iter()
            .filter(|e| matches(e.value().kind))
            .map(|e| Arc::clone(e.value()))
            .collect();
        let removed = doomed
            .iter()
            .filter(|entry| self.remove_entry(entry, EvictionReason::Cleared))
            .count();

        let reservations: Vec<String> = self
            .reserved
            .iter()
            .filter(|r| matches(r.value().kind))
            .map(|r| r.key().clone())
            .collect();
        for key in reservations {
            if self.reserved.remove(&key).is_some() {
                self.tombstones.lock().put(key, EvictionReason::Cleared);
            }
        }

        metrics::gauge!("refcache_entries").set(self.entries.len() as f64);
        info!(
            kind = kind.map(|k| k.as_str()).unwrap_or("all"),
            removed, "Reference cache cleared"
        );
        removed
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of reserved, unfinished keys.
    pub fn pending(&self) -> usize {
        self.reserved.len()
    }

    /// Metadata of live entries, most recently used first.
    pub fn summaries(&self, kind: Option<CacheKind>) -> Vec<EntrySummary> {
        let mut live: Vec<(u64, EntrySummary)> = self
            .entries
            .iter()
            .filter(|e| kind.map_or(true, |k| k == e.value().kind))
            .map(|e| (e.value().access_seq(), e.value().summary()))
            .collect();
        live.sort_by(|a, b| b.0.cmp(&a.0));
        live.into_iter().map(|(_, s)| s).collect()
    }

    pub fn stats(&self) -> &ReferenceCacheStats {
        &self.stats
    }

    pub fn config(&self) -> &ReferenceCacheConfig {
        &self.config
    }
}

fn miss_label(miss: &CacheMiss) -> &'static str {
    match miss {
        CacheMiss::MalformedKey { .. } => "malformed",
        CacheMiss::NeverExisted { .. } => "never_existed",
        CacheMiss::ExpiredOrEvicted { .. } => "expired_or_evicted",
        CacheMiss::Pending { .. } => "pending",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn cache(max_entries: usize) -> ReferenceCache<u32> {
        ReferenceCache::new(ReferenceCacheConfig {
            max_entries,
            ..Default::default()
        })
    }

    #[test]
    fn test_put_then_get_returns_same_entry() {
        let cache = cache(10);
        let key = cache.put(CacheKind::Composite, json!({"dataset": "S2"}), vec!["B4".into()], 7);
        assert!(key.starts_with("composite_"));

        let first = cache.get(&key).unwrap();
        let second = cache.get(&key).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.object_handle, 7);
        assert_eq!(first.band_names, vec!["B4".to_string()]);
        assert_eq!(cache.stats().hits.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_miss_classification() {
        let cache = cache(10);
        assert!(matches!(
            cache.get("composite_doesnotexist"),
            Err(CacheMiss::MalformedKey { .. })
        ));
        assert!(matches!(
            cache.get("composite_0123456789abcdef0123456789abcdef"),
            Err(CacheMiss::NeverExisted { .. })
        ));

        let key = cache.put(CacheKind::Mask, json!({}), vec![], 1);
        cache.clear(None);
        assert_eq!(
            cache.get(&key).unwrap_err(),
            CacheMiss::ExpiredOrEvicted {
                key: key.clone(),
                reason: EvictionReason::Cleared
            }
        );
        assert_eq!(cache.stats().misses.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_reserve_fulfil_abandon() {
        let cache = cache(10);
        let key = cache.reserve(CacheKind::Index);
        assert!(matches!(cache.get(&key), Err(CacheMiss::Pending { .. })));
        assert_eq!(cache.pending(), 1);

        cache.fulfil(&key, json!({}), vec!["NDVI".into()], 3).unwrap();
        assert_eq!(cache.get(&key).unwrap().kind, CacheKind::Index);
        assert!(cache.fulfil(&key, json!({}), vec![], 4).is_err());

        let failed = cache.reserve(CacheKind::Composite);
        cache.abandon(&failed);
        assert!(matches!(
            cache.get(&failed),
            Err(CacheMiss::ExpiredOrEvicted { reason: EvictionReason::Abandoned, .. })
        ));
    }

    #[test]
    fn test_clear_by_kind() {
        let cache = cache(10);
        let composite = cache.put(CacheKind::Composite, json!({}), vec![], 1);
        let index = cache.put(CacheKind::Index, json!({}), vec![], 2);
        let pending = cache.reserve(CacheKind::Index);

        assert_eq!(cache.clear(Some(CacheKind::Index)), 1);
        assert!(cache.get(&composite).is_ok());
        assert!(cache.get(&index).is_err());
        assert!(cache.fulfil(&pending, json!({}), vec![], 3).is_err());
    }

    #[test]
    fn test_capacity_eviction_is_lru_and_minimal() {
        let cache = cache(3);
        let keys: Vec<String> = (0..5)
            .map(|i| cache.put(CacheKind::Other, json!({ "i": i }), vec![], i))
            .collect();
        // touch the oldest so it becomes most recent
        cache.get(&keys[0]).unwrap();

        let report = cache.evict();
        assert_eq!(report.evicted, 2);
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&keys[0]).is_ok());
        for key in &keys[1..3] {
            assert!(matches!(
                cache.get(key),
                Err(CacheMiss::ExpiredOrEvicted { reason: EvictionReason::Capacity, .. })
            ));
        }
        assert!(cache.get(&keys[3]).is_ok());
        assert!(cache.get(&keys[4]).is_ok());

        assert_eq!(cache.evict(), EvictionReport::default());
    }

    #[test]
    fn test_min_idle_protects_recent_entries() {
        let cache: ReferenceCache<u32> = ReferenceCache::new(ReferenceCacheConfig {
            max_entries: 1,
            min_idle: Duration::from_secs(3600),
            ..Default::default()
        });
        cache.put(CacheKind::Other, json!({}), vec![], 1);
        cache.put(CacheKind::Other, json!({}), vec![], 2);

        assert_eq!(cache.evict().evicted, 0);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_ttl_expiry_on_get() {
        let cache: ReferenceCache<u32> = ReferenceCache::new(ReferenceCacheConfig {
            ttl: Duration::from_millis(30),
            ..Default::default()
        });
        let key = cache.put(CacheKind::Composite, json!({}), vec![], 1);
        std::thread::sleep(Duration::from_millis(80));

        assert!(matches!(
            cache.get(&key),
            Err(CacheMiss::ExpiredOrEvicted { reason: EvictionReason::Expired, .. })
        ));
        assert_eq!(cache.stats().expired.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_handle_survives_eviction() {
        let cache: ReferenceCache<Arc<String>> = ReferenceCache::new(ReferenceCacheConfig::default());
        let key = cache.put(
            CacheKind::Composite,
            json!({}),
            vec![],
            Arc::new("projects/p/assets/tmp".to_string()),
        );
        let held = cache.get(&key).unwrap();
        cache.clear(None);

        assert_eq!(held.object_handle.as_str(), "projects/p/assets/tmp");
        assert!(cache.get(&key).is_err());
    }

    #[test]
    fn test_summaries_most_recent_first() {
        let cache = cache(10);
        let a = cache.put(CacheKind::Composite, json!({}), vec![], 1);
        let b = cache.put(CacheKind::Index, json!({}), vec!["NDVI".into()], 2);
        cache.get(&a).unwrap();

        let keys: Vec<String> = cache.summaries(None).into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec![a.clone(), b.clone()]);
        assert_eq!(cache.summaries(Some(CacheKind::Index)).len(), 1);
    }
}
