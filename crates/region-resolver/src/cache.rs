//! In-memory TTL cache of location resolutions.
//!
//! Caches both successful resolutions and not-found outcomes so that
//! repeated identical queries inside the TTL never reach the boundary
//! datasets again. Upstream failures and ambiguity are never cached.
//!
//! ## Cache Key Structure
//! (normalized name, normalized parent hint, requested tier)
//!
//! ## Eviction Strategy
//! - Entry-count LRU eviction when the capacity is exceeded
//! - TTL-based expiration on read (lazy)

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::region::ResolvedRegion;
use crate::tier::Tier;

/// Cache key for name resolutions.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ResolutionKey {
    /// Normalized query name.
    pub name: String,
    /// Normalized parent hint.
    pub parent: Option<String>,
    /// Requested tier, if any.
    pub tier: Option<Tier>,
}

impl ResolutionKey {
    pub fn new(name: impl Into<String>, parent: Option<String>, tier: Option<Tier>) -> Self {
        Self {
            name: name.into(),
            parent,
            tier,
        }
    }
}

/// What a cached entry remembers.
#[derive(Debug, Clone)]
pub enum CachedOutcome {
    Resolved(Arc<ResolvedRegion>),
    NotFound { suggestions: Vec<String> },
}

struct CachedResolution {
    outcome: CachedOutcome,
    inserted_at: Instant,
    ttl: Duration,
}

impl CachedResolution {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

/// Statistics for the resolution cache.
#[derive(Default)]
pub struct ResolutionCacheStats {
    /// Total cache hits.
    pub hits: AtomicU64,
    /// Total cache misses.
    pub misses: AtomicU64,
    /// Total entries evicted by capacity.
    pub evictions: AtomicU64,
    /// Total entries expired via TTL.
    pub expired: AtomicU64,
    /// Current number of entries.
    pub entry_count: AtomicU64,
}

impl ResolutionCacheStats {
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

/// LRU + TTL cache of resolutions.
pub struct ResolutionCache {
    cache: Arc<RwLock<LruCache<ResolutionKey, CachedResolution>>>,
    default_ttl: Duration,
    stats: Arc<ResolutionCacheStats>,
}

impl ResolutionCache {
    /// Create a new resolution cache.
    ///
    /// # Arguments
    /// * `max_entries` - Maximum number of cached resolutions (at least 1)
    /// * `ttl` - Time-to-live for every entry
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);

        tracing::info!(
            "ResolutionCache initialized: max_entries={}, ttl_secs={}",
            capacity,
            ttl.as_secs()
        );

        Self {
            cache: Arc::new(RwLock::new(LruCache::new(capacity))),
            default_ttl: ttl,
            stats: Arc::new(ResolutionCacheStats::default()),
        }
    }

    /// Get a cached outcome.
    pub async fn get(&self, key: &ResolutionKey) -> Option<CachedOutcome> {
        let mut cache = self.cache.write().await;

        let expired = match cache.get(key) {
            Some(entry) if !entry.is_expired() => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("resolver_cache_hits_total").increment(1);
                return Some(entry.outcome.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired && cache.pop(key).is_some() {
            self.stats.expired.fetch_add(1, Ordering::Relaxed);
            self.stats.entry_count.fetch_sub(1, Ordering::Relaxed);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("resolver_cache_misses_total").increment(1);
        None
    }

    /// Store an outcome.
    pub async fn put(&self, key: ResolutionKey, outcome: CachedOutcome) {
        let entry = CachedResolution {
            outcome,
            inserted_at: Instant::now(),
            ttl: self.default_ttl,
        };

        let mut cache = self.cache.write().await;
        let replacing = cache.contains(&key);
        if let Some((evicted_key, _)) = cache.push(key, entry) {
            // push returns the displaced LRU entry, or the old value for the same key
            if !replacing {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(name = %evicted_key.name, "ResolutionCache evicted entry");
            }
        } else {
            self.stats.entry_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get cache statistics.
    pub fn stats(&self) -> &ResolutionCacheStats {
        &self.stats
    }

    /// Current number of entries.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Clear all entries from the cache.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let count = cache.len() as u64;
        cache.clear();
        self.stats.entry_count.store(0, Ordering::Relaxed);
        tracing::info!("ResolutionCache cleared {} entries", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_common::BoundingBox;

    fn region() -> Arc<ResolvedRegion> {
        Arc::new(ResolvedRegion::raw(BoundingBox::new(0.0, 0.0, 1.0, 1.0).to_geometry()).unwrap())
    }

    #[tokio::test]
    async fn test_cache_put_get() {
        let cache = ResolutionCache::new(10, Duration::from_secs(300));
        let key = ResolutionKey::new("san francisco", None, None);

        cache.put(key.clone(), CachedOutcome::Resolved(region())).await;

        match cache.get(&key).await {
            Some(CachedOutcome::Resolved(r)) => assert_eq!(r.bbox.max_x, 1.0),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(cache.stats().hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_key_includes_parent_and_tier() {
        let cache = ResolutionCache::new(10, Duration::from_secs(300));
        cache
            .put(
                ResolutionKey::new("springfield", Some("illinois".into()), None),
                CachedOutcome::NotFound { suggestions: vec![] },
            )
            .await;

        assert!(cache
            .get(&ResolutionKey::new("springfield", None, None))
            .await
            .is_none());
        assert!(cache
            .get(&ResolutionKey::new("springfield", Some("illinois".into()), Some(Tier::State)))
            .await
            .is_none());
        assert!(cache
            .get(&ResolutionKey::new("springfield", Some("illinois".into()), None))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let cache = ResolutionCache::new(10, Duration::from_millis(50));
        let key = ResolutionKey::new("marin", None, None);
        cache.put(key.clone(), CachedOutcome::Resolved(region())).await;

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.stats().expired.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats().entry_count.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_capacity_eviction() {
        let cache = ResolutionCache::new(2, Duration::from_secs(300));
        for name in ["a", "b", "c"] {
            cache
                .put(ResolutionKey::new(name, None, None), CachedOutcome::Resolved(region()))
                .await;
        }
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.stats().evictions.load(Ordering::Relaxed), 1);
        assert!(cache.get(&ResolutionKey::new("a", None, None)).await.is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = ResolutionCache::new(10, Duration::from_secs(300));
        cache
            .put(ResolutionKey::new("a", None, None), CachedOutcome::Resolved(region()))
            .await;
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
