//! Configuration for the reference cache.

use std::time::Duration;

/// Reference cache tunables.
#[derive(Debug, Clone)]
pub struct ReferenceCacheConfig {
    /// Sliding time-to-live measured from the last access.
    pub ttl: Duration,

    /// Capacity bound enforced by the sweeper.
    pub max_entries: usize,

    /// Entries accessed more recently than this are never capacity-evicted.
    pub min_idle: Duration,

    /// Interval between background sweeps.
    pub sweep_interval: Duration,

    /// How many removed keys are remembered for miss classification.
    pub tombstone_capacity: usize,

    /// Reserved keys still unfulfilled after this long are abandoned.
    pub pending_ttl: Duration,
}

impl Default for ReferenceCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 500,
            min_idle: Duration::ZERO,
            sweep_interval: Duration::from_secs(60),
            tombstone_capacity: 4096,
            pending_ttl: Duration::from_secs(900),
        }
    }
}

impl ReferenceCacheConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };
        let count = |name: &str, default: usize| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        Self {
            ttl: secs("REFCACHE_TTL_SECS", defaults.ttl),
            max_entries: count("REFCACHE_MAX_ENTRIES", defaults.max_entries),
            min_idle: secs("REFCACHE_MIN_IDLE_SECS", defaults.min_idle),
            sweep_interval: secs("REFCACHE_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            tombstone_capacity: count("REFCACHE_TOMBSTONES", defaults.tombstone_capacity),
            pending_ttl: secs("REFCACHE_PENDING_TTL_SECS", defaults.pending_ttl),
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl.is_zero() {
            return Err("ttl must be > 0".to_string());
        }
        if self.max_entries == 0 {
            return Err("max_entries must be > 0".to_string());
        }
        if self.sweep_interval.is_zero() {
            return Err("sweep_interval must be > 0".to_string());
        }
        if self.tombstone_capacity == 0 {
            return Err("tombstone_capacity must be > 0".to_string());
        }
        Ok(())
    }
}
