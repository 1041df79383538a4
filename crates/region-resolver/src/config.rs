//! Configuration for the location resolver.

use std::time::Duration;

/// Tunables for resolution, caching and upstream calls.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Time-to-live for cached resolutions (successes and not-found).
    pub cache_ttl: Duration,

    /// Maximum number of cached resolutions.
    pub cache_max_entries: usize,

    /// Upper bound for a single boundary-dataset call.
    pub upstream_timeout: Duration,

    /// Upper bound for the best-effort containing-unit lookup on raw geometry.
    pub annotation_timeout: Duration,

    /// Whether raw geometry gets annotated with its containing unit.
    pub annotate_raw: bool,

    /// Maximum number of near-name suggestions on a miss.
    pub max_suggestions: usize,

    /// Number of vertices used to approximate point + radius queries.
    pub circle_segments: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(24 * 3600),
            cache_max_entries: 10_000,
            upstream_timeout: Duration::from_secs(10),
            annotation_timeout: Duration::from_millis(1500),
            annotate_raw: true,
            max_suggestions: 5,
            circle_segments: 64,
        }
    }
}

impl ResolverConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RESOLVER_CACHE_TTL_SECS") {
            if let Ok(secs) = val.parse() {
                config.cache_ttl = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("RESOLVER_CACHE_MAX_ENTRIES") {
            if let Ok(n) = val.parse() {
                config.cache_max_entries = n;
            }
        }

        if let Ok(val) = std::env::var("RESOLVER_UPSTREAM_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                config.upstream_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(val) = std::env::var("RESOLVER_ANNOTATION_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                config.annotation_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(val) = std::env::var("RESOLVER_ANNOTATE_RAW") {
            config.annotate_raw = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("RESOLVER_MAX_SUGGESTIONS") {
            if let Ok(n) = val.parse() {
                config.max_suggestions = n;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_max_entries == 0 {
            return Err("cache_max_entries must be > 0".to_string());
        }

        if self.upstream_timeout.is_zero() {
            return Err("upstream_timeout must be > 0".to_string());
        }

        if self.circle_segments < 8 {
            return Err("circle_segments must be >= 8".to_string());
        }

        Ok(())
    }
}
