//! Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reference_cache::ReferenceCacheConfig;
use region_resolver::ResolverConfig;

/// Configuration for the pipeline service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the compute backend.
    pub backend_url: String,

    /// How long a caller waits for a backend call before getting a timeout.
    pub backend_wait: Duration,

    /// Hard limit for a single backend HTTP request, including background
    /// completion after the caller stopped waiting.
    pub backend_request_timeout: Duration,

    /// Directory holding `boundaries/`, `aliases.yaml` and `profiles.yaml`.
    pub config_dir: PathBuf,

    pub resolver: ResolverConfig,
    pub cache: ReferenceCacheConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8090".to_string(),
            backend_wait: Duration::from_secs(60),
            backend_request_timeout: Duration::from_secs(900),
            config_dir: PathBuf::from("config"),
            resolver: ResolverConfig::default(),
            cache: ReferenceCacheConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self {
            resolver: ResolverConfig::from_env(),
            cache: ReferenceCacheConfig::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("BACKEND_URL") {
            config.backend_url = val;
        }

        if let Ok(val) = std::env::var("BACKEND_WAIT_SECS") {
            if let Ok(secs) = val.parse() {
                config.backend_wait = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("BACKEND_REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.backend_request_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("CONFIG_DIR") {
            config.config_dir = PathBuf::from(val);
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.backend_url.is_empty() {
            return Err("backend_url must not be empty".to_string());
        }

        if self.backend_wait.is_zero() {
            return Err("backend_wait must be > 0".to_string());
        }

        if self.backend_request_timeout < self.backend_wait {
            return Err("backend_request_timeout must be >= backend_wait".to_string());
        }

        self.resolver
            .validate()
            .map_err(|e| format!("resolver: {}", e))?;
        self.cache.validate().map_err(|e| format!("cache: {}", e))?;

        Ok(())
    }

    pub fn boundaries_dir(&self) -> PathBuf {
        self.config_dir.join("boundaries")
    }

    pub fn aliases_path(&self) -> PathBuf {
        self.config_dir.join("aliases.yaml")
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.config_dir.join("profiles.yaml")
    }

    pub fn with_config_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config_dir = dir.as_ref().to_path_buf();
        self
    }
}
