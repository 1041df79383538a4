//! Application state for the pipeline API.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use reference_cache::ReferenceCache;
use region_resolver::{AliasTable, BoundarySource, InMemoryBoundarySource, LocationResolver};
use tracing::{info, warn};
use vis_normalizer::ProfileTable;

use crate::backend::{ComputeBackend, HttpComputeBackend};
use crate::config::ServiceConfig;
use crate::operations::Pipeline;

/// Shared application state.
pub struct AppState {
    pub pipeline: Pipeline,
    pub config: ServiceConfig,
}

impl AppState {
    /// Build state talking to the HTTP compute backend.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let backend = HttpComputeBackend::new(&config.backend_url, config.backend_request_timeout)
            .context("Failed to create compute backend client")?;
        Self::with_backend(config, Arc::new(backend))
    }

    /// Build state around any backend implementation.
    pub fn with_backend(config: ServiceConfig, backend: Arc<dyn ComputeBackend>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow!(e))
            .context("Invalid service configuration")?;

        let sources: Vec<Arc<dyn BoundarySource>> =
            InMemoryBoundarySource::load_dir(&config.boundaries_dir())?
                .into_iter()
                .map(|s| Arc::new(s) as Arc<dyn BoundarySource>)
                .collect();
        if sources.is_empty() {
            warn!("No boundary datasets loaded; only coordinates and geometry will resolve");
        }

        let aliases = AliasTable::load_file(&config.aliases_path())?;
        let profiles = ProfileTable::load_file(&config.profiles_path())?;

        info!(
            datasets = sources.len(),
            aliases = aliases.len(),
            profiles = profiles.len(),
            "Loaded reference data"
        );

        let resolver = LocationResolver::new(sources, aliases, config.resolver.clone());
        let cache = ReferenceCache::new(config.cache.clone());
        let pipeline = Pipeline::new(backend, resolver, cache, profiles, config.backend_wait);

        Ok(Self { pipeline, config })
    }
}
