//! Pipeline operations.
//!
//! Every operation is one stateless call: an operation name plus a flat
//! argument object. Producing operations (`build_composite`,
//! `compute_index`) return a cache key; consuming operations (`render`)
//! redeem keys. Nothing is carried between calls except those keys.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use futures::future::join_all;
use geo_common::{BoundingBox, RegionGeometry};
use reference_cache::{CacheEntry, CacheKind, ReferenceCache};
use region_resolver::{LocationQuery, LocationResolver, ResolvedRegion, Tier};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use vis_normalizer::indices::CATALOG;
use vis_normalizer::{
    normalize, Correction, NormalizeError, ProductProfile, ProfileTable, Sensor, SpectralIndex,
    Verification, VisualizationSpec,
};

use crate::backend::{
    BackendError, BackendObject, BandMathRequest, CompositeRequest, ComputeBackend, Reducer,
    RenderRequest,
};
use crate::error::OperationError;
use crate::presets;

/// Operation names accepted by [`Pipeline::dispatch`].
pub const OPERATIONS: [&str; 6] = [
    "resolve_location",
    "build_composite",
    "compute_index",
    "render",
    "cache_info",
    "clear_cache",
];

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveArgs {
    #[serde(alias = "location", alias = "name")]
    pub region: Value,
    #[serde(default)]
    pub parent: Option<String>,
    /// Restrict to this tier and coarser.
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default = "default_true")]
    pub include_geometry: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeArgs {
    #[serde(alias = "collection", alias = "dataset_id")]
    pub dataset: String,
    #[serde(alias = "startDate")]
    pub start_date: NaiveDate,
    #[serde(alias = "endDate")]
    pub end_date: NaiveDate,
    #[serde(alias = "location")]
    pub region: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub reducer: Reducer,
    #[serde(default)]
    pub bands: Vec<String>,
    #[serde(default = "default_true", alias = "cloudMask")]
    pub cloud_mask: bool,
    #[serde(default, alias = "maxCloudPercent", skip_serializing_if = "Option::is_none")]
    pub max_cloud_percent: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexArgs {
    #[serde(alias = "key", alias = "composite_key")]
    pub source_key: String,
    /// Catalog index name, e.g. `NDVI`.
    #[serde(default, alias = "indexType", alias = "index_type")]
    pub index: Option<String>,
    /// Custom band-math expression; needs `bindings`.
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
    #[serde(default, alias = "name")]
    pub output_band: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayerArgs {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "visParams", alias = "vis_params")]
    pub vis: VisualizationSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderArgs {
    #[serde(alias = "source_key")]
    pub key: String,
    /// Region to clip to; defaults to the producer's region.
    #[serde(default, alias = "location")]
    pub region: Option<Value>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default, alias = "visParams", alias = "vis_params")]
    pub vis: Option<VisualizationSpec>,
    #[serde(default)]
    pub layers: Vec<LayerArgs>,
    /// Fail the whole call with `UnknownProduct`, instead of rendering
    /// unverified, when no profile matches. The product is shared by every
    /// layer, so no layer is rendered.
    #[serde(default)]
    pub require_profile: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheInfoArgs {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub kind: Option<CacheKind>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClearArgs {
    #[serde(default)]
    pub kind: Option<CacheKind>,
    /// Also drop cached location resolutions.
    #[serde(default)]
    pub locations: bool,
}

/// Provenance of a resolved region, without its geometry.
#[derive(Debug, Clone, Serialize)]
pub struct RegionSummary {
    pub label: String,
    pub tier: Tier,
    pub dataset: String,
    pub area_km2: f64,
    pub bbox: BoundingBox,
}

impl From<&ResolvedRegion> for RegionSummary {
    fn from(region: &ResolvedRegion) -> Self {
        Self {
            label: region.label().to_string(),
            tier: region.source_tier,
            dataset: region.source_dataset.clone(),
            area_km2: region.area_km2,
            bbox: region.bbox,
        }
    }
}

/// Result of a producing operation.
#[derive(Debug, Clone, Serialize)]
pub struct Produced {
    pub key: String,
    pub kind: CacheKind,
    pub band_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedLayer {
    pub name: String,
    pub url: String,
    pub vis: VisualizationSpec,
    pub corrections: Vec<Correction>,
    pub verification: Verification,
}

/// Outcome of one display layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LayerOutcome {
    Rendered(RenderedLayer),
    Failed { name: String, error: Value },
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderResult {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionSummary>,
    pub layers: Vec<LayerOutcome>,
    pub failed: usize,
}

/// The glue between callers, the location resolver, the reference cache,
/// the visualization normalizer and the compute backend.
pub struct Pipeline {
    backend: Arc<dyn ComputeBackend>,
    resolver: Arc<LocationResolver>,
    cache: Arc<ReferenceCache<BackendObject>>,
    profiles: Arc<ProfileTable>,
    backend_wait: Duration,
}

impl Pipeline {
    pub fn new(
        backend: Arc<dyn ComputeBackend>,
        resolver: LocationResolver,
        cache: ReferenceCache<BackendObject>,
        profiles: ProfileTable,
        backend_wait: Duration,
    ) -> Self {
        Self {
            backend,
            resolver: Arc::new(resolver),
            cache: Arc::new(cache),
            profiles: Arc::new(profiles),
            backend_wait,
        }
    }

    pub fn cache(&self) -> &Arc<ReferenceCache<BackendObject>> {
        &self.cache
    }

    pub fn resolver(&self) -> &LocationResolver {
        &self.resolver
    }

    pub fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }

    /// Run an operation by name with a flat argument object.
    #[instrument(skip(self, args))]
    pub async fn dispatch(&self, operation: &str, args: Value) -> Result<Value, OperationError> {
        let label = OPERATIONS
            .iter()
            .copied()
            .find(|op| *op == operation)
            .unwrap_or("unknown");
        let start = Instant::now();

        let result = self.run(label, operation, args).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind().code(),
        };
        metrics::counter!("pipeline_operations_total", "operation" => label, "outcome" => outcome)
            .increment(1);
        metrics::histogram!("pipeline_operation_duration_seconds", "operation" => label)
            .record(start.elapsed().as_secs_f64());

        result
    }

    async fn run(&self, label: &str, operation: &str, args: Value) -> Result<Value, OperationError> {
        match label {
            "resolve_location" => {
                let args: ResolveArgs = parse_args(operation, args)?;
                let region = self.resolve_location(&args).await?;
                region_json(&region, args.include_geometry)
            }
            "build_composite" => {
                let args: CompositeArgs = parse_args(operation, args)?;
                to_json(&self.build_composite(args).await?)
            }
            "compute_index" => {
                let args: IndexArgs = parse_args(operation, args)?;
                to_json(&self.compute_index(args).await?)
            }
            "render" => {
                let args: RenderArgs = parse_args(operation, args)?;
                to_json(&self.render(args).await?)
            }
            "cache_info" => self.cache_info(parse_args(operation, args)?),
            "clear_cache" => self.clear_cache(parse_args(operation, args)?).await,
            _ => Err(OperationError::MalformedInput(format!(
                "unknown operation '{}'; expected one of: {}",
                operation,
                OPERATIONS.join(", ")
            ))),
        }
    }

    /// Resolve a region argument.
    pub async fn resolve_location(
        &self,
        args: &ResolveArgs,
    ) -> Result<Arc<ResolvedRegion>, OperationError> {
        let tier = parse_tier(args.tier.as_deref())?;
        let query = location_query(&args.region, args.parent.as_deref())?;
        Ok(self.resolver.resolve(&query, tier).await?)
    }

    /// Filter a collection by date and region, reduce it, and cache the result.
    #[instrument(skip(self, args), fields(dataset = %args.dataset))]
    pub async fn build_composite(&self, args: CompositeArgs) -> Result<Produced, OperationError> {
        if args.dataset.trim().is_empty() {
            return Err(OperationError::MalformedInput("dataset is required".to_string()));
        }
        if args.end_date < args.start_date {
            return Err(OperationError::MalformedInput(format!(
                "end_date {} is before start_date {}",
                args.end_date, args.start_date
            )));
        }
        if let Some(pct) = args.max_cloud_percent {
            if !(0.0..=100.0).contains(&pct) {
                return Err(OperationError::MalformedInput(format!(
                    "max_cloud_percent must be within 0-100, got {}",
                    pct
                )));
            }
        }

        let query = location_query(&args.region, args.parent.as_deref())?;
        let region = self.resolver.resolve(&query, None).await?;

        let profile = self.profiles.lookup(&args.dataset);
        if let Some(profile) = profile {
            if !args.bands.is_empty() && !profile.band_names.is_empty() {
                require_bands(&args.bands, &profile.band_names)?;
            }
        }

        let preprocessing = presets::for_dataset(&args.dataset);
        if args.cloud_mask && preprocessing.cloud_mask.is_none() {
            debug!("No cloud mask known for this collection; compositing unmasked");
        }

        let fallback_bands = if !args.bands.is_empty() {
            args.bands.clone()
        } else {
            profile.map(|p| p.band_names.clone()).unwrap_or_default()
        };

        let request = CompositeRequest {
            dataset: args.dataset.clone(),
            start_date: args.start_date,
            end_date: args.end_date,
            geometry: region.geometry.clone(),
            reducer: args.reducer,
            bands: args.bands.clone(),
            cloud_mask: preprocessing.cloud_mask.filter(|_| args.cloud_mask),
            max_cloud_percent: args.max_cloud_percent,
            rescale: preprocessing.rescale,
        };

        let mut source_params = to_json(&args)?;
        source_params["operation"] = json!("build_composite");
        source_params["region_label"] = json!(region.label());

        let backend = Arc::clone(&self.backend);
        let entry = self
            .produce(
                "build_composite",
                CacheKind::Composite,
                source_params,
                fallback_bands,
                async move { backend.composite(request).await },
            )
            .await?;

        Ok(Produced {
            key: entry.key.clone(),
            kind: entry.kind,
            band_names: entry.band_names.clone(),
            region: Some(RegionSummary::from(region.as_ref())),
        })
    }

    /// Derive a single-band index from a cached object.
    #[instrument(skip(self, args), fields(source_key = %args.source_key))]
    pub async fn compute_index(&self, args: IndexArgs) -> Result<Produced, OperationError> {
        let source = self.cache.get(&args.source_key)?;
        let dataset = source
            .source_params
            .get("dataset")
            .and_then(Value::as_str)
            .map(str::to_string);

        let (expression, bindings, output_band) = match (&args.index, &args.expression) {
            (Some(name), None) => {
                let index = SpectralIndex::find(name).ok_or_else(|| {
                    OperationError::MalformedInput(format!(
                        "unknown index '{}'; known indices: {}",
                        name,
                        CATALOG.iter().map(|i| i.name).collect::<Vec<_>>().join(", ")
                    ))
                })?;
                let sensor = dataset.as_deref().and_then(Sensor::from_dataset).ok_or_else(|| {
                    OperationError::MalformedInput(format!(
                        "no band mapping for dataset {:?}; pass expression and bindings instead",
                        dataset
                    ))
                })?;
                let bindings = index.bindings(sensor).ok_or_else(|| {
                    OperationError::MalformedInput(format!(
                        "{} is not available for {:?}",
                        index.name, sensor
                    ))
                })?;
                let output = args.output_band.clone().unwrap_or_else(|| index.name.to_string());
                (index.expression.to_string(), bindings, output)
            }
            (None, Some(expression)) => {
                if args.bindings.is_empty() {
                    return Err(OperationError::MalformedInput(
                        "a custom expression needs bindings from variable to band".to_string(),
                    ));
                }
                let output = args.output_band.clone().unwrap_or_else(|| "index".to_string());
                (expression.clone(), args.bindings.clone(), output)
            }
            (Some(_), Some(_)) => {
                return Err(OperationError::MalformedInput(
                    "pass either index or expression, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(OperationError::MalformedInput(
                    "index or expression is required".to_string(),
                ))
            }
        };

        if !source.band_names.is_empty() {
            let bound: Vec<String> = bindings.values().cloned().collect();
            require_bands(&bound, &source.band_names)?;
        }

        let source_params = json!({
            "operation": "compute_index",
            "source_key": source.key,
            "dataset": dataset,
            "region": source.source_params.get("region"),
            "parent": source.source_params.get("parent"),
            "index": args.index,
            "expression": expression,
            "bindings": bindings,
        });

        let request = BandMathRequest {
            source: source.object_handle.clone(),
            expression,
            bindings,
            output_band: output_band.clone(),
        };
        let backend = Arc::clone(&self.backend);
        let entry = self
            .produce(
                "compute_index",
                CacheKind::Index,
                source_params,
                vec![output_band],
                async move { backend.band_math(request).await },
            )
            .await?;

        Ok(Produced {
            key: entry.key.clone(),
            kind: entry.kind,
            band_names: entry.band_names.clone(),
            region: None,
        })
    }

    /// Render a cached object with one or more display layers.
    ///
    /// Each layer is normalized and rendered independently. With several
    /// layers a failing layer is reported in place; a single layer's error is
    /// returned as the call's error.
    #[instrument(skip(self, args), fields(key = %args.key))]
    pub async fn render(&self, args: RenderArgs) -> Result<RenderResult, OperationError> {
        let entry = self.cache.get(&args.key)?;

        let region_value = args
            .region
            .clone()
            .or_else(|| entry.source_params.get("region").cloned())
            .filter(|v| !v.is_null());
        let parent = args.parent.clone().or_else(|| {
            entry
                .source_params
                .get("parent")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        let region = match region_value {
            Some(value) => {
                let query = location_query(&value, parent.as_deref())?;
                Some(self.resolver.resolve(&query, None).await?)
            }
            None => None,
        };

        // checked once for the entry, before any layer is rendered
        let dataset = entry.source_params.get("dataset").and_then(Value::as_str);
        let profile = match (dataset, args.require_profile) {
            (Some(id), true) => Some(self.profiles.require(id)?),
            (Some(id), false) => self.profiles.lookup(id),
            (None, true) => {
                return Err(OperationError::MalformedInput(format!(
                    "{} has no dataset to look up a product profile for",
                    entry.key
                )))
            }
            (None, false) => None,
        };

        let mut layers = args.layers.clone();
        if layers.is_empty() {
            layers.push(LayerArgs {
                name: None,
                vis: args.vis.clone().unwrap_or_default(),
            });
        }

        let geometry = region.as_ref().map(|r| r.geometry.clone());
        let single = layers.len() == 1;
        let rendered = join_all(layers.into_iter().enumerate().map(|(i, layer)| {
            let name = layer.name.clone().unwrap_or_else(|| format!("layer_{}", i + 1));
            let geometry = geometry.clone();
            let entry = &entry;
            async move {
                let result = self.render_layer(&name, &layer.vis, entry, profile, geometry).await;
                (name, result)
            }
        }))
        .await;

        let mut outcomes = Vec::with_capacity(rendered.len());
        let mut failed = 0;
        for (name, result) in rendered {
            match result {
                Ok(layer) => outcomes.push(LayerOutcome::Rendered(layer)),
                Err(e) if single => return Err(e),
                Err(e) => {
                    warn!(layer = %name, error = %e, "Layer failed");
                    failed += 1;
                    outcomes.push(LayerOutcome::Failed {
                        name,
                        error: e.to_json(),
                    });
                }
            }
        }

        Ok(RenderResult {
            key: entry.key.clone(),
            region: region.as_deref().map(RegionSummary::from),
            layers: outcomes,
            failed,
        })
    }

    async fn render_layer(
        &self,
        name: &str,
        vis: &VisualizationSpec,
        entry: &CacheEntry<BackendObject>,
        profile: Option<&ProductProfile>,
        geometry: Option<RegionGeometry>,
    ) -> Result<RenderedLayer, OperationError> {
        let normalized = normalize(vis, profile, Some(&entry.band_names))?;
        if !normalized.is_unchanged() {
            info!(
                layer = %name,
                corrections = normalized.corrections.len(),
                "Display parameters corrected"
            );
        }

        let request = RenderRequest {
            source: entry.object_handle.clone(),
            geometry,
            vis: normalized.spec.clone(),
        };
        let output = match timeout(self.backend_wait, self.backend.render(request)).await {
            Ok(result) => result?,
            Err(_) => {
                metrics::counter!("pipeline_backend_timeouts_total", "operation" => "render")
                    .increment(1);
                return Err(OperationError::Timeout {
                    operation: "render",
                    timeout: self.backend_wait,
                    pending_key: None,
                });
            }
        };

        Ok(RenderedLayer {
            name: name.to_string(),
            url: output.url,
            vis: normalized.spec,
            corrections: normalized.corrections,
            verification: normalized.verification,
        })
    }

    /// Entry metadata and cache statistics.
    pub fn cache_info(&self, args: CacheInfoArgs) -> Result<Value, OperationError> {
        if let Some(key) = args.key {
            let entry = self.cache.get(&key)?;
            return Ok(json!({ "entry": entry.summary() }));
        }

        let stats = self.cache.stats();
        let locations = self.resolver.cache_stats();
        Ok(json!({
            "entries": self.cache.summaries(args.kind),
            "stats": {
                "live": self.cache.len(),
                "pending": self.cache.pending(),
                "puts": stats.puts.load(Ordering::Relaxed),
                "hits": stats.hits.load(Ordering::Relaxed),
                "misses": stats.misses.load(Ordering::Relaxed),
                "expired": stats.expired.load(Ordering::Relaxed),
                "evictions": stats.evictions.load(Ordering::Relaxed),
                "cleared": stats.cleared.load(Ordering::Relaxed),
                "hit_rate": stats.hit_rate(),
            },
            "locations": {
                "cached": locations.entry_count.load(Ordering::Relaxed),
                "hits": locations.hits.load(Ordering::Relaxed),
                "misses": locations.misses.load(Ordering::Relaxed),
                "hit_rate": locations.hit_rate(),
            },
        }))
    }

    /// Bulk invalidation.
    pub async fn clear_cache(&self, args: ClearArgs) -> Result<Value, OperationError> {
        let cleared = self.cache.clear(args.kind);
        if args.locations {
            self.resolver.clear_cache().await;
        }
        info!(cleared, kind = ?args.kind, locations = args.locations, "Cache cleared");
        Ok(json!({ "cleared": cleared, "locations_cleared": args.locations }))
    }

    /// Reserve a key, run `work` on the backend, and store its result.
    ///
    /// The caller waits at most `backend_wait`. On timeout the work keeps
    /// running and fulfils the reserved key when it completes.
    async fn produce<F>(
        &self,
        operation: &'static str,
        kind: CacheKind,
        source_params: Value,
        fallback_bands: Vec<String>,
        work: F,
    ) -> Result<Arc<CacheEntry<BackendObject>>, OperationError>
    where
        F: Future<Output = Result<BackendObject, BackendError>> + Send + 'static,
    {
        let key = self.cache.reserve(kind);
        let cache = Arc::clone(&self.cache);
        let task_key = key.clone();
        let start = Instant::now();

        let task = tokio::spawn(async move {
            match work.await {
                Ok(object) => {
                    let bands = if object.band_names.is_empty() {
                        fallback_bands
                    } else {
                        object.band_names.clone()
                    };
                    let stored = cache.fulfil(&task_key, source_params, bands, object);
                    if let Err(miss) = &stored {
                        warn!(key = %task_key, reason = %miss, "Backend result discarded");
                    }
                    stored.map_err(OperationError::from)
                }
                Err(e) => {
                    warn!(key = %task_key, error = %e, "Backend call failed");
                    cache.abandon(&task_key);
                    Err(OperationError::from(e))
                }
            }
        });

        match timeout(self.backend_wait, task).await {
            Ok(Ok(result)) => {
                metrics::histogram!("pipeline_produce_duration_seconds", "operation" => operation)
                    .record(start.elapsed().as_secs_f64());
                result
            }
            Ok(Err(join_error)) => {
                self.cache.abandon(&key);
                Err(OperationError::Internal(format!(
                    "{} task failed: {}",
                    operation, join_error
                )))
            }
            Err(_) => {
                metrics::counter!("pipeline_backend_timeouts_total", "operation" => operation)
                    .increment(1);
                warn!(
                    key = %key,
                    operation,
                    wait = ?self.backend_wait,
                    "Backend still running; result will be stored under the pending key"
                );
                Err(OperationError::Timeout {
                    operation,
                    timeout: self.backend_wait,
                    pending_key: Some(key),
                })
            }
        }
    }
}

fn parse_args<T: DeserializeOwned>(operation: &str, args: Value) -> Result<T, OperationError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|e| OperationError::MalformedInput(format!("{}: {}", operation, e)))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, OperationError> {
    serde_json::to_value(value).map_err(|e| OperationError::Internal(e.to_string()))
}

fn region_json(region: &ResolvedRegion, include_geometry: bool) -> Result<Value, OperationError> {
    let mut value = to_json(region)?;
    if !include_geometry {
        if let Some(map) = value.as_object_mut() {
            map.remove("geometry");
        }
    }
    Ok(value)
}

fn parse_tier(tier: Option<&str>) -> Result<Option<Tier>, OperationError> {
    tier.map(|t| {
        Tier::parse(t).ok_or_else(|| {
            OperationError::MalformedInput(format!(
                "unknown tier '{}'; expected district, state or country",
                t
            ))
        })
    })
    .transpose()
}

/// Interpret a region argument, applying a separately supplied parent hint.
fn location_query(region: &Value, parent: Option<&str>) -> Result<LocationQuery, OperationError> {
    let mut query = LocationQuery::from_value(region)?;
    if let LocationQuery::Name { parent: slot, .. } = &mut query {
        if slot.is_none() {
            *slot = parent.map(str::to_string);
        }
    }
    Ok(query)
}

fn require_bands(requested: &[String], available: &[String]) -> Result<(), NormalizeError> {
    let missing: Vec<String> = requested
        .iter()
        .filter(|b| !available.contains(b))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(NormalizeError::ConflictingBands {
            requested: missing,
            available: available.to_vec(),
        })
    }
}
