//! Tiered location resolution.

use geo_common::RegionGeometry;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::alias::AliasTable;
use crate::boundary::{BoundaryMatch, BoundarySource, MatchKind};
use crate::cache::{CachedOutcome, ResolutionCache, ResolutionCacheStats, ResolutionKey};
use crate::config::ResolverConfig;
use crate::error::{Candidate, ResolveError};
use crate::normalize::normalize_name;
use crate::query::LocationQuery;
use crate::region::ResolvedRegion;
use crate::strategy::{plan, Attempt};
use crate::suggest::{merge, NameIndex};
use crate::tiebreak::{select, Selection};
use crate::tier::Tier;

/// Resolves [`LocationQuery`] values into [`ResolvedRegion`]s.
///
/// Safe to share across tasks; the only mutable state is the resolution
/// cache and the lazily built suggestion indexes. No lock is held while a
/// boundary dataset is queried.
pub struct LocationResolver {
    sources: Vec<Arc<dyn BoundarySource>>,
    name_indexes: Vec<OnceCell<NameIndex>>,
    aliases: AliasTable,
    cache: ResolutionCache,
    config: ResolverConfig,
}

/// Name query after normalization and alias expansion.
struct NameTarget {
    display: String,
    canonical: String,
    alternates: Vec<String>,
    parent: Option<String>,
}

impl LocationResolver {
    pub fn new(
        sources: Vec<Arc<dyn BoundarySource>>,
        aliases: AliasTable,
        config: ResolverConfig,
    ) -> Self {
        let cache = ResolutionCache::new(config.cache_max_entries, config.cache_ttl);
        let name_indexes = sources.iter().map(|_| OnceCell::new()).collect();
        Self {
            sources,
            name_indexes,
            aliases,
            cache,
            config,
        }
    }

    /// Resolve a query, restricted to `tier_hint` and coarser tiers when given.
    #[instrument(skip(self), fields(query = %query.describe()))]
    pub async fn resolve(
        &self,
        query: &LocationQuery,
        tier_hint: Option<Tier>,
    ) -> Result<Arc<ResolvedRegion>, ResolveError> {
        let start = Instant::now();
        let result = match query {
            LocationQuery::Name { name, parent } => {
                self.resolve_name(name, parent.as_deref(), tier_hint).await
            }
            LocationQuery::Point { lon, lat, radius_m } => {
                let geometry =
                    RegionGeometry::circle(*lon, *lat, *radius_m, self.config.circle_segments)
                        .map_err(|e| ResolveError::MalformedInput(e.to_string()))?;
                self.resolve_raw(geometry, Some([*lon, *lat])).await
            }
            LocationQuery::BBox(bbox) => {
                bbox.validate()
                    .map_err(|e| ResolveError::MalformedInput(e.to_string()))?;
                self.resolve_raw(bbox.to_geometry(), None).await
            }
            LocationQuery::Geometry(geometry) => self.resolve_raw(geometry.clone(), None).await,
        };

        metrics::histogram!("resolver_resolve_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::counter!("resolver_errors_total", "kind" => e.kind().code()).increment(1);
        }
        result
    }

    /// Cache statistics.
    pub fn cache_stats(&self) -> &ResolutionCacheStats {
        self.cache.stats()
    }

    /// Number of cached resolutions.
    pub async fn cache_len(&self) -> usize {
        self.cache.len().await
    }

    /// Drop every cached resolution.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Registered boundary datasets as (dataset id, tier).
    pub fn datasets(&self) -> Vec<(String, Tier)> {
        self.sources
            .iter()
            .map(|s| (s.dataset_id().to_string(), s.tier()))
            .collect()
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    async fn resolve_name(
        &self,
        name: &str,
        parent: Option<&str>,
        tier_hint: Option<Tier>,
    ) -> Result<Arc<ResolvedRegion>, ResolveError> {
        let name_key = normalize_name(name);
        if name_key.is_empty() {
            return Err(ResolveError::MalformedInput(format!(
                "location name '{}' is empty after normalization",
                name
            )));
        }
        let caller_parent = parent.map(normalize_name).filter(|p| !p.is_empty());
        if tier_hint == Some(Tier::Raw) {
            return Err(ResolveError::MalformedInput(
                "tier 'raw' only applies to boxes and geometry".to_string(),
            ));
        }

        let key = ResolutionKey::new(name_key.clone(), caller_parent.clone(), tier_hint);
        if let Some(outcome) = self.cache.get(&key).await {
            debug!(name = %name_key, "Resolution cache hit");
            return match outcome {
                CachedOutcome::Resolved(region) => Ok(region),
                CachedOutcome::NotFound { suggestions } => Err(ResolveError::NotFound {
                    query: name.to_string(),
                    suggestions,
                }),
            };
        }

        let target = self.expand(name, &name_key, caller_parent);
        let steps = plan(&self.sources, tier_hint, target.parent.is_some());
        let mut substring_fallback: Option<(Vec<BoundaryMatch>, Arc<dyn BoundarySource>)> = None;

        for step in steps {
            let parent_filter = if step.attempt.uses_parent() {
                target.parent.as_deref()
            } else {
                None
            };

            let matches = match step.attempt {
                Attempt::Canonical { .. } => {
                    self.find(&step.source, &target.canonical, parent_filter).await?
                }
                Attempt::Alternates { .. } => {
                    self.find_alternates(&step.source, &target.alternates, parent_filter)
                        .await?
                }
            };

            debug!(
                dataset = %step.source.dataset_id(),
                attempt = step.attempt.label(),
                matches = matches.len(),
                "Boundary lookup"
            );

            if matches.is_empty() {
                continue;
            }
            if matches.iter().any(|m| m.match_kind != MatchKind::Substring) {
                return self.settle(key, &target, &step.source, matches).await;
            }
            if substring_fallback.is_none() {
                substring_fallback = Some((matches, Arc::clone(&step.source)));
            }
        }

        if let Some((matches, source)) = substring_fallback {
            return self.settle(key, &target, &source, matches).await;
        }

        let suggestions = self.suggestions(&name_key, tier_hint).await;
        info!(name = %name, suggestions = suggestions.len(), "Location not found");
        self.cache
            .put(
                key,
                CachedOutcome::NotFound {
                    suggestions: suggestions.clone(),
                },
            )
            .await;
        Err(ResolveError::NotFound {
            query: name.to_string(),
            suggestions,
        })
    }

    fn expand(&self, display: &str, name_key: &str, caller_parent: Option<String>) -> NameTarget {
        let (canonical, alias_parent) = match self.aliases.lookup(name_key) {
            Some(resolution) => {
                debug!(alias = %name_key, canonical = %resolution.canonical, "Alias applied");
                (resolution.canonical.clone(), resolution.parent.clone())
            }
            None => (name_key.to_string(), None),
        };

        let alternates = self
            .aliases
            .alternates(&canonical)
            .iter()
            .filter(|n| **n != canonical)
            .cloned()
            .collect();

        NameTarget {
            display: display.to_string(),
            canonical,
            alternates,
            parent: caller_parent.or(alias_parent),
        }
    }

    async fn find(
        &self,
        source: &Arc<dyn BoundarySource>,
        name: &str,
        parent: Option<&str>,
    ) -> Result<Vec<BoundaryMatch>, ResolveError> {
        let timeout = self.config.upstream_timeout;
        match tokio::time::timeout(timeout, source.find(name, parent)).await {
            Ok(Ok(matches)) => Ok(matches),
            Ok(Err(e)) => {
                warn!(dataset = %source.dataset_id(), error = %e, "Boundary dataset failed");
                Err(ResolveError::UpstreamUnavailable {
                    dataset: source.dataset_id().to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                warn!(dataset = %source.dataset_id(), ?timeout, "Boundary dataset timed out");
                Err(ResolveError::UpstreamTimeout {
                    dataset: source.dataset_id().to_string(),
                    timeout,
                })
            }
        }
    }

    async fn find_alternates(
        &self,
        source: &Arc<dyn BoundarySource>,
        alternates: &[String],
        parent: Option<&str>,
    ) -> Result<Vec<BoundaryMatch>, ResolveError> {
        let mut all: Vec<BoundaryMatch> = Vec::new();
        for alternate in alternates {
            for mut m in self.find(source, alternate, parent).await? {
                if all.iter().any(|seen| seen.order == m.order) {
                    continue;
                }
                // equality with an alternate is an alias match
                if m.match_kind == MatchKind::Exact {
                    m.match_kind = MatchKind::Alias;
                }
                all.push(m);
            }
        }
        Ok(all)
    }

    async fn settle(
        &self,
        key: ResolutionKey,
        target: &NameTarget,
        source: &Arc<dyn BoundarySource>,
        matches: Vec<BoundaryMatch>,
    ) -> Result<Arc<ResolvedRegion>, ResolveError> {
        match select(matches) {
            Some(Selection::Unique(m)) => {
                let region = Arc::new(ResolvedRegion::from_match(
                    &m,
                    source.tier(),
                    source.dataset_id(),
                )?);
                info!(
                    name = %target.display,
                    matched = %m.feature.name,
                    tier = %region.source_tier,
                    dataset = %region.source_dataset,
                    area_km2 = region.area_km2,
                    "Location resolved"
                );
                self.cache
                    .put(key, CachedOutcome::Resolved(Arc::clone(&region)))
                    .await;
                Ok(region)
            }
            Some(Selection::Ambiguous(tied)) => {
                let candidates = tied
                    .iter()
                    .map(|m| Candidate {
                        canonical_name: m.feature.name.clone(),
                        parent: m.feature.parent.clone(),
                        country: m.feature.country.clone(),
                        tier: source.tier(),
                        dataset_id: source.dataset_id().to_string(),
                        area_km2: m.area_km2,
                        match_kind: m.match_kind,
                    })
                    .collect();
                Err(ResolveError::AmbiguousMatch {
                    query: target.display.clone(),
                    candidates,
                })
            }
            None => Err(ResolveError::NotFound {
                query: target.display.clone(),
                suggestions: Vec::new(),
            }),
        }
    }

    /// `center` replaces the planar centroid, which is meaningless for
    /// geometry split at the antimeridian.
    async fn resolve_raw(
        &self,
        geometry: RegionGeometry,
        center: Option<[f64; 2]>,
    ) -> Result<Arc<ResolvedRegion>, ResolveError> {
        let mut region = ResolvedRegion::raw(geometry)?;
        if let Some(center) = center {
            region.centroid = center;
        }
        if self.config.annotate_raw {
            region.containing_unit = self.containing_unit(region.centroid).await;
        }
        Ok(Arc::new(region))
    }

    /// Best-effort name of the finest unit containing a point.
    async fn containing_unit(&self, point: [f64; 2]) -> Option<String> {
        for step in plan(&self.sources, None, false)
            .into_iter()
            .filter(|s| s.attempt == Attempt::Canonical { with_parent: false })
        {
            let lookup = step.source.containing(point[0], point[1]);
            match tokio::time::timeout(self.config.annotation_timeout, lookup).await {
                Ok(Ok(Some(feature))) => return Some(feature.name.clone()),
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => {
                    debug!(dataset = %step.source.dataset_id(), error = %e, "Annotation lookup failed");
                }
                Err(_) => {
                    debug!(dataset = %step.source.dataset_id(), "Annotation lookup timed out");
                }
            }
        }
        None
    }

    async fn suggestions(&self, name_key: &str, tier_hint: Option<Tier>) -> Vec<String> {
        let floor = tier_hint.unwrap_or(Tier::District);
        let mut per_tier = Vec::new();

        for (source, cell) in self.sources.iter().zip(&self.name_indexes) {
            if !floor.is_at_least_as_fine_as(source.tier()) {
                continue;
            }
            let index = cell
                .get_or_try_init(|| async {
                    tokio::time::timeout(self.config.upstream_timeout, source.names())
                        .await
                        .map_err(|_| ())?
                        .map(NameIndex::new)
                        .map_err(|_| ())
                })
                .await;
            match index {
                Ok(index) => per_tier.push(index.suggest(name_key)),
                Err(()) => {
                    debug!(dataset = %source.dataset_id(), "Suggestion index unavailable");
                }
            }
        }

        merge(per_tier, self.config.max_suggestions)
    }
}
