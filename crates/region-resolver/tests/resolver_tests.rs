//! Integration tests for tiered location resolution.

use async_trait::async_trait;
use geo_common::{BoundingBox, ErrorKind};
use region_resolver::{
    AliasTable, BoundaryFeature, BoundaryMatch, BoundarySource, InMemoryBoundarySource,
    LocationQuery, LocationResolver, ResolveError, ResolverConfig, SourceError, Tier,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use test_utils::{assert_approx_eq, assert_in_range, fixtures};

/// Wraps a source and counts name lookups.
struct CountingSource {
    inner: Arc<dyn BoundarySource>,
    finds: AtomicUsize,
}

impl CountingSource {
    fn new(inner: Arc<dyn BoundarySource>) -> Self {
        Self {
            inner,
            finds: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BoundarySource for CountingSource {
    fn dataset_id(&self) -> &str {
        self.inner.dataset_id()
    }

    fn tier(&self) -> Tier {
        self.inner.tier()
    }

    async fn find(&self, name: &str, parent: Option<&str>) -> Result<Vec<BoundaryMatch>, SourceError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find(name, parent).await
    }

    async fn names(&self) -> Result<Vec<String>, SourceError> {
        self.inner.names().await
    }

    async fn containing(&self, lon: f64, lat: f64) -> Result<Option<Arc<BoundaryFeature>>, SourceError> {
        self.inner.containing(lon, lat).await
    }
}

/// A dataset that is down, or merely slow.
struct BrokenSource {
    delay: Option<Duration>,
}

#[async_trait]
impl BoundarySource for BrokenSource {
    fn dataset_id(&self) -> &str {
        "BROKEN/level2"
    }

    fn tier(&self) -> Tier {
        Tier::District
    }

    async fn find(&self, _name: &str, _parent: Option<&str>) -> Result<Vec<BoundaryMatch>, SourceError> {
        match self.delay {
            Some(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Vec::new())
            }
            None => Err(SourceError::Unavailable("connection refused".to_string())),
        }
    }

    async fn names(&self) -> Result<Vec<String>, SourceError> {
        Err(SourceError::Unavailable("connection refused".to_string()))
    }

    async fn containing(&self, _lon: f64, _lat: f64) -> Result<Option<Arc<BoundaryFeature>>, SourceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Err(SourceError::Unavailable("connection refused".to_string()))
    }
}

fn fixture_sources() -> Vec<Arc<dyn BoundarySource>> {
    [
        fixtures::DISTRICTS_YAML,
        fixtures::STATES_YAML,
        fixtures::COUNTRIES_YAML,
    ]
    .iter()
    .map(|yaml| Arc::new(InMemoryBoundarySource::from_yaml(yaml).unwrap()) as Arc<dyn BoundarySource>)
    .collect()
}

fn resolver() -> LocationResolver {
    LocationResolver::new(fixture_sources(), AliasTable::builtin(), ResolverConfig::default())
}

fn bbox_query((w, s, e, n): (f64, f64, f64, f64)) -> LocationQuery {
    LocationQuery::BBox(BoundingBox::new(w, s, e, n))
}

#[tokio::test]
async fn test_san_francisco_resolves_to_district() {
    let region = resolver()
        .resolve(&LocationQuery::name("San Francisco"), None)
        .await
        .unwrap();

    assert_eq!(region.source_tier, Tier::District);
    assert_eq!(region.source_dataset, "FAO/GAUL/2015/level2");
    assert_eq!(region.matched_canonical_name.as_deref(), Some("San Francisco"));
    assert_eq!(region.parent.as_deref(), Some("California"));
    assert_in_range!(region.area_km2, 121.0, 122.0);
}

#[tokio::test]
async fn test_case_and_whitespace_are_ignored() {
    let region = resolver()
        .resolve(&LocationQuery::name("  san   FRANCISCO "), None)
        .await
        .unwrap();
    assert_eq!(region.parent.as_deref(), Some("California"));
}

#[tokio::test]
async fn test_atlantis_not_found_without_suggestions() {
    let err = resolver()
        .resolve(&LocationQuery::name("Atlantis"), None)
        .await
        .unwrap_err();

    match &err {
        ResolveError::NotFound { query, suggestions } => {
            assert_eq!(query, "Atlantis");
            assert!(suggestions.is_empty());
        }
        other => panic!("expected NotFound, got {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_typo_gets_suggestions() {
    let err = resolver()
        .resolve(&LocationQuery::name("San Fransisco"), None)
        .await
        .unwrap_err();

    match err {
        ResolveError::NotFound { suggestions, .. } => {
            assert_eq!(suggestions.first().map(String::as_str), Some("San Francisco"));
        }
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_repeat_within_ttl_does_not_requery() {
    let counting: Vec<Arc<CountingSource>> = fixture_sources()
        .into_iter()
        .map(|s| Arc::new(CountingSource::new(s)))
        .collect();
    let sources = counting
        .iter()
        .map(|s| Arc::clone(s) as Arc<dyn BoundarySource>)
        .collect();
    let resolver = LocationResolver::new(sources, AliasTable::builtin(), ResolverConfig::default());
    let total = || counting.iter().map(|s| s.finds.load(Ordering::SeqCst)).sum::<usize>();

    let first = resolver
        .resolve(&LocationQuery::name("San Francisco"), None)
        .await
        .unwrap();
    let after_first = total();
    assert!(after_first > 0);

    let second = resolver
        .resolve(&LocationQuery::name("san francisco"), None)
        .await
        .unwrap();
    assert_eq!(total(), after_first);
    assert_eq!(first.geometry, second.geometry);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(resolver.cache_stats().hits.load(Ordering::Relaxed), 1);

    // not-found outcomes are cached too
    assert!(resolver.resolve(&LocationQuery::name("Atlantis"), None).await.is_err());
    let after_miss = total();
    assert!(resolver.resolve(&LocationQuery::name("Atlantis"), None).await.is_err());
    assert_eq!(total(), after_miss);
}

#[tokio::test]
async fn test_clear_cache_forces_requery() {
    let counting = Arc::new(CountingSource::new(fixture_sources().remove(0)));
    let resolver = LocationResolver::new(
        vec![Arc::clone(&counting) as Arc<dyn BoundarySource>],
        AliasTable::builtin(),
        ResolverConfig::default(),
    );

    resolver.resolve(&LocationQuery::name("San Mateo"), None).await.unwrap();
    let calls = counting.finds.load(Ordering::SeqCst);
    resolver.clear_cache().await;
    assert_eq!(resolver.cache_len().await, 0);

    resolver.resolve(&LocationQuery::name("San Mateo"), None).await.unwrap();
    assert!(counting.finds.load(Ordering::SeqCst) > calls);
}

#[tokio::test]
async fn test_smaller_area_wins_across_countries() {
    // Both exact matches; the Californian unit is smaller.
    let region = resolver()
        .resolve(&LocationQuery::name("San Francisco"), None)
        .await
        .unwrap();
    assert_in_range!(region.bbox.min_x, -123.0, -122.0);
}

#[tokio::test]
async fn test_parent_hint_selects_unit() {
    let region = resolver()
        .resolve(&LocationQuery::name_in("San Francisco", "Córdoba"), None)
        .await
        .unwrap();
    assert_eq!(region.parent.as_deref(), Some("Cordoba"));
    assert_approx_eq!(region.area_km2, 3520.0, 1e-9);
}

#[tokio::test]
async fn test_unknown_parent_hint_falls_back() {
    let region = resolver()
        .resolve(&LocationQuery::name_in("San Francisco", "Nevada"), None)
        .await
        .unwrap();
    assert_eq!(region.parent.as_deref(), Some("California"));
    assert_eq!(region.source_tier, Tier::District);
}

#[tokio::test]
async fn test_equal_area_distinct_units_are_ambiguous() {
    let resolver = resolver();
    let err = resolver
        .resolve(&LocationQuery::name("Springfield"), None)
        .await
        .unwrap_err();

    match &err {
        ResolveError::AmbiguousMatch { candidates, .. } => {
            let parents: Vec<_> = candidates.iter().filter_map(|c| c.parent.as_deref()).collect();
            assert_eq!(parents, vec!["Illinois", "Missouri"]);
            assert!(candidates.iter().all(|c| c.tier == Tier::District));
        }
        other => panic!("expected AmbiguousMatch, got {:?}", other),
    }
    assert!(!err.is_retryable());

    let region = resolver
        .resolve(&LocationQuery::name_in("Springfield", "Missouri"), None)
        .await
        .unwrap();
    assert_eq!(region.parent.as_deref(), Some("Missouri"));
}

#[tokio::test]
async fn test_builtin_alias_resolves() {
    let resolver = resolver();
    for nickname in ["SF", "frisco", "San Fran"] {
        let region = resolver
            .resolve(&LocationQuery::name(nickname), None)
            .await
            .unwrap();
        assert_eq!(region.matched_canonical_name.as_deref(), Some("San Francisco"));
        assert_eq!(region.parent.as_deref(), Some("California"));
    }

    let la = resolver.resolve(&LocationQuery::name("LA"), None).await.unwrap();
    assert_eq!(la.matched_canonical_name.as_deref(), Some("Los Angeles"));
}

#[tokio::test]
async fn test_alias_file_and_alternate_names() {
    let dir = tempfile::tempdir().unwrap();
    fixtures::write_files(dir.path(), &[("aliases.yaml", fixtures::ALIASES_YAML)]);
    let aliases = AliasTable::load_file(&dir.path().join("aliases.yaml")).unwrap();

    let legacy = r#"
dataset_id: LEGACY/level2
tier: district
features:
  - name: Calcutta
    parent: West Bengal
    geometry:
      type: Polygon
      coordinates: [[[88.2, 22.4], [88.5, 22.4], [88.5, 22.7], [88.2, 22.7], [88.2, 22.4]]]
"#;
    let mut sources = fixture_sources();
    sources.push(Arc::new(InMemoryBoundarySource::from_yaml(legacy).unwrap()));
    let resolver = LocationResolver::new(sources, aliases, ResolverConfig::default());

    let bay = resolver
        .resolve(&LocationQuery::name("Bay City"), None)
        .await
        .unwrap();
    assert_eq!(bay.parent.as_deref(), Some("California"));

    let kolkata = resolver
        .resolve(&LocationQuery::name("Kolkata"), None)
        .await
        .unwrap();
    assert_eq!(kolkata.matched_canonical_name.as_deref(), Some("Calcutta"));
    assert_eq!(kolkata.source_dataset, "LEGACY/level2");
}

#[tokio::test]
async fn test_dataset_alt_name_matches() {
    let region = resolver()
        .resolve(&LocationQuery::name("City and County of San Francisco"), None)
        .await
        .unwrap();
    assert_eq!(region.matched_canonical_name.as_deref(), Some("San Francisco"));
}

#[tokio::test]
async fn test_falls_back_to_coarser_tiers() {
    let resolver = resolver();

    let state = resolver
        .resolve(&LocationQuery::name("California"), None)
        .await
        .unwrap();
    assert_eq!(state.source_tier, Tier::State);
    assert_eq!(state.source_dataset, "FAO/GAUL/2015/level1");

    let country = resolver
        .resolve(&LocationQuery::name("USA"), None)
        .await
        .unwrap();
    assert_eq!(country.source_tier, Tier::Country);
    assert_eq!(
        country.matched_canonical_name.as_deref(),
        Some("United States of America")
    );
}

#[tokio::test]
async fn test_tier_hint_skips_finer_tiers() {
    let resolver = resolver();

    let err = resolver
        .resolve(&LocationQuery::name("San Francisco"), Some(Tier::State))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let state = resolver
        .resolve(&LocationQuery::name("Missouri"), Some(Tier::District))
        .await
        .unwrap();
    assert_eq!(state.source_tier, Tier::State);

    // the hint is part of the cache key
    let district = resolver
        .resolve(&LocationQuery::name("San Francisco"), None)
        .await
        .unwrap();
    assert_eq!(district.source_tier, Tier::District);
}

#[tokio::test]
async fn test_empty_name_is_malformed() {
    let err = resolver()
        .resolve(&LocationQuery::name(" ,. "), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
}

#[tokio::test]
async fn test_failing_dataset_is_upstream_unavailable() {
    let mut sources: Vec<Arc<dyn BoundarySource>> = vec![Arc::new(BrokenSource { delay: None })];
    sources.extend(fixture_sources());
    let resolver = LocationResolver::new(sources, AliasTable::builtin(), ResolverConfig::default());

    let err = resolver
        .resolve(&LocationQuery::name("San Francisco"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::UpstreamUnavailable { ref dataset, .. } if dataset == "BROKEN/level2"));
    assert!(err.is_retryable());

    // failures are not cached
    assert_eq!(resolver.cache_len().await, 0);
}

#[tokio::test]
async fn test_slow_dataset_times_out() {
    let config = ResolverConfig {
        upstream_timeout: Duration::from_millis(50),
        ..ResolverConfig::default()
    };
    let resolver = LocationResolver::new(
        vec![Arc::new(BrokenSource {
            delay: Some(Duration::from_secs(5)),
        })],
        AliasTable::builtin(),
        config,
    );

    let err = resolver
        .resolve(&LocationQuery::name("Anywhere"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamTimeout);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_bbox_is_accepted_and_annotated() {
    let resolver = resolver();

    let downtown = resolver
        .resolve(&bbox_query(fixtures::bbox::DOWNTOWN_SF), None)
        .await
        .unwrap();
    assert_eq!(downtown.source_tier, Tier::Raw);
    assert_eq!(downtown.source_dataset, "raw");
    assert!(downtown.matched_canonical_name.is_none());
    assert_eq!(downtown.containing_unit.as_deref(), Some("San Francisco"));

    let sierra = resolver
        .resolve(&bbox_query(fixtures::bbox::SIERRA), None)
        .await
        .unwrap();
    assert_eq!(sierra.containing_unit.as_deref(), Some("California"));

    let ocean = resolver
        .resolve(&bbox_query(fixtures::bbox::MID_PACIFIC), None)
        .await
        .unwrap();
    assert!(ocean.containing_unit.is_none());
    assert_eq!(ocean.label(), "custom region");
}

#[tokio::test]
async fn test_invalid_bbox_is_malformed() {
    let err = resolver()
        .resolve(&bbox_query(fixtures::bbox::INVALID), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
}

#[tokio::test]
async fn test_annotation_never_blocks_raw_path() {
    let config = ResolverConfig {
        annotation_timeout: Duration::from_millis(20),
        ..ResolverConfig::default()
    };
    let resolver = LocationResolver::new(
        vec![Arc::new(BrokenSource {
            delay: Some(Duration::from_secs(5)),
        })],
        AliasTable::builtin(),
        config,
    );

    let region = tokio::time::timeout(
        Duration::from_secs(1),
        resolver.resolve(&bbox_query(fixtures::bbox::DOWNTOWN_SF), None),
    )
    .await
    .expect("raw path must not wait on annotation")
    .unwrap();
    assert!(region.containing_unit.is_none());
}

#[tokio::test]
async fn test_point_becomes_circle() {
    let region = resolver()
        .resolve(
            &LocationQuery::Point {
                lon: -122.42,
                lat: 37.77,
                radius_m: 1_000.0,
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(region.source_tier, Tier::Raw);
    assert_eq!(region.geometry.vertex_count(), 65);
    assert_in_range!(region.area_km2, 3.0, 3.3);
    assert_eq!(region.containing_unit.as_deref(), Some("San Francisco"));
}

#[tokio::test]
async fn test_point_circles_near_antimeridian_and_pole_keep_area() {
    let resolver = resolver();
    for (lon, lat) in [(179.999, 0.0), (-179.999, 10.0), (0.0, 89.999)] {
        let region = resolver
            .resolve(
                &LocationQuery::Point {
                    lon,
                    lat,
                    radius_m: 1_000.0,
                },
                None,
            )
            .await
            .unwrap();
        assert_in_range!(region.area_km2, 3.0, 3.3);
        assert_eq!(region.centroid, [lon, lat]);
    }
}

#[tokio::test]
async fn test_point_circle_over_both_poles_is_malformed() {
    let err = resolver()
        .resolve(
            &LocationQuery::Point {
                lon: 0.0,
                lat: 0.0,
                radius_m: 15_000_000.0,
            },
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
}
