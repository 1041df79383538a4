//! Integration tests for the reference cache.

use reference_cache::{
    CacheKind, CacheMiss, EvictionReason, ReferenceCache, ReferenceCacheConfig, KEY_FORMAT,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Stand-in for a backend object handle.
#[derive(Debug, Clone, PartialEq)]
struct Handle(String);

fn cache_with(max_entries: usize) -> Arc<ReferenceCache<Handle>> {
    Arc::new(ReferenceCache::new(ReferenceCacheConfig {
        max_entries,
        ..Default::default()
    }))
}

#[test]
fn test_put_composite_then_get_same_handle() {
    let cache = cache_with(100);
    let params = json!({
        "dataset": "COPERNICUS/S2_SR_HARMONIZED",
        "start": "2024-06-01",
        "end": "2024-08-31",
        "reducer": "median",
    });
    let key = cache.put(
        CacheKind::Composite,
        params.clone(),
        vec!["B4".into(), "B3".into(), "B2".into(), "B8".into()],
        Handle("graph:composite:1".into()),
    );

    assert!(key.starts_with("composite_"));
    let entry = cache.get(&key).unwrap();
    assert_eq!(entry.object_handle, Handle("graph:composite:1".into()));
    assert_eq!(entry.source_params, params);
    assert_eq!(entry.key, key);
}

#[test]
fn test_unknown_key_is_a_miss() {
    let cache = cache_with(100);
    match cache.get("composite_doesnotexist") {
        Err(CacheMiss::MalformedKey { key, expected }) => {
            assert_eq!(key, "composite_doesnotexist");
            assert_eq!(expected, KEY_FORMAT);
        }
        other => panic!("expected a malformed-key miss, got {:?}", other),
    }
}

#[test]
fn test_keys_never_collide() {
    let cache = cache_with(10_000);
    let mut keys = std::collections::HashSet::new();
    for i in 0..1_000 {
        let key = cache.put(CacheKind::Index, json!({ "i": i }), vec!["NDVI".into()], Handle(i.to_string()));
        assert!(keys.insert(key));
    }
    assert_eq!(cache.len(), 1_000);
}

#[test]
fn test_eviction_removes_exactly_the_excess() {
    let cache = cache_with(10);
    let keys: Vec<String> = (0..15)
        .map(|i| cache.put(CacheKind::Other, json!({}), vec![], Handle(i.to_string())))
        .collect();

    // refresh the five oldest
    for key in &keys[..5] {
        cache.get(key).unwrap();
    }

    let report = cache.evict();
    assert_eq!(report.evicted, 5);
    assert_eq!(cache.len(), 10);

    for key in &keys[5..10] {
        assert_eq!(
            cache.get(key).unwrap_err(),
            CacheMiss::ExpiredOrEvicted {
                key: key.clone(),
                reason: EvictionReason::Capacity
            }
        );
    }
    for key in keys[..5].iter().chain(&keys[10..]) {
        assert!(cache.get(key).is_ok());
    }
}

#[test]
fn test_ttl_sweep() {
    let cache: ReferenceCache<Handle> = ReferenceCache::new(ReferenceCacheConfig {
        ttl: Duration::from_millis(40),
        ..Default::default()
    });
    let old = cache.put(CacheKind::Composite, json!({}), vec![], Handle("old".into()));
    std::thread::sleep(Duration::from_millis(100));
    let fresh = cache.put(CacheKind::Composite, json!({}), vec![], Handle("fresh".into()));

    let report = cache.evict();
    assert_eq!(report.expired, 1);
    assert_eq!(report.evicted, 0);
    assert!(matches!(
        cache.get(&old),
        Err(CacheMiss::ExpiredOrEvicted { reason: EvictionReason::Expired, .. })
    ));
    assert!(cache.get(&fresh).is_ok());
}

#[test]
fn test_stale_reservations_are_abandoned() {
    let cache: ReferenceCache<Handle> = ReferenceCache::new(ReferenceCacheConfig {
        pending_ttl: Duration::from_millis(20),
        ..Default::default()
    });
    let key = cache.reserve(CacheKind::Composite);
    std::thread::sleep(Duration::from_millis(60));

    assert_eq!(cache.evict().abandoned, 1);
    assert_eq!(cache.pending(), 0);
    assert!(cache
        .fulfil(&key, json!({}), vec![], Handle("late".into()))
        .is_err());
}

#[tokio::test]
async fn test_concurrent_producers_and_consumers() {
    let cache = cache_with(10_000);
    let mut tasks = Vec::new();

    for worker in 0..16 {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(async move {
            for i in 0..50 {
                let handle = Handle(format!("{}-{}", worker, i));
                let key = cache.put(CacheKind::Composite, json!({}), vec![], handle.clone());
                tokio::task::yield_now().await;
                let entry = cache.get(&key).expect("fresh key resolves");
                assert_eq!(entry.object_handle, handle);
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(cache.len(), 16 * 50);
    assert_eq!(cache.stats().hits.load(std::sync::atomic::Ordering::Relaxed), 16 * 50);
}

#[tokio::test]
async fn test_background_fulfilment_after_reserve() {
    let cache = cache_with(100);
    let key = cache.reserve(CacheKind::Composite);

    let producer = {
        let cache = Arc::clone(&cache);
        let key = key.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cache
                .fulfil(&key, json!({}), vec!["B4".into()], Handle("late".into()))
                .unwrap();
        })
    };

    assert!(matches!(cache.get(&key), Err(CacheMiss::Pending { .. })));
    producer.await.unwrap();
    assert_eq!(cache.get(&key).unwrap().object_handle, Handle("late".into()));
}

#[test]
fn test_reservation_fulfilled_by_concurrent_task() {
    let cache = cache_with(10);
    let key = cache.reserve(CacheKind::Index);
    assert!(matches!(cache.get(&key), Err(CacheMiss::Pending { .. })));

    tokio_test::block_on(async {
        let worker = {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                cache.fulfil(
                    &key,
                    json!({ "index": "NDVI" }),
                    vec!["NDVI".into()],
                    Handle("graph:index:7".into()),
                )
            })
        };
        worker.await.unwrap().unwrap();
    });

    let entry = cache.get(&key).unwrap();
    assert_eq!(entry.band_names, vec!["NDVI".to_string()]);
    assert_eq!(cache.pending(), 0);
}
