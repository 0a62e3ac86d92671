mod support;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use beacon_cache_proxy::application::jobs::CacheWarmer;
use beacon_cache_proxy::cache::{CacheConfig, CommitteeCache, EpochKey};
use metrics_util::debugging::DebuggingRecorder;
use support::{Harness, committees_body};
use tempfile::TempDir;

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Store, hit, miss, read-ahead and warm eviction.
    let dir = TempDir::new().expect("temp dir");
    let config = CacheConfig {
        warm_capacity: 1,
        read_ahead: 2,
        ..CacheConfig::with_data_dir(dir.path())
    };
    let cache = CommitteeCache::open(config).expect("cache opens");
    for epoch in [1, 2, 3] {
        cache
            .set(EpochKey::new(epoch), committees_body(epoch).as_bytes())
            .await
            .expect("set");
    }
    let headers = HeaderMap::new();
    assert!(cache.get(&headers, EpochKey::new(1)).await.expect("get").is_some());
    assert!(cache.get(&headers, EpochKey::new(50)).await.expect("get").is_none());
    cache.read_ahead(EpochKey::new(1)).await;

    // Corrupt record.
    std::fs::write(dir.path().join("9.pb"), [0xff, 0xff]).expect("write garbage");
    assert!(cache.get(&headers, EpochKey::new(9)).await.is_err());

    // Retention.
    assert_eq!(cache.prune(1).await.expect("prune"), 2);

    // Warming loop gauge.
    let harness = Harness::start().await;
    harness.mock.set_finalized("64");
    let mut warmer = CacheWarmer::new(Arc::clone(&harness.cache), Arc::clone(&harness.upstream));
    warmer.warm().await.expect("warm");

    // Let the read-ahead scheduled by the disk hit settle.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "beacon_cache_hit_total",
        "beacon_cache_miss_total",
        "beacon_cache_store_total",
        "beacon_cache_corrupt_total",
        "beacon_cache_warm_read_total",
        "beacon_cache_warm_evict_total",
        "beacon_cache_pruned_total",
        "beacon_cache_warmed_epoch",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
