use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use sander::cache::{CacheConfig, CacheData, CachePopulator, CodecError, Compressor, ResponseCache};
use sander::infra::telemetry;

#[derive(Clone)]
struct FailingCodec;

impl Compressor for FailingCodec {
    fn compress(&mut self, _raw: &[u8]) -> Result<(), CodecError> {
        Err(CodecError::Compress(std::io::Error::other("encoder refused input")))
    }

    fn uncompress(&self) -> Result<Vec<u8>, CodecError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    // hit / miss / capacity evict / entries
    let cache = ResponseCache::<String, CacheData>::new(1);
    cache.compress_and_add("first".to_string(), b"one", CacheData::new());
    assert!(cache.get_and_uncompress(&"first".to_string()).is_some());
    assert!(cache.get_and_uncompress(&"first".to_string()).is_some());
    assert!(cache.get_and_uncompress(&"absent".to_string()).is_none());
    cache.compress_and_add("second".to_string(), b"two", CacheData::new());

    // uncompress error; the lookup itself still counts as a hit
    cache.add(
        "garbage".to_string(),
        CacheData::from_compressed(Bytes::from_static(b"not gzip")),
    );
    assert!(cache.get_and_uncompress(&"garbage".to_string()).is_none());

    // explicit remove-oldest counts as an eviction; on an empty cache it does not
    cache.remove_oldest();
    cache.remove_oldest();
    assert!(cache.is_empty());

    // compress error
    let failing = ResponseCache::<String, FailingCodec>::new(1);
    failing.compress_and_add("topic".to_string(), b"body", FailingCodec);
    assert!(failing.is_empty());

    // populate dropped: the current-thread runtime has not run the dispatcher yet
    let config = CacheConfig {
        populate_queue_limit: 1,
        ..Default::default()
    };
    let target = Arc::new(ResponseCache::<String, CacheData>::from_config(&config));
    let (populator, handle) = CachePopulator::spawn(Arc::clone(&target), &config);
    assert!(populator.submit("a".to_string(), Bytes::from_static(b"a")));
    assert!(!populator.submit("b".to_string(), Bytes::from_static(b"b")));
    drop(populator);
    handle.await.expect("dispatcher should finish");

    let snapshot = snapshotter.snapshot().into_vec();
    let names: Vec<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();
    let counters: HashMap<String, u64> = snapshot
        .into_iter()
        .filter_map(|(composite_key, _, _, value)| match value {
            DebugValue::Counter(count) => Some((composite_key.key().name().to_string(), count)),
            _ => None,
        })
        .collect();

    assert_eq!(counters.get("sander_cache_hit_total"), Some(&3));
    assert_eq!(counters.get("sander_cache_miss_total"), Some(&1));
    assert_eq!(counters.get("sander_cache_uncompress_error_total"), Some(&1));
    assert_eq!(counters.get("sander_cache_compress_error_total"), Some(&1));
    assert_eq!(counters.get("sander_cache_populate_dropped_total"), Some(&1));
    assert_eq!(counters.get("sander_cache_evict_total"), Some(&3));

    assert!(
        names.iter().any(|name| name == "sander_cache_entries"),
        "missing metric: sander_cache_entries"
    );
}
