//! Thread-safe compressed response cache.
//!
//! A single `RwLock` serializes every access to the LRU core. Writes hold the
//! lock for their full duration, compression included, so readers never see
//! a half-built entry.

use std::hash::Hash;
use std::sync::RwLock;

use metrics::{counter, gauge};
use tracing::{debug, warn};

use super::codec::{CacheData, Compressor};
use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::{rw_read, rw_write};
use super::lru::{EvictionHook, LruCore};

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_HIT: &str = "sander_cache_hit_total";
pub(crate) const METRIC_MISS: &str = "sander_cache_miss_total";
pub(crate) const METRIC_EVICT: &str = "sander_cache_evict_total";
pub(crate) const METRIC_COMPRESS_ERROR: &str = "sander_cache_compress_error_total";
pub(crate) const METRIC_UNCOMPRESS_ERROR: &str = "sander_cache_uncompress_error_total";
pub(crate) const METRIC_ENTRIES: &str = "sander_cache_entries";

/// Response cache keyed by request fingerprint and holding gzip bodies.
pub type HttpResponseCache = ResponseCache<CacheKey, CacheData>;

/// Bounded LRU cache of compressed values behind a read/write lock.
pub struct ResponseCache<K: Hash + Eq, C> {
    entries: RwLock<LruCore<K, C>>,
}

impl<K, C> ResponseCache<K, C>
where
    K: Hash + Eq + Clone,
    C: Compressor + Clone,
{
    /// Create a cache holding at most `capacity` entries. Zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self::from_config(&CacheConfig {
            capacity,
            ..Default::default()
        })
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCore::new(config.capacity_non_zero())),
        }
    }

    /// Attach a hook that observes every entry leaving the cache.
    pub fn with_eviction_hook(self, hook: EvictionHook<K, C>) -> Self {
        let core = self
            .entries
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Self {
            entries: RwLock::new(core.with_eviction_hook(hook)),
        }
    }

    /// Insert or replace `key`, evicting the least recently used entry when full.
    pub fn add(&self, key: K, value: C) {
        let mut entries = rw_write(&self.entries, SOURCE, "add");
        Self::insert(&mut entries, key, value);
    }

    /// Look up `key`, promoting it to most recently used on a hit.
    pub fn get(&self, key: &K) -> Option<C> {
        let value = rw_write(&self.entries, SOURCE, "get").get(key).cloned();
        record_lookup(value.is_some());
        value
    }

    /// Compress `raw` into `codec` and store it under `key`.
    ///
    /// A compression failure is logged and leaves the cache untouched.
    pub fn compress_and_add(&self, key: K, raw: &[u8], mut codec: C) {
        let mut entries = rw_write(&self.entries, SOURCE, "compress_and_add");

        if let Err(error) = codec.compress(raw) {
            counter!(METRIC_COMPRESS_ERROR).increment(1);
            warn!(
                cache = "response",
                op = "compress_and_add",
                raw_len = raw.len(),
                error = %error,
                "Skipping cache insert after compression failure"
            );
            return;
        }

        Self::insert(&mut entries, key, codec);
    }

    /// Look up `key` and return the decompressed payload.
    ///
    /// Undecodable entries are reported as misses.
    pub fn get_and_uncompress(&self, key: &K) -> Option<Vec<u8>> {
        // Payloads never change once stored; decode outside the lock.
        let codec = self.get(key)?;

        match codec.uncompress() {
            Ok(raw) => Some(raw),
            Err(error) => {
                counter!(METRIC_UNCOMPRESS_ERROR).increment(1);
                warn!(
                    cache = "response",
                    op = "get_and_uncompress",
                    error = %error,
                    "Treating undecodable cache entry as a miss"
                );
                None
            }
        }
    }

    /// Remove `key` if present.
    pub fn remove(&self, key: &K) {
        let mut entries = rw_write(&self.entries, SOURCE, "remove");
        if entries.remove(key) {
            gauge!(METRIC_ENTRIES).set(entries.len() as f64);
        }
    }

    /// Evict the least recently used entry, if any.
    pub fn remove_oldest(&self) {
        let mut entries = rw_write(&self.entries, SOURCE, "remove_oldest");
        if entries.remove_oldest().is_some() {
            counter!(METRIC_EVICT).increment(1);
            gauge!(METRIC_ENTRIES).set(entries.len() as f64);
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        rw_read(&self.entries, SOURCE, "contains").contains(key)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        rw_read(&self.entries, SOURCE, "capacity").capacity()
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<K> {
        rw_read(&self.entries, SOURCE, "keys_by_recency").keys_by_recency()
    }

    fn insert(entries: &mut LruCore<K, C>, key: K, value: C) {
        if entries.add(key, value).is_some() {
            counter!(METRIC_EVICT).increment(1);
            debug!(cache = "response", op = "add", "evicted least recently used entry");
        }
        gauge!(METRIC_ENTRIES).set(entries.len() as f64);
    }
}

fn record_lookup(hit: bool) {
    if hit {
        counter!(METRIC_HIT).increment(1);
    } else {
        counter!(METRIC_MISS).increment(1);
    }
}
