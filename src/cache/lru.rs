//! Unsynchronized least-recently-used core.
//!
//! Wraps [`lru::LruCache`] (a doubly-linked recency list plus key table) with
//! the add/remove semantics the response cache relies on and an optional
//! eviction hook. Callers provide their own locking; see [`super::ResponseCache`].

use std::any::Any;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use lru::LruCache;
use tracing::error;

/// Callback invoked with every entry that leaves the cache.
pub type EvictionHook<K, V> = Arc<dyn Fn(&K, V) + Send + Sync>;

/// Bounded LRU map. The head of the recency list is the most recently used entry.
pub struct LruCore<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    on_evict: Option<EvictionHook<K, V>>,
}

impl<K: Hash + Eq, V> LruCore<K, V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            on_evict: None,
        }
    }

    /// Attach a hook that receives removed and evicted entries.
    ///
    /// A panic inside the hook is caught and logged; the entry is dropped either way.
    pub fn with_eviction_hook(mut self, hook: EvictionHook<K, V>) -> Self {
        self.on_evict = Some(hook);
        self
    }

    /// Insert or overwrite `key` and move it to the head.
    ///
    /// Returns the key evicted from the tail to make room, if any. Overwriting an
    /// existing key never evicts.
    pub fn add(&mut self, key: K, value: V) -> Option<K> {
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = value;
            return None;
        }

        let evicted = self.entries.push(key, value);
        debug_assert!(
            self.entries.len() <= self.entries.cap().get(),
            "lru core grew past its capacity"
        );

        evicted.map(|(evicted_key, evicted_value)| {
            self.release(&evicted_key, evicted_value);
            evicted_key
        })
    }

    /// Look up `key`, promoting it to the head on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Presence check that leaves recency untouched.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Remove `key` if present. Returns whether an entry was removed.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.entries.pop_entry(key) {
            Some((removed_key, removed_value)) => {
                self.release(&removed_key, removed_value);
                true
            }
            None => false,
        }
    }

    /// Evict the tail entry, returning its key.
    pub fn remove_oldest(&mut self) -> Option<K> {
        let (key, value) = self.entries.pop_lru()?;
        self.release(&key, value);
        Some(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Keys ordered from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.entries.iter().map(|(key, _)| key.clone()).collect()
    }

    fn release(&self, key: &K, value: V) {
        let Some(hook) = self.on_evict.as_ref() else {
            return;
        };

        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| hook(key, value))) {
            error!(
                op = "evict",
                result = "hook_panicked",
                panic = panic_message(payload.as_ref()),
                "Eviction hook panicked; entry dropped"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
