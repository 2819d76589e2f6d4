//! Response cache configuration.
//!
//! Populated from the `[cache]` section of `sander.toml` via [`crate::config::CacheSettings`].

use std::num::NonZeroUsize;

// Default values for cache configuration
const DEFAULT_CAPACITY: usize = 100;
const DEFAULT_POPULATE_WORKERS: usize = 2;
const DEFAULT_POPULATE_QUEUE_LIMIT: usize = 256;
const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;
const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Response cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Serve and populate the response cache.
    pub enabled: bool,
    /// Maximum number of cached responses.
    pub capacity: usize,
    /// Concurrent background compress-and-insert jobs.
    pub populate_workers: usize,
    /// Pending population jobs before new ones are dropped.
    pub populate_queue_limit: usize,
    /// Largest response body that will be cached.
    pub body_limit_bytes: usize,
    /// Gzip level, 0 (store) to 9 (best).
    pub compression_level: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CAPACITY,
            populate_workers: DEFAULT_POPULATE_WORKERS,
            populate_queue_limit: DEFAULT_POPULATE_QUEUE_LIMIT,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            capacity: settings.capacity.get(),
            populate_workers: settings.populate_workers.get(),
            populate_queue_limit: settings.populate_queue_limit.get(),
            body_limit_bytes: settings.body_limit_bytes.get(),
            compression_level: settings.compression_level,
        }
    }
}

impl CacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the worker count as NonZeroUsize, clamping to 1 if zero.
    pub fn populate_workers_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.populate_workers).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the queue limit as NonZeroUsize, clamping to 1 if zero.
    pub fn populate_queue_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.populate_queue_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Compression level clamped to the gzip range.
    pub fn compression_level_clamped(&self) -> u32 {
        self.compression_level.min(9)
    }
}
