//! Sander response cache.
//!
//! A fixed-capacity, least-recently-used cache of gzip-compressed response
//! bodies keyed by request fingerprint:
//!
//! - **LRU core** ([`LruCore`]): recency-ordered map with tail eviction
//! - **Codec** ([`CacheData`]): gzip applied on insert, reversed on every read
//! - **Store** ([`ResponseCache`]): one `RwLock` around both
//! - **Populator** ([`CachePopulator`]): bounded background inserts off the request path
//!
//! Entries never expire by time. Callers avoid caching content that must be
//! visible immediately instead of invalidating it.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! capacity = 100
//! populate_workers = 2
//! populate_queue_limit = 256
//! # ... see config.rs for all options
//! ```

mod codec;
mod config;
mod keys;
mod lock;
mod lru;
mod middleware;
mod populate;
mod store;

pub use codec::{CacheData, CodecError, Compressor};
pub use config::CacheConfig;
pub use keys::CacheKey;
pub use lru::{EvictionHook, LruCore};
pub use middleware::{CacheState, Cacheable, response_cache_layer};
pub use populate::CachePopulator;
pub use store::{HttpResponseCache, ResponseCache};
