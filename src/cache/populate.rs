//! Background cache population.
//!
//! Handlers answer first and hand the response body to a [`CachePopulator`].
//! A single dispatcher drains a bounded queue and runs at most
//! `populate_workers` compress-and-insert jobs at once on the blocking pool.
//! When the queue is full new jobs are dropped; caching is best-effort.

use std::hash::Hash;
use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::codec::CacheData;
use super::config::CacheConfig;
use super::store::ResponseCache;

pub(crate) const METRIC_POPULATE_DROPPED: &str = "sander_cache_populate_dropped_total";

const MAX_WORKERS: usize = 64;

struct PopulateJob<K> {
    key: K,
    payload: Bytes,
}

/// Cloneable handle for submitting bodies to be cached.
///
/// The dispatcher stops once every handle has been dropped and the queue is drained.
pub struct CachePopulator<K> {
    tx: Sender<PopulateJob<K>>,
}

impl<K> Clone for CachePopulator<K> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<K> CachePopulator<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Start the dispatcher on the current runtime.
    ///
    /// The returned handle resolves after the last populator handle is dropped
    /// and all queued jobs have finished.
    pub fn spawn(
        cache: Arc<ResponseCache<K, CacheData>>,
        config: &CacheConfig,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.populate_queue_limit_non_zero().get());
        let workers = config.populate_workers_non_zero().get().min(MAX_WORKERS);
        let level = config.compression_level_clamped();

        info!(
            workers,
            queue_limit = config.populate_queue_limit_non_zero().get(),
            compression_level = level,
            "Starting response cache populator"
        );

        let handle = tokio::spawn(dispatch(cache, rx, workers, level));
        (Self { tx }, handle)
    }

    /// Queue `payload` for insertion under `key` without waiting.
    ///
    /// Returns `false` when the job was dropped.
    pub fn submit(&self, key: K, payload: Bytes) -> bool {
        match self.tx.try_send(PopulateJob { key, payload }) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                counter!(METRIC_POPULATE_DROPPED).increment(1);
                debug!(
                    cache = "response",
                    op = "populate",
                    payload_len = job.payload.len(),
                    reason = "queue_full",
                    "Dropping cache population job"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    cache = "response",
                    op = "populate",
                    reason = "closed",
                    "Dropping cache population job"
                );
                false
            }
        }
    }
}

async fn dispatch<K>(
    cache: Arc<ResponseCache<K, CacheData>>,
    mut rx: Receiver<PopulateJob<K>>,
    workers: usize,
    level: u32,
) where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    let permits = Arc::new(Semaphore::new(workers));

    while let Some(job) = rx.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let cache = Arc::clone(&cache);

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            cache.compress_and_add(job.key, &job.payload, CacheData::with_level(level));
        });
    }

    // Every permit back means every in-flight insert has finished.
    let _ = permits.acquire_many(workers as u32).await;
    debug!(cache = "response", "Response cache populator stopped");
}
