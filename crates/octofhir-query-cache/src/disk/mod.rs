//! Disk-backed (tier 2) population cache.
//!
//! Populations survive restarts in an embedded SQLite file. Reads happen on the
//! blocking pool while the request waits for them; writes are handed to a bounded
//! queue drained by background writer tasks and never delay or fail the request. Storage
//! problems of any kind degrade to a miss or a dropped write.

mod store;
mod writer;

pub use store::DiskStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use octofhir_core::{DynQueryService, ExecutorError, FhirQueryService, Population, Query};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::DiskCacheConfig;
use crate::error::CacheResult;
use crate::stats::{Counter, DiskCacheStats};
use writer::WriterPool;

#[derive(Debug, Default)]
pub(crate) struct DiskCounters {
    hits: Counter,
    misses: Counter,
    decode_failures: Counter,
    pub(crate) writes: Counter,
    pub(crate) write_failures: Counter,
    pub(crate) dropped_writes: Counter,
}

/// Tier 2 query service.
///
/// Must be created inside a Tokio runtime (it spawns the writers and the purge task) and should
/// be [closed](Self::close) at shutdown so queued writes reach the store.
pub struct DiskCachingQueryService {
    inner: DynQueryService,
    store: Arc<DiskStore>,
    writer: WriterPool,
    purge_task: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<DiskCounters>,
}

impl DiskCachingQueryService {
    /// Open the store described by `config` and start the writers and purge task.
    pub fn open(inner: DynQueryService, config: &DiskCacheConfig) -> CacheResult<Self> {
        let store = Arc::new(DiskStore::open(config)?);
        Self::with_store(inner, store, config)
    }

    /// Serve from an already opened store.
    pub fn with_store(
        inner: DynQueryService,
        store: Arc<DiskStore>,
        config: &DiskCacheConfig,
    ) -> CacheResult<Self> {
        let counters = Arc::new(DiskCounters::default());
        let writer = WriterPool::start(
            store.clone(),
            counters.clone(),
            config.write_threads,
            config.write_queue_capacity,
        );
        let purge_task = spawn_purge_task(store.clone(), config.purge_interval());

        Ok(Self {
            inner,
            store,
            writer,
            purge_task: Mutex::new(Some(purge_task)),
            counters,
        })
    }

    pub fn store(&self) -> &Arc<DiskStore> {
        &self.store
    }

    pub fn stats(&self) -> DiskCacheStats {
        let c = &self.counters;
        DiskCacheStats {
            hits: c.hits.get(),
            misses: c.misses.get(),
            decode_failures: c.decode_failures.get(),
            writes: c.writes.get(),
            write_failures: c.write_failures.get(),
            dropped_writes: c.dropped_writes.get(),
        }
    }

    /// Stop the purge task and wait for the writers to drain the queue.
    ///
    /// Later writes are dropped; reads keep working until the store is dropped.
    pub async fn close(&self) {
        if let Some(task) = self.purge_task.lock().take() {
            task.abort();
        }

        match self.writer.close().await {
            0 => tracing::info!(path = %self.store.path().display(), "Closed disk cache"),
            failed => tracing::warn!(failed, "Disk cache writer tasks failed"),
        }
    }

    async fn read(&self, key: &str) -> Option<Population> {
        let store = self.store.clone();
        let owned_key = key.to_string();
        let read = tokio::task::spawn_blocking(move || store.get(&owned_key)).await;

        let bytes = match read {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => return None,
            Ok(Err(err)) => {
                tracing::warn!(query = %key, error = %err, "Disk cache read failed");
                return None;
            }
            Err(err) => {
                tracing::warn!(query = %key, error = %err, "Disk cache read task failed");
                return None;
            }
        };

        match Population::decode(&bytes) {
            Ok(population) => Some(population),
            Err(err) => {
                self.counters.decode_failures.incr();
                tracing::warn!(query = %key, error = %err, "Discarding undecodable disk cache entry");
                None
            }
        }
    }
}

#[async_trait]
impl FhirQueryService for DiskCachingQueryService {
    async fn execute(
        &self,
        query: &Query,
        ignore_cache: bool,
    ) -> Result<Population, ExecutorError> {
        let key = query.cache_key();

        if !ignore_cache {
            if let Some(population) = self.read(&key).await {
                self.counters.hits.incr();
                tracing::debug!(query = %key, "Disk cache hit");
                return Ok(population);
            }
            self.counters.misses.incr();
            tracing::debug!(query = %key, "Disk cache miss");
        }

        let population = self.inner.execute(query, ignore_cache).await?;
        self.writer.submit(key, population.encode());
        Ok(population)
    }
}

fn spawn_purge_task(store: Arc<DiskStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.purge_expired()).await {
                Ok(Ok(0)) => {}
                Ok(Ok(removed)) => tracing::debug!(removed, "Purged expired disk cache entries"),
                Ok(Err(err)) => tracing::warn!(error = %err, "Disk cache purge failed"),
                Err(err) => tracing::warn!(error = %err, "Disk cache purge task failed"),
            }
        }
    })
}
