//! In-memory (tier 1) population cache.
//!
//! Wraps another [`FhirQueryService`] with a weight-bounded [`moka`] cache keyed
//! by the rendered query string. Loads are single-flight: concurrent requests for
//! the same uncached query share one upstream call. Entries expire a fixed time
//! after they were written; once an entry is older than the refresh threshold it
//! is still served, and one background recomputation (bypassing every cache read)
//! replaces it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashSet;
use moka::future::Cache;
use moka::notification::RemovalCause;
use octofhir_core::{DynQueryService, ExecutorError, FhirQueryService, Population, Query};

use crate::config::MemoryCacheConfig;
use crate::stats::{Counter, MemoryCacheStats};

/// A cached population and the instant it was loaded.
#[derive(Debug, Clone)]
struct CachedPopulation {
    population: Population,
    loaded_at: Instant,
}

impl CachedPopulation {
    fn new(population: Population) -> Self {
        Self {
            population,
            loaded_at: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryCounters {
    hits: Counter,
    misses: Counter,
    evictions: Counter,
    load_successes: Counter,
    load_failures: Counter,
    load_time_nanos: Counter,
    refreshes: Counter,
}

impl MemoryCounters {
    fn record_load(&self, started: Instant, ok: bool) {
        self.load_time_nanos
            .add(u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX));
        if ok {
            self.load_successes.incr();
        } else {
            self.load_failures.incr();
        }
    }
}

/// Tier 1 query service.
pub struct MemCachingQueryService {
    inner: DynQueryService,
    cache: Cache<String, CachedPopulation>,
    refresh_after: Duration,
    refreshing: Arc<DashSet<String>>,
    counters: Arc<MemoryCounters>,
}

impl MemCachingQueryService {
    pub fn new(inner: DynQueryService, config: &MemoryCacheConfig) -> Self {
        Self::with_limits(
            inner,
            config.max_weight_bytes,
            config.expire_after_write(),
            config.refresh_after_write(),
        )
    }

    /// Build the tier from explicit limits.
    pub fn with_limits(
        inner: DynQueryService,
        max_weight_bytes: u64,
        expire_after: Duration,
        refresh_after: Duration,
    ) -> Self {
        let counters = Arc::new(MemoryCounters::default());
        let listener_counters = counters.clone();

        let cache = Cache::builder()
            .max_capacity(max_weight_bytes)
            .weigher(|key: &String, value: &CachedPopulation| -> u32 {
                let weight = key.len() + value.population.memory_size();
                u32::try_from(weight).unwrap_or(u32::MAX)
            })
            .time_to_live(expire_after)
            .eviction_listener(move |_key, _value, cause: RemovalCause| {
                if cause.was_evicted() {
                    listener_counters.evictions.incr();
                }
            })
            .build();

        Self {
            inner,
            cache,
            refresh_after,
            refreshing: Arc::new(DashSet::new()),
            counters,
        }
    }

    /// Snapshot of the tier statistics.
    ///
    /// Entry count and weighted size are eventually consistent; call
    /// [`Self::run_pending_tasks`] first when an exact figure is needed.
    pub fn stats(&self) -> MemoryCacheStats {
        let c = &self.counters;
        MemoryCacheStats {
            entry_count: self.cache.entry_count(),
            memory_usage_bytes: self.cache.weighted_size(),
            hits: c.hits.get(),
            misses: c.misses.get(),
            evictions: c.evictions.get(),
            load_successes: c.load_successes.get(),
            load_failures: c.load_failures.get(),
            total_load_time: Duration::from_nanos(c.load_time_nanos.get()),
            refreshes: c.refreshes.get(),
        }
    }

    /// Apply pending maintenance (expiry, eviction, size accounting).
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    async fn load(&self, query: &Query, key: &str) -> Result<Population, ExecutorError> {
        let entry = self
            .cache
            .entry_by_ref(key)
            .or_try_insert_with(async {
                let started = Instant::now();
                let result = self.inner.execute(query, false).await;
                self.counters.record_load(started, result.is_ok());
                result.map(CachedPopulation::new)
            })
            .await
            .map_err(|err| (*err).clone())?;

        if entry.is_fresh() {
            self.counters.misses.incr();
            tracing::debug!(query = %key, "Memory cache miss");
            return Ok(entry.into_value().population);
        }

        self.counters.hits.incr();
        let cached = entry.into_value();
        if cached.loaded_at.elapsed() >= self.refresh_after {
            self.refresh(query.clone(), key.to_string());
        }
        Ok(cached.population)
    }

    /// Recompute `query` in the background, at most once at a time per key.
    fn refresh(&self, query: Query, key: String) {
        if !self.refreshing.insert(key.clone()) {
            return;
        }
        self.counters.refreshes.incr();
        tracing::debug!(query = %key, "Refreshing stale memory cache entry");

        let inner = self.inner.clone();
        let cache = self.cache.clone();
        let refreshing = self.refreshing.clone();
        let counters = self.counters.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let result = inner.execute(&query, true).await;
            counters.record_load(started, result.is_ok());
            match result {
                Ok(population) => {
                    cache
                        .insert(key.clone(), CachedPopulation::new(population))
                        .await;
                }
                Err(err) => {
                    tracing::warn!(query = %key, error = %err, "Memory cache refresh failed");
                }
            }
            refreshing.remove(&key);
        });
    }
}

#[async_trait]
impl FhirQueryService for MemCachingQueryService {
    async fn execute(
        &self,
        query: &Query,
        ignore_cache: bool,
    ) -> Result<Population, ExecutorError> {
        let key = query.cache_key();

        if ignore_cache {
            let started = Instant::now();
            let result = self.inner.execute(query, true).await;
            self.counters.record_load(started, result.is_ok());
            let population = result?;
            self.cache
                .insert(key, CachedPopulation::new(population.clone()))
                .await;
            return Ok(population);
        }

        self.load(query, &key).await
    }
}
