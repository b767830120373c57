//! End-to-end behaviour of the memory → disk → executor chain.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use octofhir_core::{ExecutorError, FhirSearchExecutor, Population, Query, QueryParams};
use octofhir_query_cache::{CacheConfig, CachingQueryServiceStack, DiskCacheConfig, MemoryCacheConfig};
use tempfile::{TempDir, tempdir};

#[derive(Default)]
struct CountingExecutor {
    calls: AtomicUsize,
}

#[async_trait]
impl FhirSearchExecutor for CountingExecutor {
    async fn execute(&self, query: &Query) -> Result<Population, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match query.resource_type() {
            "Condition" => Ok(Population::of(["p1", "p2"])?),
            "Observation" => Ok(Population::of(["p2", "p3"])?),
            other => Err(ExecutorError::backend(format!("unknown type {other}"))),
        }
    }
}

fn config(dir: &TempDir) -> CacheConfig {
    CacheConfig {
        memory: MemoryCacheConfig::default(),
        disk: DiskCacheConfig {
            path: dir.path().join("cache").join("populations.db"),
            write_threads: 1,
            ..Default::default()
        },
    }
}

fn condition() -> Query {
    Query::new(
        "Condition",
        QueryParams::of("code", "http://fhir.de/CodeSystem/bfarm/icd-10-gm|C71"),
    )
}

#[tokio::test]
async fn test_memory_tier_answers_repeated_queries() {
    let dir = tempdir().unwrap();
    let executor = Arc::new(CountingExecutor::default());
    let stack = CachingQueryServiceStack::build(&config(&dir), executor.clone()).unwrap();
    let service = stack.service();

    for _ in 0..3 {
        let population = service.execute(&condition(), false).await.unwrap();
        assert_eq!(population.sorted_ids(), vec!["p1", "p2"]);
    }
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);

    let stats = stack.stats().await;
    let memory = stats.memory.unwrap();
    assert_eq!((memory.hits, memory.misses), (2, 1));
    assert_eq!(memory.entry_count, 1);
    assert!(memory.memory_usage_bytes > 0);
    let disk = stats.disk.unwrap();
    assert_eq!((disk.hits, disk.misses), (0, 1));

    stack.close().await;
}

#[tokio::test]
async fn test_disk_tier_survives_restart() {
    let dir = tempdir().unwrap();
    let executor = Arc::new(CountingExecutor::default());

    let stack = CachingQueryServiceStack::build(&config(&dir), executor.clone()).unwrap();
    stack.service().execute(&condition(), false).await.unwrap();
    stack.close().await;
    drop(stack);

    let restarted = CachingQueryServiceStack::build(&config(&dir), executor.clone()).unwrap();
    let population = restarted.service().execute(&condition(), false).await.unwrap();
    assert_eq!(population.len(), 2);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);

    let stats = restarted.stats().await;
    assert_eq!(stats.disk.unwrap().hits, 1);
    assert_eq!(restarted.disk_store().unwrap().entry_count().unwrap(), 1);
    restarted.close().await;
}

#[tokio::test]
async fn test_ignore_cache_reaches_the_executor() {
    let dir = tempdir().unwrap();
    let executor = Arc::new(CountingExecutor::default());
    let stack = CachingQueryServiceStack::build(&config(&dir), executor.clone()).unwrap();

    stack.service().execute(&condition(), false).await.unwrap();
    stack.service().execute(&condition(), true).await.unwrap();
    assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    stack.close().await;
}

#[tokio::test]
async fn test_disabled_tiers_pass_through() {
    let dir = tempdir().unwrap();
    let executor = Arc::new(CountingExecutor::default());
    let mut config = config(&dir);
    config.memory.enabled = false;
    config.disk.enabled = false;

    let stack = CachingQueryServiceStack::build(&config, executor.clone()).unwrap();
    let query = Query::of_type("Observation");
    stack.service().execute(&query, false).await.unwrap();
    stack.service().execute(&query, false).await.unwrap();

    assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    let stats = stack.stats().await;
    assert!(stats.memory.is_none() && stats.disk.is_none());
    assert!(stack.disk_store().is_none());
    assert!(!dir.path().join("cache").exists());
}

#[tokio::test]
async fn test_errors_propagate_through_every_tier() {
    let dir = tempdir().unwrap();
    let executor = Arc::new(CountingExecutor::default());
    let stack = CachingQueryServiceStack::build(&config(&dir), executor).unwrap();

    let err = stack
        .service()
        .execute(&Query::of_type("Encounter"), false)
        .await
        .unwrap_err();
    assert_eq!(err, ExecutorError::backend("unknown type Encounter"));
    stack.close().await;
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempdir().unwrap();
    let mut config = config(&dir);
    config.memory.refresh_after_write_secs = config.memory.expire_after_write_secs;

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let result = runtime.block_on(async {
        CachingQueryServiceStack::build(&config, Arc::new(CountingExecutor::default()))
    });
    assert!(result.is_err());
}
