//! Assembly of the tiered query service.

use std::sync::Arc;

use octofhir_core::{DynQueryService, ExecutorQueryService, FhirSearchExecutor};

use crate::config::CacheConfig;
use crate::disk::{DiskCachingQueryService, DiskStore};
use crate::error::{CacheError, CacheResult};
use crate::memory::MemCachingQueryService;
use crate::stats::CacheStats;

/// The query service chain `memory → disk → executor`, with disabled tiers left out.
///
/// Keeps typed handles to each tier for statistics and shutdown.
pub struct CachingQueryServiceStack {
    service: DynQueryService,
    memory: Option<Arc<MemCachingQueryService>>,
    disk: Option<Arc<DiskCachingQueryService>>,
}

impl CachingQueryServiceStack {
    /// Build the stack over `executor`. Must be called inside a Tokio runtime.
    pub fn build(config: &CacheConfig, executor: Arc<dyn FhirSearchExecutor>) -> CacheResult<Self> {
        config.validate().map_err(CacheError::Config)?;

        let mut service: DynQueryService = Arc::new(ExecutorQueryService::new(executor));

        let disk = if config.disk.enabled {
            let disk = Arc::new(DiskCachingQueryService::open(service, &config.disk)?);
            service = disk.clone();
            Some(disk)
        } else {
            None
        };

        let memory = if config.memory.enabled {
            let memory = Arc::new(MemCachingQueryService::new(service, &config.memory));
            service = memory.clone();
            Some(memory)
        } else {
            None
        };

        tracing::info!(
            memory = memory.is_some(),
            disk = disk.is_some(),
            "Built caching query service"
        );

        Ok(Self {
            service,
            memory,
            disk,
        })
    }

    /// The outermost service; what the orchestrator should query.
    pub fn service(&self) -> DynQueryService {
        self.service.clone()
    }

    pub fn disk_store(&self) -> Option<&Arc<DiskStore>> {
        self.disk.as_ref().map(|disk| disk.store())
    }

    pub async fn stats(&self) -> CacheStats {
        let memory = match &self.memory {
            Some(memory) => {
                memory.run_pending_tasks().await;
                Some(memory.stats())
            }
            None => None,
        };
        CacheStats {
            memory,
            disk: self.disk.as_ref().map(|disk| disk.stats()),
        }
    }

    /// Flush pending disk writes and stop background tasks.
    pub async fn close(&self) {
        if let Some(disk) = &self.disk {
            disk.close().await;
        }
    }
}
