//! Tiered population cache for FHIR feasibility queries.
//!
//! Every tier implements [`FhirQueryService`](octofhir_core::FhirQueryService)
//! by wrapping the next one:
//!
//! ```text
//! MemCachingQueryService → DiskCachingQueryService → ExecutorQueryService → FhirSearchExecutor
//! ```
//!
//! - [`MemCachingQueryService`]: weight-bounded, single-flight, refresh-ahead
//! - [`DiskCachingQueryService`]: persistent SQLite store with a per-entry TTL
//! - [`CachingQueryServiceStack`]: builds the chain from [`CacheConfig`]

pub mod config;
pub mod disk;
pub mod error;
pub mod memory;
pub mod stack;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use config::{CacheConfig, DiskCacheConfig, MemoryCacheConfig};
pub use disk::{DiskCachingQueryService, DiskStore};
pub use error::{CacheError, CacheResult};
pub use memory::MemCachingQueryService;
pub use stack::CachingQueryServiceStack;
pub use stats::{CacheStats, DiskCacheStats, MemoryCacheStats};
