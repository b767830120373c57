//! Seams between the query engine and whatever answers FHIR searches.
//!
//! ```text
//! StructuredQueryService → FhirQueryService (memory → disk → ...) → FhirSearchExecutor
//! ```
//!
//! [`FhirSearchExecutor`] is the raw backend: it runs one rendered search and
//! returns the matching patients. [`FhirQueryService`] is what the orchestrator
//! talks to; cache tiers implement it by wrapping another service, and
//! [`ExecutorQueryService`] adapts a plain executor to the bottom of the stack.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ExecutorError;
use crate::population::Population;
use crate::query::Query;

/// Executes a rendered search against a FHIR backend.
#[async_trait]
pub trait FhirSearchExecutor: Send + Sync {
    /// Run the search and collect the ids of all matching patients.
    async fn execute(&self, query: &Query) -> Result<Population, ExecutorError>;
}

/// Query execution as seen by the orchestrator, possibly backed by caches.
#[async_trait]
pub trait FhirQueryService: Send + Sync {
    /// Resolve a query to its population.
    ///
    /// With `ignore_cache` set, cached values must not be read; fresh results may
    /// still be written back to the caches.
    async fn execute(&self, query: &Query, ignore_cache: bool)
    -> Result<Population, ExecutorError>;
}

/// Shared handle to a query service.
pub type DynQueryService = Arc<dyn FhirQueryService>;

/// Adapts a [`FhirSearchExecutor`] to [`FhirQueryService`].
///
/// There is nothing to bypass at this level, so `ignore_cache` has no effect.
pub struct ExecutorQueryService {
    executor: Arc<dyn FhirSearchExecutor>,
}

impl ExecutorQueryService {
    pub fn new(executor: Arc<dyn FhirSearchExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl FhirQueryService for ExecutorQueryService {
    async fn execute(
        &self,
        query: &Query,
        _ignore_cache: bool,
    ) -> Result<Population, ExecutorError> {
        tracing::debug!(query = %query, "Executing FHIR search");
        self.executor.execute(query).await
    }
}
