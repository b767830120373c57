//! In-test backend standing in for the next tier.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use octofhir_core::{ExecutorError, FhirQueryService, Population, Query};
use parking_lot::Mutex;

/// Answers queries from a table of canned populations and counts calls.
#[derive(Default)]
pub(crate) struct MockQueryService {
    responses: Mutex<HashMap<String, Population>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    ignore_cache_calls: AtomicUsize,
}

impl MockQueryService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn respond(&self, query: &Query, ids: &[&str]) {
        let population = Population::of(ids.iter().copied()).unwrap();
        self.responses.lock().insert(query.cache_key(), population);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn ignore_cache_calls(&self) -> usize {
        self.ignore_cache_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FhirQueryService for MockQueryService {
    async fn execute(
        &self,
        query: &Query,
        ignore_cache: bool,
    ) -> Result<Population, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if ignore_cache {
            self.ignore_cache_calls.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .get(&query.cache_key())
            .cloned()
            .ok_or_else(|| ExecutorError::backend(format!("no response for {query}")))
    }
}
