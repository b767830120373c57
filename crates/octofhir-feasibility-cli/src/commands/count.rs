use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use octofhir_feasibility::StructuredQueryService;
use octofhir_query_cache::CachingQueryServiceStack;

use crate::cli::OutputFormat;
use crate::client::RestSearchExecutor;
use crate::config::AppConfig;
use crate::output::print_count;

/// Evaluate a query through the cache stack and print the patient count.
pub async fn count(
    config: &AppConfig,
    file: &Path,
    show_stats: bool,
    format: OutputFormat,
) -> Result<()> {
    let query = super::read_query(file)?;
    let mapping_context = super::load_mapping_context(&config.mapping)?;

    let executor = Arc::new(RestSearchExecutor::new(&config.fhir)?);
    let stack = CachingQueryServiceStack::build(&config.cache, executor)
        .context("Failed to open query cache")?;
    let service = StructuredQueryService::new(
        stack.service(),
        Arc::new(mapping_context),
        config.evaluation.clone(),
    );

    let started = Instant::now();
    let result = service.execute(&query).await;
    let stats = stack.stats().await;
    // Queued disk writes are flushed even when evaluation failed.
    stack.close().await;

    let count = result.context("Failed to evaluate structured query")?;
    tracing::info!(
        count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Evaluated structured query"
    );
    print_count(count, show_stats.then_some(&stats), format)
}
