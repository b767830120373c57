use anyhow::{Context, Result};
use octofhir_query_cache::DiskStore;

use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::output::{DiskCacheSummary, print_disk_summary, print_success};

fn open_store(config: &AppConfig) -> Result<DiskStore> {
    if !config.cache.disk.enabled {
        anyhow::bail!("The disk cache is disabled (cache.disk.enabled = false)");
    }
    DiskStore::open(&config.cache.disk).context("Failed to open disk cache")
}

pub fn stats(config: &AppConfig, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;
    let summary = DiskCacheSummary {
        path: store.path().display().to_string(),
        entries: store.entry_count()?,
        ttl_secs: store.ttl().as_secs(),
    };
    print_disk_summary(&summary, format)
}

/// Remove expired entries, or every entry with `all`. Returns the number removed.
pub fn purge(config: &AppConfig, all: bool) -> Result<usize> {
    let store = open_store(config)?;
    let removed = if all {
        store.clear()?
    } else {
        store.purge_expired()?
    };
    print_success(&format!(
        "Removed {removed} {}entries from {}",
        if all { "" } else { "expired " },
        store.path().display()
    ));
    Ok(removed)
}
