pub mod cache;
pub mod count;
pub mod translate;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use octofhir_feasibility::{MappingContext, StructuredQuery};

use crate::config::MappingConfig;

/// Read a structured query document.
pub fn read_query(path: &Path) -> Result<StructuredQuery> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read query file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid structured query in {}", path.display()))
}

pub fn load_mapping_context(config: &MappingConfig) -> Result<MappingContext> {
    MappingContext::load(&config.mapping_file, config.tree_file.as_deref())
        .context("Failed to load term code mappings")
}
