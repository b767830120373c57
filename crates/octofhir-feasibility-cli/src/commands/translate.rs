use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::output::print_translation;

/// Print the searches of a query without running them.
pub fn translate(config: &AppConfig, file: &Path, format: OutputFormat) -> Result<()> {
    let query = super::read_query(file)?;
    let mapping_context = super::load_mapping_context(&config.mapping)?;

    let translated = octofhir_feasibility::translate(&mapping_context, &query)
        .context("Failed to translate structured query")?;
    print_translation(&translated, format)
}
