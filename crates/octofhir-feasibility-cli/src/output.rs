use colored::Colorize;
use octofhir_feasibility::{TranslatedCriterion, TranslatedQuery};
use octofhir_query_cache::CacheStats;
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_translation(translated: &TranslatedQuery, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(translated),
        OutputFormat::Table => {
            let mut builder = Builder::default();
            builder.push_record(["Section", "Group", "Concept", "Search"]);
            push_section(&mut builder, "inclusion", &translated.inclusion);
            push_section(&mut builder, "exclusion", &translated.exclusion);
            let table = builder.build().with(Style::rounded()).to_string();
            println!("{table}");
            println!("Searches: {}", translated.query_count());
            Ok(())
        }
    }
}

fn push_section(builder: &mut Builder, section: &str, groups: &[Vec<TranslatedCriterion>]) {
    for (index, group) in groups.iter().enumerate() {
        let group_label = (index + 1).to_string();
        for criterion in group {
            for query in &criterion.queries {
                builder.push_record([
                    section,
                    group_label.as_str(),
                    criterion.concept.as_str(),
                    query.as_str(),
                ]);
            }
        }
    }
}

#[derive(Serialize)]
struct CountReport<'a> {
    count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache: Option<&'a CacheStats>,
}

pub fn print_count(
    count: u64,
    stats: Option<&CacheStats>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(&CountReport { count, cache: stats }),
        OutputFormat::Table => {
            println!("{}: {}", "Patients".cyan(), count.to_string().bold());
            if let Some(stats) = stats {
                print_cache_stats_table(stats);
            }
            Ok(())
        }
    }
}

fn print_cache_stats_table(stats: &CacheStats) {
    let mut builder = Builder::default();
    builder.push_record(["Tier", "Hits", "Misses", "Hit rate", "Details"]);
    if let Some(memory) = &stats.memory {
        builder.push_record([
            "memory".to_string(),
            memory.hits.to_string(),
            memory.misses.to_string(),
            format!("{:.1}%", memory.hit_rate() * 100.0),
            format!(
                "{} entries, {} bytes, {} evictions, {} refreshes",
                memory.entry_count, memory.memory_usage_bytes, memory.evictions, memory.refreshes
            ),
        ]);
    }
    if let Some(disk) = &stats.disk {
        builder.push_record([
            "disk".to_string(),
            disk.hits.to_string(),
            disk.misses.to_string(),
            format!("{:.1}%", disk.hit_rate() * 100.0),
            format!(
                "{} writes, {} dropped, {} failed, {} undecodable",
                disk.writes, disk.dropped_writes, disk.write_failures, disk.decode_failures
            ),
        ]);
    }
    let table = builder.build().with(Style::rounded()).to_string();
    println!("{table}");
}

/// Location and size of the disk cache.
#[derive(Serialize)]
pub struct DiskCacheSummary {
    pub path: String,
    pub entries: u64,
    pub ttl_secs: u64,
}

pub fn print_disk_summary(summary: &DiskCacheSummary, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Table => {
            println!("{}: {}", "Path".cyan(), summary.path);
            println!("{}: {}", "Entries".cyan(), summary.entries);
            println!("{}: {}s", "TTL".cyan(), summary.ttl_secs);
            Ok(())
        }
    }
}
