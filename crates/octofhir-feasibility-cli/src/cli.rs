use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "feasibility")]
#[command(about = "Translate and evaluate FHIR feasibility queries")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ./feasibility.toml when present)
    #[arg(short, long, global = true, env = "FEASIBILITY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the FHIR searches a structured query expands to
    Translate(QueryArgs),
    /// Count the patients matching a structured query
    Count(CountArgs),
    /// Maintain the disk cache
    Cache(CacheArgs),
    /// Show the effective configuration
    Config,
}

#[derive(clap::Args)]
pub struct QueryArgs {
    /// Path to the structured query JSON document
    pub file: PathBuf,
}

#[derive(clap::Args)]
pub struct CountArgs {
    /// Path to the structured query JSON document
    pub file: PathBuf,

    /// Also print cache statistics
    #[arg(long)]
    pub stats: bool,
}

#[derive(clap::Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show entry count and location of the disk cache
    Stats,
    /// Remove expired entries
    Purge {
        /// Remove every entry, not only expired ones
        #[arg(long)]
        all: bool,
    },
}
