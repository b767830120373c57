mod cli;
mod client;
mod commands;
mod config;
mod observability;
mod output;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{CacheCommands, Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();
    let cfg = config::load_config(cli.config.as_deref())?;
    observability::init_tracing(&cfg.logging.level);

    match &cli.command {
        Commands::Translate(args) => {
            commands::translate::translate(&cfg, &args.file, format)?;
        }
        Commands::Count(args) => {
            commands::count::count(&cfg, &args.file, args.stats, format).await?;
        }
        Commands::Cache(args) => match &args.command {
            CacheCommands::Stats => commands::cache::stats(&cfg, format)?,
            CacheCommands::Purge { all } => {
                commands::cache::purge(&cfg, *all)?;
            }
        },
        Commands::Config => {
            let rendered =
                toml::to_string_pretty(&cfg.redacted()).context("Failed to render configuration")?;
            println!("{rendered}");
        }
    }

    Ok(())
}
