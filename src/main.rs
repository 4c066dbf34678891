//! Morsel command-line interface
//!
//! `morsel crawl` runs the grammar-driven crawl into the page cache;
//! `morsel export` materializes downloaded files from the cache onto disk.

use clap::{Parser, Subcommand};
use morsel::crawler::{run_crawl, CrawlOptions};
use morsel::export::Exporter;
use morsel::grammar::load_grammar;
use morsel::storage::FileStorage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Declarative web crawler and extraction engine
#[derive(Parser, Debug)]
#[command(name = "morsel")]
#[command(version)]
#[command(about = "Declarative web crawler and extraction engine", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl a site into the page cache
    Crawl {
        /// Grammar file describing pages and entities to parse
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Delay between page fetches, in seconds
        #[arg(long, default_value_t = 10)]
        delay: u64,

        /// Cache directory for fetched pages
        #[arg(long, default_value = "./cache")]
        cache: PathBuf,

        /// Starting URL (absolute; its scheme and host become the base for
        /// relative links)
        url: String,

        /// Grammar entity name the starting URL is parsed with
        name: String,
    },

    /// Materialize downloaded files from the cache onto disk
    Export {
        /// Cache directory of a previous crawl
        #[arg(long, default_value = "./cache")]
        cache: PathBuf,

        /// Path rule, e.g. "out/{album:title}/{track:file}"
        rule: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Crawl {
            config,
            delay,
            cache,
            url,
            name,
        } => handle_crawl(config, delay, cache, url, name).await,
        Command::Export { cache, rule } => handle_export(cache, &rule),
    }
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("morsel=info,warn"),
            1 => EnvFilter::new("morsel=debug,info"),
            2 => EnvFilter::new("morsel=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Handles the crawl subcommand
async fn handle_crawl(
    config: PathBuf,
    delay: u64,
    cache: PathBuf,
    url: String,
    name: String,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("loading grammar from {}", config.display());
    let grammar = match load_grammar(&config) {
        Ok(grammar) => grammar,
        Err(e) => {
            tracing::error!("failed to load grammar: {}", e);
            return Err(e.into());
        }
    };

    let options = CrawlOptions {
        start_url: url,
        entity: name,
        delay: Duration::from_secs(delay),
        cache_dir: cache,
    };

    tokio::select! {
        result = run_crawl(grammar, options) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
        }
    }

    Ok(())
}

/// Handles the export subcommand
fn handle_export(cache: PathBuf, rule: &str) -> Result<(), Box<dyn std::error::Error>> {
    let storage = Arc::new(FileStorage::new(cache));
    let exporter = match Exporter::new(storage, rule) {
        Ok(exporter) => exporter,
        Err(e) => {
            tracing::error!("failed to compile export rule: {}", e);
            return Err(e.into());
        }
    };

    exporter.export();
    Ok(())
}
