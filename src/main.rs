//! Ouedkniss scraper main entry point
//!
//! This is the command-line interface for crawling and scraping Ouedkniss
//! listings into a local SQLite database.

use anyhow::Context;
use clap::{Parser, Subcommand};
use ouedkniss_scraper::config::{load_config_with_hash, validate, Config};
use ouedkniss_scraper::output::{load_statistics, print_session_summary, print_statistics};
use ouedkniss_scraper::storage::SqliteStorage;
use ouedkniss_scraper::{ConfigError, Pipeline};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Ouedkniss scraper: crawls classified listings and stores them as products
///
/// Listing pages are crawled politely (bounded concurrency, a fixed delay
/// between requests and retries with backoff), product pages are extracted
/// field by field and new or changed products are written to SQLite.
#[derive(Parser, Debug)]
#[command(name = "ouedkniss-scraper")]
#[command(version)]
#[command(about = "Crawl and extract Ouedkniss classified listings", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "PATH", default_value = "config.toml", global = true)]
    config: PathBuf,

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
    /// Crawl categories and store every product found
    Crawl {
        /// Category URL to crawl (repeatable); defaults to the configured seeds
        #[arg(long = "category", value_name = "URL")]
        categories: Vec<String>,

        /// Stop after visiting this many listing pages
        #[arg(long)]
        max_pages: Option<u32>,

        /// Stop after storing this many products
        #[arg(long)]
        max_products: Option<u32>,

        /// Delete stored products before crawling
        #[arg(long)]
        fresh: bool,
    },

    /// Scrape the given product URLs directly
    Scrape {
        #[arg(value_name = "URL", required = true)]
        urls: Vec<String>,
    },

    /// Show statistics from the database and exit
    Stats,

    /// Validate config and show what would be crawled
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e).with_context(|| format!("loading {}", cli.config.display()));
        }
    };

    match cli.command {
        Command::Crawl {
            categories,
            max_pages,
            max_products,
            fresh,
        } => {
            let config = apply_crawl_overrides(config, categories, max_pages, max_products)
                .context("invalid command-line overrides")?;
            handle_crawl(config, &config_hash, fresh).await
        }
        Command::Scrape { urls } => handle_scrape(config, &config_hash, urls).await,
        Command::Stats => handle_stats(&config),
        Command::Check => {
            handle_check(&config);
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ouedkniss_scraper=info,warn"),
            1 => EnvFilter::new("ouedkniss_scraper=debug,info"),
            2 => EnvFilter::new("ouedkniss_scraper=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies `crawl` flags on top of the file configuration and validates the result
fn apply_crawl_overrides(
    mut config: Config,
    categories: Vec<String>,
    max_pages: Option<u32>,
    max_products: Option<u32>,
) -> Result<Config, ConfigError> {
    if !categories.is_empty() {
        config.crawl.seeds = categories;
    }
    if max_pages.is_some() {
        config.crawl.max_pages = max_pages;
    }
    if max_products.is_some() {
        config.crawl.max_products = max_products;
    }
    validate(&config)?;
    Ok(config)
}

/// Seeds for a crawl session; no configured seeds means the site root
fn crawl_seeds(config: &Config) -> Vec<String> {
    if config.crawl.seeds.is_empty() {
        vec![config.scraper.base_url.clone()]
    } else {
        config.crawl.seeds.clone()
    }
}

fn open_storage(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = Path::new(&config.output.database_path);
    SqliteStorage::new(path).with_context(|| format!("opening database {}", path.display()))
}

/// Handles the `check` command: shows what would be crawled
fn handle_check(config: &Config) {
    println!("=== Ouedkniss Scraper Check ===\n");

    println!("Scraper:");
    println!("  Base URL: {}", config.scraper.base_url);
    println!("  User agent: {}", config.scraper.user_agent);
    println!(
        "  Concurrency: {} requests, {}ms between requests",
        config.scraper.max_concurrent_requests, config.scraper.rate_limit_delay_ms
    );
    println!(
        "  Retries: {} (backoff {}ms..{}ms)",
        config.scraper.max_retries, config.scraper.backoff_base_ms, config.scraper.backoff_max_ms
    );
    println!("  Timeout: {}s", config.scraper.request_timeout_secs);

    println!("\nCrawl:");
    match config.crawl.max_pages {
        Some(max) => println!("  Max pages: {}", max),
        None => println!("  Max pages: unlimited"),
    }
    match config.crawl.max_products {
        Some(max) => println!("  Max products: {}", max),
        None => println!("  Max products: unlimited"),
    }
    println!("  Dedup: {:?}", config.crawl.dedup);

    let seeds = crawl_seeds(config);
    println!("\nSeeds ({}):", seeds.len());
    for seed in &seeds {
        println!("  - {}", seed);
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the `stats` command: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(config)?;
    let stats = load_statistics(&storage).context("loading statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the `crawl` command
async fn handle_crawl(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    let mut storage = open_storage(&config)?;
    if fresh {
        let removed = storage.clear_products()?;
        tracing::info!("Starting fresh crawl ({} stored products removed)", removed);
    }

    let seeds = crawl_seeds(&config);
    tracing::info!("Total seed URLs: {}", seeds.len());

    let pipeline = Pipeline::from_config(&config, config_hash, storage)?;
    match pipeline.run_crawl(&seeds).await {
        Ok(report) => {
            tracing::info!("Crawl finished: {}", report.outcome);
            print_session_summary(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handles the `scrape` command
async fn handle_scrape(config: Config, config_hash: &str, urls: Vec<String>) -> anyhow::Result<()> {
    let storage = open_storage(&config)?;
    tracing::info!("Scraping {} product URLs", urls.len());

    let pipeline = Pipeline::from_config(&config, config_hash, storage)?;
    match pipeline.run_scrape(&urls).await {
        Ok(report) => {
            print_session_summary(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Scrape failed: {}", e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ouedkniss_scraper::config::parse_config;

    fn file_config() -> Config {
        parse_config(
            r#"
[scraper]
base-url = "https://www.ouedkniss.com"

[crawl]
max-products = 100

[output]
database-path = "./test.db"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let config = apply_crawl_overrides(
            file_config(),
            vec!["https://www.ouedkniss.com/telephones".to_string()],
            Some(3),
            Some(10),
        )
        .unwrap();

        assert_eq!(config.crawl.seeds.len(), 1);
        assert_eq!(config.crawl.max_pages, Some(3));
        assert_eq!(config.crawl.max_products, Some(10));
    }

    #[test]
    fn test_zero_limit_overrides_rejected() {
        assert!(matches!(
            apply_crawl_overrides(file_config(), Vec::new(), None, Some(0)),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            apply_crawl_overrides(file_config(), Vec::new(), Some(0), None),
            Err(ConfigError::Validation(_))
        ));
        assert!(apply_crawl_overrides(
            file_config(),
            vec!["not a url".to_string()],
            None,
            None
        )
        .is_err());
    }
}
