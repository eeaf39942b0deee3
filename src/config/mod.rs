//! Configuration module for the scraper
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use ouedkniss_scraper::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("scraper.toml")).unwrap();
//! println!("Concurrency ceiling: {}", config.scraper.max_concurrent_requests);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ClassifierConfig, Config, CrawlConfig, DedupPolicy, OutputConfig, ScraperConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

// Re-validation after command-line overrides
pub use validation::validate;
