//! Ouedkniss scraper: crawl-and-extract engine for classified listings
//!
//! This crate discovers product pages on a classifieds site, extracts them into
//! structured [`Product`](extract::Product) records, and hands them to a storage
//! collaborator. Fetching is concurrency-bounded, rate limited and retried with
//! exponential backoff; extraction degrades field by field instead of failing
//! whole pages.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod site;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for scraper operations
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid state transition for {url}: {from} -> {to}")]
    InvalidTransition {
        url: String,
        from: state::UrlState,
        to: state::UrlState,
    },

    #[error("Unknown URL: {0}")]
    UnknownUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for scraper operations
pub type Result<T> = std::result::Result<T, ScraperError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlReport, Crawler, FetchResult, FetchStatus, Fetcher, Frontier};
pub use extract::{Extraction, ExtractionFailure, Product, ProductExtractor};
pub use pipeline::{Pipeline, PipelineReport};
pub use site::{Ouedkniss, SiteProfile};
pub use state::{SessionOutcome, UrlState};
pub use crate::url::{normalize_url, UrlCategory, UrlClassifier};
