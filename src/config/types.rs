use crate::url::UrlCategory;
use serde::Deserialize;

/// Main configuration structure for the scraper
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    pub output: OutputConfig,
}

/// HTTP behavior: target site, politeness and retry policy
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    /// Root URL of the classifieds site (e.g. "https://www.ouedkniss.com")
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Minimum delay between two request dispatches (milliseconds)
    #[serde(rename = "rate-limit-delay-ms", default = "default_rate_limit_delay")]
    pub rate_limit_delay_ms: u64,

    /// Maximum number of requests in flight at once
    #[serde(
        rename = "max-concurrent-requests",
        default = "default_max_concurrent_requests"
    )]
    pub max_concurrent_requests: u32,

    /// Retries after the first attempt for transient failures
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay (milliseconds), doubled on every retry
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay (milliseconds)
    #[serde(rename = "backoff-max-ms", default = "default_backoff_max")]
    pub backoff_max_ms: u64,

    /// Currency assumed when a price carries no marker
    #[serde(rename = "default-currency", default = "default_currency")]
    pub default_currency: String,
}

/// Crawl session limits and seeds
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrawlConfig {
    /// Stop after visiting this many listing pages
    #[serde(rename = "max-pages")]
    pub max_pages: Option<u32>,

    /// Stop after this many products have been stored
    #[serde(rename = "max-products")]
    pub max_products: Option<u32>,

    /// Category URLs to start from; empty means every category reachable from the home page
    #[serde(default)]
    pub seeds: Vec<String>,

    /// What to do with products that are already stored
    #[serde(default)]
    pub dedup: DedupPolicy,
}

/// How the pipeline treats product ids that storage already knows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupPolicy {
    /// Skip known ids without fetching them
    #[default]
    SkipExisting,
    /// Re-fetch known ids and store them again only if their content changed
    Refresh,
}

/// URL classification tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Category precedence for ambiguous URLs, highest first
    #[serde(default)]
    pub precedence: Option<Vec<UrlCategory>>,

    /// Minimum digits for a bare numeric trailing segment to count as a product id
    #[serde(rename = "min-id-digits", default = "default_min_id_digits")]
    pub min_id_digits: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            precedence: None,
            min_id_digits: default_min_id_digits(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_user_agent() -> String {
    format!("ouedkniss-scraper/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_rate_limit_delay() -> u64 {
    1000
}

fn default_max_concurrent_requests() -> u32 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_backoff_max() -> u64 {
    30_000
}

fn default_currency() -> String {
    "DZD".to_string()
}

fn default_min_id_digits() -> usize {
    5
}
