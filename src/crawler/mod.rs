//! Crawler module for discovering product pages
//!
//! This module contains the crawl engine:
//! - HTTP fetching with concurrency ceiling, dispatch delay and retry logic
//! - The per-session URL frontier
//! - Outbound link extraction
//! - The crawl session that ties them together

mod fetcher;
mod frontier;
mod parser;
mod session;

pub use fetcher::{build_http_client, FetchResult, FetchStatus, Fetcher, RetryPolicy};
pub use frontier::{Frontier, UrlRecord};
pub use parser::extract_links;
pub use session::{CrawlReport, Crawler};
