//! Storage module for persisting products
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Product upserts keyed by product id, with content fingerprints
//! - Run tracking (one row per crawl or scrape session)
//! - Statistics queries

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{ProductStore, StorageError, StorageResult, UpsertOutcome};

use crate::state::SessionOutcome;
use std::fmt;

/// How a session was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Category crawl through the frontier
    Crawl,
    /// Direct scrape of given product URLs
    Scrape,
}

impl RunMode {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Crawl => "crawl",
            Self::Scrape => "scrape",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "crawl" => Some(Self::Crawl),
            "scrape" => Some(Self::Scrape),
            _ => None,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Counters recorded when a run finishes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub pages_visited: u32,
    pub products_stored: u32,
    pub products_unchanged: u32,
    pub products_skipped: u32,
    pub failures: u32,
}

/// Represents a recorded session
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub mode: RunMode,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    /// None while the run is in progress (or if it was interrupted)
    pub outcome: Option<SessionOutcome>,
    pub counters: RunCounters,
}

/// Price summary over stored products that have a price
#[derive(Debug, Clone, PartialEq)]
pub struct PriceStats {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub priced: u64,
}

/// Short view of a stored product
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSummary {
    pub product_id: String,
    pub title: String,
    pub category: String,
    pub price: Option<f64>,
    pub currency: String,
    pub scraped_at: String,
}
