//! Statistics generation from the product database
//!
//! This module extracts product and run statistics from storage and renders
//! them for the `stats` command.

use crate::storage::{PriceStats, ProductSummary, RunRecord, SqliteStorage, StorageResult};
use std::fmt::Write as _;

/// Number of categories listed before the rest are summarized
const TOP_CATEGORIES: usize = 10;

/// Number of recent products shown
const RECENT_PRODUCTS: usize = 5;

/// Product statistics summary
#[derive(Debug, Clone)]
pub struct ProductStatistics {
    /// Total number of stored products
    pub total_products: u64,

    /// Product counts per category, largest first
    pub categories: Vec<(String, u64)>,

    /// Price summary over priced products
    pub prices: Option<PriceStats>,

    /// Most recently scraped products
    pub recent: Vec<ProductSummary>,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
pub fn load_statistics(storage: &SqliteStorage) -> StorageResult<ProductStatistics> {
    Ok(ProductStatistics {
        total_products: storage.count_products()?,
        categories: storage.category_counts()?,
        prices: storage.price_stats()?,
        recent: storage.recent_products(RECENT_PRODUCTS)?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Renders statistics as a plain-text report
pub fn format_statistics(stats: &ProductStatistics) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== Product Statistics ===\n");
    let _ = writeln!(out, "Total products: {}\n", stats.total_products);

    if !stats.categories.is_empty() {
        let _ = writeln!(out, "Products by Category:");
        for (category, count) in stats.categories.iter().take(TOP_CATEGORIES) {
            let percentage = if stats.total_products > 0 {
                (*count as f64 / stats.total_products as f64) * 100.0
            } else {
                0.0
            };
            let _ = writeln!(out, "  {:30} {:>8} ({:.1}%)", category, count, percentage);
        }
        if stats.categories.len() > TOP_CATEGORIES {
            let _ = writeln!(
                out,
                "  ... and {} more categories",
                stats.categories.len() - TOP_CATEGORIES
            );
        }
        let _ = writeln!(out);
    }

    if let Some(prices) = &stats.prices {
        let _ = writeln!(out, "Prices ({} priced products):", prices.priced);
        let _ = writeln!(out, "  Average: {:>15.2}", prices.avg);
        let _ = writeln!(out, "  Minimum: {:>15.2}", prices.min);
        let _ = writeln!(out, "  Maximum: {:>15.2}", prices.max);
        let _ = writeln!(out);
    }

    if !stats.recent.is_empty() {
        let _ = writeln!(out, "Recent Products:");
        for (i, product) in stats.recent.iter().enumerate() {
            let price = match product.price {
                Some(price) => format!("{:.0} {}", price, product.currency),
                None => "N/A".to_string(),
            };
            let _ = writeln!(
                out,
                "  {}. {} [{}] {} ({})",
                i + 1,
                product.title,
                product.category,
                price,
                product.product_id
            );
        }
        let _ = writeln!(out);
    }

    match &stats.latest_run {
        Some(run) => {
            let outcome = run
                .outcome
                .map(|o| o.to_string())
                .unwrap_or_else(|| "unfinished".to_string());
            let _ = writeln!(
                out,
                "Latest run #{} ({}, {}): started {}, {} stored, {} unchanged, {} skipped, {} failures",
                run.id,
                run.mode,
                outcome,
                run.started_at,
                run.counters.products_stored,
                run.counters.products_unchanged,
                run.counters.products_skipped,
                run.counters.failures
            );
        }
        None => {
            let _ = writeln!(out, "No runs recorded yet.");
        }
    }

    out
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &ProductStatistics) {
    print!("{}", format_statistics(stats));
}
