//! Output module for reporting
//!
//! This module handles:
//! - Product and run statistics for the `stats` command
//! - The end-of-session summary

pub mod stats;

pub use stats::{format_statistics, load_statistics, print_statistics, ProductStatistics};

use crate::pipeline::PipelineReport;

/// Prints the summary of a finished pipeline session
pub fn print_session_summary(report: &PipelineReport) {
    println!("=== Session Summary ===\n");
    println!("Outcome: {}", report.outcome);

    if let Some(crawl) = &report.crawl {
        println!(
            "Pages: {} visited, {} failed, {} URLs discovered",
            crawl.pages_visited, crawl.pages_failed, crawl.urls_discovered
        );
        println!("Products found: {}", crawl.products_emitted);
    }

    println!("Products stored: {}", report.forwarded);
    println!("Unchanged: {}", report.unchanged);
    println!("Skipped (already stored): {}", report.skipped_existing);
    println!("Duplicates: {}", report.duplicates);
    println!("Parse warnings: {}", report.warnings);

    if !report.failures.is_empty() {
        println!("\nFailures ({}):", report.failures.len());
        for failure in report.failures.iter().take(20) {
            println!("  - {}: {}", failure.url, failure.reason);
        }
        if report.failures.len() > 20 {
            println!("  ... and {} more", report.failures.len() - 20);
        }
    }
}
