//! URL handling module
//!
//! This module provides URL normalization (the frontier's dedup key) and the
//! path-shape classifier that routes discovered links through the crawl.

mod classify;
mod normalize;

use serde::Deserialize;
use std::fmt;

// Re-export main functions
pub use classify::{product_id_from_url, UrlClassifier, DEFAULT_PRECEDENCE};
pub use normalize::{normalize_key, normalize_url};

/// Semantic category of a URL, used for crawl routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UrlCategory {
    /// Sub-category listing of products
    Listing,
    /// Top-level category page or the site root
    CategoryIndex,
    /// Second and later pages of a category or listing
    Pagination,
    /// A single product page
    ProductDetail,
    /// Anything the crawler should not follow
    Irrelevant,
}

impl UrlCategory {
    /// Returns true if pages of this category should be fetched for links
    pub fn is_crawlable(&self) -> bool {
        matches!(self, Self::Listing | Self::CategoryIndex | Self::Pagination)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::CategoryIndex => "category-index",
            Self::Pagination => "pagination",
            Self::ProductDetail => "product-detail",
            Self::Irrelevant => "irrelevant",
        }
    }
}

impl fmt::Display for UrlCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_crawlable() {
        assert!(UrlCategory::Listing.is_crawlable());
        assert!(UrlCategory::CategoryIndex.is_crawlable());
        assert!(UrlCategory::Pagination.is_crawlable());
        assert!(!UrlCategory::ProductDetail.is_crawlable());
        assert!(!UrlCategory::Irrelevant.is_crawlable());
    }

    #[test]
    fn test_display() {
        assert_eq!(UrlCategory::ProductDetail.to_string(), "product-detail");
        assert_eq!(UrlCategory::CategoryIndex.to_string(), "category-index");
    }
}
