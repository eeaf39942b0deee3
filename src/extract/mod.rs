//! Product extraction
//!
//! # Components
//!
//! - `ProductExtractor`: page → [`Extraction`] or [`ExtractionFailure`]
//! - `fields`: independent readers for each product field
//! - `price`: price text parsing
//! - `Product`: the extracted record

mod extractor;
mod fields;
mod price;
mod product;

pub use extractor::ProductExtractor;
pub use price::{parse_price, ParsedPrice};
pub use product::{Product, QuestionAnswer, Seller};

use crate::crawler::FetchStatus;
use thiserror::Error;

/// A field that could not be read; the product is still produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub field: &'static str,
    pub message: String,
}

/// Successful extraction
#[derive(Debug, Clone)]
pub struct Extraction {
    pub product: Product,
    pub warnings: Vec<ParseWarning>,
}

/// Why a page produced no product
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("no product id in URL")]
    MissingProductId,

    #[error("no title on page")]
    MissingTitle,

    #[error("empty body")]
    EmptyBody,

    #[error("page not fetched: {0}")]
    NotFetched(FetchStatus),
}

/// A page skipped by the extractor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} ({url})")]
pub struct ExtractionFailure {
    pub url: String,
    pub reason: FailureReason,
}

impl ExtractionFailure {
    pub fn new(url: &str, reason: FailureReason) -> Self {
        Self {
            url: url.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
pub(crate) use product::tests::sample_product;
