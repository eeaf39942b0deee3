//! Site capability interface
//!
//! The crawler and the pipeline only need three things from a target site:
//! how to classify a URL, how to derive a product id from a URL and how to
//! turn a fetched page into a product. [`Ouedkniss`] is the one implementation.

use crate::config::Config;
use crate::crawler::FetchResult;
use crate::extract::{Extraction, ExtractionFailure, ProductExtractor};
use crate::url::{UrlCategory, UrlClassifier};
use crate::UrlError;

/// What the crawl engine needs to know about a target site
pub trait SiteProfile: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Routes a discovered URL
    fn classify(&self, url: &str) -> UrlCategory;

    /// Product id carried by a product URL
    fn product_id(&self, url: &str) -> Option<String>;

    /// Extracts a product from a fetched product page
    fn extract(&self, fetched: &FetchResult) -> Result<Extraction, ExtractionFailure>;
}

/// Ouedkniss classifieds
#[derive(Debug, Clone)]
pub struct Ouedkniss {
    classifier: UrlClassifier,
    extractor: ProductExtractor,
}

impl Ouedkniss {
    pub fn new(classifier: UrlClassifier, default_currency: &str) -> Self {
        Self {
            extractor: ProductExtractor::new(classifier.clone(), default_currency),
            classifier,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, UrlError> {
        Ok(Self::new(
            UrlClassifier::from_config(config)?,
            &config.scraper.default_currency,
        ))
    }

    pub fn classifier(&self) -> &UrlClassifier {
        &self.classifier
    }
}

impl SiteProfile for Ouedkniss {
    fn name(&self) -> &str {
        "ouedkniss"
    }

    fn classify(&self, url: &str) -> UrlCategory {
        self.classifier.classify(url)
    }

    fn product_id(&self, url: &str) -> Option<String> {
        self.classifier.product_id(url)
    }

    fn extract(&self, fetched: &FetchResult) -> Result<Extraction, ExtractionFailure> {
        self.extractor.extract(fetched)
    }
}
