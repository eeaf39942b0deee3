//! Product page extraction
//!
//! Turns a fetched product page into a [`Product`]. Only the product id, the
//! title and the body itself are required; every other field is read
//! independently and a missing one becomes a [`ParseWarning`].

use super::fields;
use super::price::parse_price;
use super::product::Product;
use super::{Extraction, ExtractionFailure, FailureReason, ParseWarning};
use crate::config::Config;
use crate::crawler::FetchResult;
use crate::url::UrlClassifier;
use crate::UrlError;
use chrono::Utc;
use scraper::Html;
use url::Url;

/// Extracts products from Ouedkniss product pages
#[derive(Debug, Clone)]
pub struct ProductExtractor {
    classifier: UrlClassifier,
    default_currency: String,
}

impl ProductExtractor {
    pub fn new(classifier: UrlClassifier, default_currency: impl Into<String>) -> Self {
        Self {
            classifier,
            default_currency: default_currency.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, UrlError> {
        Ok(Self::new(
            UrlClassifier::from_config(config)?,
            config.scraper.default_currency.clone(),
        ))
    }

    /// Extracts a product from a fetch result
    ///
    /// Never retries: a failed fetch is reported as `NotFetched`.
    pub fn extract(&self, fetched: &FetchResult) -> Result<Extraction, ExtractionFailure> {
        match (&fetched.body, fetched.status.is_ok()) {
            (Some(body), true) => self.extract_html(&fetched.url, body),
            _ if !fetched.status.is_ok() => Err(ExtractionFailure::new(
                &fetched.url,
                FailureReason::NotFetched(fetched.status.clone()),
            )),
            _ => Err(ExtractionFailure::new(&fetched.url, FailureReason::EmptyBody)),
        }
    }

    /// Extracts a product from page HTML
    pub fn extract_html(&self, url: &str, html: &str) -> Result<Extraction, ExtractionFailure> {
        if html.trim().is_empty() {
            return Err(ExtractionFailure::new(url, FailureReason::EmptyBody));
        }

        let product_id = self
            .classifier
            .product_id(url)
            .ok_or_else(|| ExtractionFailure::new(url, FailureReason::MissingProductId))?;

        let document = Html::parse_document(html);

        let title = fields::title(&document)
            .ok_or_else(|| ExtractionFailure::new(url, FailureReason::MissingTitle))?;

        let mut warnings = Vec::new();
        let mut warn = |field: &'static str, message: &str| {
            warnings.push(ParseWarning {
                field,
                message: message.to_string(),
            });
        };

        let (category, subcategories) = {
            let mut path = fields::breadcrumb(&document);
            if path.is_empty() {
                path = self.classifier.category_path(url);
                if path.is_empty() {
                    warn("category", "no breadcrumb and no category in URL");
                } else {
                    warn("category", "no breadcrumb, using URL category");
                }
            }
            let mut path = path.into_iter();
            let category = path.next().unwrap_or_else(|| "Unknown".to_string());
            (category, path.collect::<Vec<_>>())
        };

        let (price, currency, negotiable) = match fields::price_text(&document) {
            Some(text) => {
                let parsed = parse_price(&text);
                if parsed.amount.is_none() {
                    warn("price", &format!("no numeric price in {:?}", text));
                }
                (
                    parsed.amount,
                    parsed.currency.unwrap_or_else(|| self.default_currency.clone()),
                    Some(parsed.negotiable),
                )
            }
            None => {
                warn("price", "no price element");
                (None, self.default_currency.clone(), None)
            }
        };

        let description = fields::description(&document);
        if description.is_none() {
            warn("description", "no description block");
        }

        let specifications = fields::specifications(&document);
        if specifications.is_empty() {
            warn("specifications", "no specification pairs");
        }

        let images = match Url::parse(url) {
            Ok(page_url) => fields::images(&document, &page_url),
            Err(_) => Vec::new(),
        };
        if images.is_empty() {
            warn("images", "no product images");
        }

        let seller = fields::seller(&document);
        if seller.is_none() {
            warn("seller", "no seller block");
        }

        let questions_answers = fields::questions_answers(&document);
        if questions_answers.is_empty() {
            warn("questions_answers", "no questions");
        }

        let views = fields::views(&document);
        if views.is_none() {
            warn("views", "no view counter");
        }

        let product = Product {
            product_id,
            url: url.to_string(),
            title,
            category,
            subcategories,
            price,
            currency,
            negotiable,
            description,
            specifications,
            images,
            seller,
            questions_answers,
            views,
            last_updated: fields::last_updated(&document),
            scraped_at: Utc::now(),
        };

        for warning in &warnings {
            tracing::debug!(url, field = warning.field, "{}", warning.message);
        }

        Ok(Extraction { product, warnings })
    }
}
