//! Product record produced by the extractor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A classified listing extracted from a product page
///
/// `product_id` is derived from the URL and is the natural key for dedup and
/// upsert. Records are never mutated after extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub url: String,
    pub title: String,

    /// Main category (first breadcrumb entry or URL category slug)
    pub category: String,
    pub subcategories: Vec<String>,

    /// Asking price; None when absent or not numeric
    pub price: Option<f64>,
    pub currency: String,

    /// None when the page shows no price element at all
    pub negotiable: Option<bool>,

    pub description: Option<String>,
    pub specifications: BTreeMap<String, String>,

    /// Absolute image URLs in page order
    pub images: Vec<String>,
    pub seller: Option<Seller>,
    pub questions_answers: Vec<QuestionAnswer>,
    pub views: Option<u64>,

    /// Date shown on the listing, verbatim
    pub last_updated: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

/// Seller block of a listing; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seller {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

impl Seller {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone.is_none() && self.email.is_none() && self.address.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: Option<String>,
}

/// Fields that change between visits without the listing changing
const VOLATILE_FIELDS: &[&str] = &["scraped_at", "views"];

impl Product {
    /// SHA-256 hex digest over the listing content
    ///
    /// `scraped_at` and the view counter are left out: two scrapes of an
    /// unchanged listing produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(fields) = value.as_object_mut() {
            for volatile in VOLATILE_FIELDS {
                fields.remove(*volatile);
            }
        }

        let mut hasher = Sha256::new();
        hasher.update(value.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn sample_product(product_id: &str) -> Product {
        let mut specifications = BTreeMap::new();
        specifications.insert("Kilométrage".to_string(), "85 000 km".to_string());

        Product {
            product_id: product_id.to_string(),
            url: format!("https://www.ouedkniss.com/automobiles/peugeot-208-d{}", product_id),
            title: "Peugeot 208 Active".to_string(),
            category: "Automobiles".to_string(),
            subcategories: vec!["Voitures".to_string()],
            price: Some(2_450_000.0),
            currency: "DZD".to_string(),
            negotiable: Some(true),
            description: Some("Première main".to_string()),
            specifications,
            images: vec!["https://cdn.ouedkniss.com/208/1.jpg".to_string()],
            seller: Some(Seller {
                name: Some("Auto Alger".to_string()),
                phone: Some("0555123456".to_string()),
                email: None,
                address: Some("Alger, Bab Ezzouar".to_string()),
            }),
            questions_answers: vec![QuestionAnswer {
                question: "Toujours disponible ?".to_string(),
                answer: Some("Oui".to_string()),
            }],
            views: Some(1520),
            last_updated: Some("12/05/2024".to_string()),
            scraped_at: Utc.with_ymd_and_hms(2024, 5, 12, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_fingerprint_ignores_scrape_time() {
        let first = sample_product("12345678");
        let mut second = first.clone();
        second.scraped_at = Utc::now();

        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_view_counter() {
        let first = sample_product("12345678");
        let mut second = first.clone();
        second.views = Some(first.views.unwrap_or(0) + 57);

        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let first = sample_product("12345678");
        let mut second = first.clone();
        second.price = Some(2_300_000.0);

        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_json_roundtrip() {
        let product = sample_product("12345678");
        let json = serde_json::to_string(&product).unwrap();
        let decoded: Product = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, product);
    }

    #[test]
    fn test_empty_seller() {
        assert!(Seller::default().is_empty());
        assert!(!Seller {
            phone: Some("0555123456".to_string()),
            ..Seller::default()
        }
        .is_empty());
    }
}
