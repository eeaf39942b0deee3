//! Path-shape URL classifier
//!
//! Ouedkniss URLs follow a small set of shapes:
//!
//! | Shape | Category |
//! |-------|----------|
//! | `/` | category index (home lists every category) |
//! | `/automobiles`, `/automobiles/1` | category index |
//! | `/automobiles-vehicules/1` | listing (dashed sub-category slug) |
//! | `/automobiles/2`, `/automobiles?page=2` | pagination |
//! | `/…/peugeot-208-alger-d41234567` | product detail |
//!
//! A URL can match several shapes at once (a product nested under a category
//! path, a product with a `page` parameter); the configured precedence picks
//! the winner.

use crate::config::Config;
use crate::url::UrlCategory;
use crate::UrlError;
use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    // Listing slugs end in "-d" followed by the numeric listing id
    static ref SLUG_ID_REGEX: Regex = Regex::new(r"-d(\d+)$").unwrap();

    // Lowercase category slug, optionally dashed for sub-categories
    static ref CATEGORY_SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}

/// Default precedence, highest first
pub const DEFAULT_PRECEDENCE: [UrlCategory; 4] = [
    UrlCategory::ProductDetail,
    UrlCategory::Pagination,
    UrlCategory::CategoryIndex,
    UrlCategory::Listing,
];

/// First path segments that never lead to listings
const IGNORED_PREFIXES: &[&str] = &[
    "login",
    "register",
    "compte",
    "account",
    "aide",
    "help",
    "contact",
    "conditions",
    "store",
    "boutiques",
    "messages",
    "api",
    "static",
];

/// File extensions of assets that are never HTML listings
const ASSET_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "ico", "css", "js", "pdf", "xml", "json", "txt",
];

/// Query parameters that carry a page number
const PAGE_PARAMS: &[&str] = &["page", "p"];

/// Classifies URLs of one target site by path shape
#[derive(Debug, Clone)]
pub struct UrlClassifier {
    /// Base host without a leading "www."
    host: String,
    /// Effective port of the base URL
    port: Option<u16>,
    precedence: Vec<UrlCategory>,
    min_id_digits: usize,
}

impl UrlClassifier {
    /// Creates a classifier for the site rooted at `base_url`
    pub fn new(base_url: &Url) -> Result<Self, UrlError> {
        let host = base_url.host_str().ok_or(UrlError::MissingDomain)?;

        Ok(Self {
            host: strip_www(&host.to_lowercase()).to_string(),
            port: base_url.port_or_known_default(),
            precedence: DEFAULT_PRECEDENCE.to_vec(),
            min_id_digits: 5,
        })
    }

    /// Creates a classifier from the scraper configuration
    pub fn from_config(config: &Config) -> Result<Self, UrlError> {
        let base_url =
            Url::parse(&config.scraper.base_url).map_err(|e| UrlError::Parse(e.to_string()))?;

        let mut classifier =
            Self::new(&base_url)?.with_min_id_digits(config.classifier.min_id_digits);
        if let Some(precedence) = &config.classifier.precedence {
            classifier = classifier.with_precedence(precedence.clone());
        }
        Ok(classifier)
    }

    /// Overrides the precedence used for ambiguous URLs
    ///
    /// Categories missing from `precedence` are appended in default order, so
    /// a partial override never makes a shape unreachable.
    pub fn with_precedence(mut self, precedence: Vec<UrlCategory>) -> Self {
        let mut order: Vec<UrlCategory> = precedence
            .into_iter()
            .filter(|c| *c != UrlCategory::Irrelevant)
            .collect();

        for category in DEFAULT_PRECEDENCE {
            if !order.contains(&category) {
                order.push(category);
            }
        }

        self.precedence = order;
        self
    }

    /// Sets the minimum length of a bare numeric trailing segment treated as an id
    pub fn with_min_id_digits(mut self, digits: usize) -> Self {
        self.min_id_digits = digits.max(1);
        self
    }

    /// Returns the active precedence, highest first
    pub fn precedence(&self) -> &[UrlCategory] {
        &self.precedence
    }

    /// Classifies a raw URL string
    ///
    /// Total: malformed and out-of-domain URLs are `Irrelevant`.
    pub fn classify(&self, url: &str) -> UrlCategory {
        match Url::parse(url.trim()) {
            Ok(parsed) => self.classify_url(&parsed),
            Err(_) => UrlCategory::Irrelevant,
        }
    }

    /// Classifies a parsed URL
    pub fn classify_url(&self, url: &Url) -> UrlCategory {
        if !self.is_in_domain(url) {
            return UrlCategory::Irrelevant;
        }

        let segments = path_segments(url);

        if let Some(first) = segments.first() {
            if IGNORED_PREFIXES.contains(&first.to_lowercase().as_str()) {
                return UrlCategory::Irrelevant;
            }
        }

        if let Some(last) = segments.last() {
            if is_asset(last) {
                return UrlCategory::Irrelevant;
            }
        }

        let matched = self.matching_shapes(url, &segments);

        self.precedence
            .iter()
            .find(|category| matched.contains(category))
            .copied()
            .unwrap_or(UrlCategory::Irrelevant)
    }

    /// Returns true if the URL belongs to the target site
    pub fn is_in_domain(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        let Some(host) = url.host_str() else {
            return false;
        };

        strip_www(&host.to_lowercase()) == self.host && url.port_or_known_default() == self.port
    }

    /// Extracts the product id carried by a product URL's trailing segment
    pub fn product_id(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url.trim()).ok()?;
        let segments = path_segments(&parsed);
        segments
            .last()
            .and_then(|last| trailing_id(last, self.min_id_digits))
    }

    /// Returns the category slug of a URL split into its words
    ///
    /// `/automobiles-vehicules/peugeot-208-d123456` gives
    /// `["automobiles", "vehicules"]`. Root-level URLs have no category path.
    pub fn category_path(&self, url: &str) -> Vec<String> {
        let Ok(parsed) = Url::parse(url.trim()) else {
            return Vec::new();
        };
        let segments = path_segments(&parsed);

        match segments.first() {
            Some(first) if segments.len() >= 2 && CATEGORY_SLUG_REGEX.is_match(first) => {
                first.split('-').map(str::to_string).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Every category whose shape the URL matches, unordered
    fn matching_shapes(&self, url: &Url, segments: &[&str]) -> Vec<UrlCategory> {
        let mut matched = Vec::new();

        if segments.is_empty() {
            if page_param(url).map_or(false, |page| page >= 2) {
                matched.push(UrlCategory::Pagination);
            }
            matched.push(UrlCategory::CategoryIndex);
            return matched;
        }

        let last = segments[segments.len() - 1];

        if trailing_id(last, self.min_id_digits).is_some() {
            matched.push(UrlCategory::ProductDetail);
        }

        let page_in_path = if segments.len() == 2 {
            short_page_number(last, self.min_id_digits)
        } else {
            None
        };

        let page = page_param(url).or(page_in_path);
        if page.map_or(false, |page| page >= 2) {
            matched.push(UrlCategory::Pagination);
        }

        let first = segments[0];
        let category_shape = segments.len() == 1 || page_in_path.is_some();
        if category_shape && CATEGORY_SLUG_REGEX.is_match(first) {
            if first.contains('-') {
                matched.push(UrlCategory::Listing);
            } else {
                matched.push(UrlCategory::CategoryIndex);
            }
        }

        matched
    }
}

/// Extracts a product id from a URL without any domain check
///
/// Used in direct-scrape mode, where URLs are trusted input.
pub fn product_id_from_url(url: &str, min_id_digits: usize) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    path_segments(&parsed)
        .last()
        .and_then(|last| trailing_id(last, min_id_digits))
}

fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Id carried by a trailing segment: a `-d<digits>` slug suffix or a long bare number
fn trailing_id(segment: &str, min_id_digits: usize) -> Option<String> {
    if let Some(captures) = SLUG_ID_REGEX.captures(segment) {
        return Some(captures[1].to_string());
    }

    if segment.len() >= min_id_digits && segment.bytes().all(|b| b.is_ascii_digit()) {
        return Some(segment.to_string());
    }

    None
}

/// Page number carried by a short bare numeric segment
fn short_page_number(segment: &str, min_id_digits: usize) -> Option<u32> {
    if segment.is_empty()
        || segment.len() >= min_id_digits
        || !segment.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    segment.parse().ok()
}

fn page_param(url: &Url) -> Option<u32> {
    url.query_pairs()
        .find(|(key, _)| PAGE_PARAMS.contains(&key.as_ref()))
        .and_then(|(_, value)| value.parse().ok())
}

fn is_asset(segment: &str) -> bool {
    segment
        .rsplit_once('.')
        .map(|(_, ext)| ASSET_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
