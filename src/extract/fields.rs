//! Field-level readers for product pages
//!
//! Each reader looks at the parsed document independently and returns None
//! (or an empty collection) when its field is absent. None of them fail.

use super::product::{QuestionAnswer, Seller};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashSet};
use url::Url;

lazy_static! {
    static ref TITLED_H1: Selector = Selector::parse(r#"h1[class*="title"], h1[class*="heading"]"#).unwrap();
    static ref ANY_H1: Selector = Selector::parse("h1").unwrap();
    static ref OG_TITLE: Selector = Selector::parse(r#"meta[property="og:title"]"#).unwrap();

    static ref BREADCRUMB_LINKS: Selector = Selector::parse(
        r#"nav[class*="breadcrumb"] a, ol[class*="breadcrumb"] a, ul[class*="breadcrumb"] a"#
    )
    .unwrap();

    static ref PRICE: Selector = Selector::parse(r#"[class*="price"]"#).unwrap();

    static ref DESCRIPTION: Selector =
        Selector::parse(r#"[class*="description"], [id*="description"]"#).unwrap();

    static ref SPEC_CONTAINERS: Selector = Selector::parse(
        r#"[class*="spec"], [class*="detail"], [class*="caracteristique"], [class*="caractéristique"]"#
    )
    .unwrap();
    static ref SPEC_ROWS: Selector = Selector::parse("tr, li, div").unwrap();
    static ref SPEC_LABEL: Selector =
        Selector::parse(r#"[class*="label"], [class*="key"], th, dt"#).unwrap();
    static ref SPEC_VALUE: Selector = Selector::parse(r#"[class*="value"], td, dd"#).unwrap();

    static ref GALLERY: Selector = Selector::parse(
        r#"[class*="gallery"], [class*="slider"], [class*="images"], [class*="photos"]"#
    )
    .unwrap();
    static ref IMG: Selector = Selector::parse("img").unwrap();

    static ref SELLER: Selector = Selector::parse(
        r#"[class*="seller"], [class*="vendor"], [class*="author"], [class*="store"]"#
    )
    .unwrap();
    static ref SELLER_NAME: Selector = Selector::parse(r#"[class*="name"], [class*="title"]"#).unwrap();
    static ref SELLER_ADDRESS: Selector = Selector::parse(
        r#"[class*="location"], [class*="address"], [class*="ville"], [class*="city"]"#
    )
    .unwrap();
    static ref TEL_LINK: Selector = Selector::parse(r#"a[href^="tel:"]"#).unwrap();

    static ref QA_CONTAINER: Selector = Selector::parse(
        r#"[class*="questions"], [class*="qna"], [class*="faq"]"#
    )
    .unwrap();
    static ref QA_ITEM: Selector = Selector::parse(r#"li, [class*="item"]"#).unwrap();
    static ref QA_QUESTION: Selector = Selector::parse(r#"[class*="question"]"#).unwrap();
    static ref QA_ANSWER: Selector =
        Selector::parse(r#"[class*="answer"], [class*="response"], [class*="reponse"]"#).unwrap();

    static ref UPDATED: Selector =
        Selector::parse(r#"[class*="updated"], [class*="date"], time"#).unwrap();

    /// Site chrome, matched as a whole path word
    static ref IGNORED_IMAGE_REGEX: Regex =
        Regex::new(r"(?i)(?:^|[/_.\-])(?:logo|icon|favicon|avatar|placeholder)s?(?:[/_.\-]|$)").unwrap();
    static ref PHONE_REGEX: Regex = Regex::new(r"\+?\d[\d .-]{7,}\d").unwrap();
    static ref EMAIL_REGEX: Regex = Regex::new(r"[\w.+-]+@[\w-]+(\.[\w-]+)+").unwrap();
    static ref VIEWS_REGEX: Regex = Regex::new(r"(?i)\b(\d{1,3}(?:[ .,\u{a0}\u{202f}]\d{3})+|\d+)\s*(vues?|views?)\b").unwrap();
}

/// Text of an element with whitespace collapsed
pub fn clean_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Listing title: a titled `<h1>`, any `<h1>`, then `og:title`
pub fn title(document: &Html) -> Option<String> {
    document
        .select(&TITLED_H1)
        .chain(document.select(&ANY_H1))
        .map(clean_text)
        .find(|text| !text.is_empty())
        .or_else(|| {
            document
                .select(&OG_TITLE)
                .filter_map(|meta| meta.value().attr("content"))
                .map(|content| content.trim().to_string())
                .find(|content| !content.is_empty())
        })
}

/// Breadcrumb entries after the home link
pub fn breadcrumb(document: &Html) -> Vec<String> {
    document
        .select(&BREADCRUMB_LINKS)
        .skip(1)
        .map(clean_text)
        .filter(|text| !text.is_empty())
        .collect()
}

/// Text of the first price element
pub fn price_text(document: &Html) -> Option<String> {
    document
        .select(&PRICE)
        .map(clean_text)
        .find(|text| !text.is_empty())
}

/// Description text, one line per text block
pub fn description(document: &Html) -> Option<String> {
    let element = document.select(&DESCRIPTION).next()?;

    let lines: Vec<String> = element
        .descendants()
        .filter(|node| {
            let in_code = node
                .parent()
                .and_then(|parent| parent.value().as_element().map(|e| e.name()))
                .map_or(false, |name| name == "script" || name == "style");
            !in_code
        })
        .filter_map(|node| node.value().as_text().map(|text| text.trim().to_string()))
        .filter(|line| !line.is_empty())
        .collect();

    non_empty(lines.join("\n"))
}

/// Label/value pairs from specification containers
///
/// Only the innermost matching containers are read, so a page-level
/// `product-detail` wrapper does not swallow unrelated blocks.
pub fn specifications(document: &Html) -> BTreeMap<String, String> {
    let mut specs = BTreeMap::new();

    let containers = document
        .select(&SPEC_CONTAINERS)
        .filter(|container| container.select(&SPEC_CONTAINERS).next().is_none());

    for container in containers {
        for row in container.select(&SPEC_ROWS) {
            let labels: Vec<_> = row.select(&SPEC_LABEL).collect();

            if labels.len() == 1 {
                if let Some(value) = row.select(&SPEC_VALUE).next() {
                    let key = clean_text(labels[0]).trim_end_matches(':').trim().to_string();
                    let value = clean_text(value);
                    if !key.is_empty() && !value.is_empty() {
                        specs.insert(key, value);
                    }
                }
                continue;
            }

            let is_leaf = labels.is_empty() && row.select(&SPEC_ROWS).next().is_none();
            if is_leaf {
                let text = clean_text(row);
                if let Some((key, value)) = text.split_once(':') {
                    let (key, value) = (key.trim(), value.trim());
                    if !key.is_empty() && !value.is_empty() {
                        specs.insert(key.to_string(), value.to_string());
                    }
                }
            }
        }
    }

    specs
}

/// Product image URLs, absolute and de-duplicated in page order
///
/// Reads the gallery container when there is one, every `<img>` otherwise.
pub fn images(document: &Html, page_url: &Url) -> Vec<String> {
    let candidates: Vec<ElementRef<'_>> = match document.select(&GALLERY).next() {
        Some(gallery) => gallery.select(&IMG).collect(),
        None => document.select(&IMG).collect(),
    };

    let mut seen = HashSet::new();
    let mut images = Vec::new();

    for img in candidates {
        let attrs = img.value();
        let source = ["src", "data-src", "data-lazy"]
            .iter()
            .filter_map(|name| attrs.attr(name))
            .map(str::trim)
            .find(|src| !src.is_empty() && !src.starts_with("data:"));

        let Some(source) = source else { continue };
        if IGNORED_IMAGE_REGEX.is_match(source) {
            continue;
        }

        if let Ok(absolute) = page_url.join(source) {
            let absolute = absolute.to_string();
            if seen.insert(absolute.clone()) {
                images.push(absolute);
            }
        }
    }

    images
}

/// Seller block; None when there is no seller container or it carries nothing
pub fn seller(document: &Html) -> Option<Seller> {
    let container = document.select(&SELLER).next()?;
    let text = clean_text(container);

    let phone = container
        .select(&TEL_LINK)
        .filter_map(|link| link.value().attr("href"))
        .map(|href| href.trim_start_matches("tel:").to_string())
        .next()
        .or_else(|| PHONE_REGEX.find(&text).map(|m| m.as_str().to_string()))
        .map(|raw| raw.chars().filter(|c| c.is_ascii_digit() || *c == '+').collect());

    let seller = Seller {
        name: container.select(&SELLER_NAME).map(clean_text).find(|t| !t.is_empty()),
        phone,
        email: EMAIL_REGEX.find(&text).map(|m| m.as_str().to_string()),
        address: container
            .select(&SELLER_ADDRESS)
            .map(clean_text)
            .find(|t| !t.is_empty()),
    };

    if seller.is_empty() {
        None
    } else {
        Some(seller)
    }
}

/// Question/answer pairs from the questions block
pub fn questions_answers(document: &Html) -> Vec<QuestionAnswer> {
    let Some(container) = document.select(&QA_CONTAINER).next() else {
        return Vec::new();
    };

    container
        .select(&QA_ITEM)
        .filter_map(|item| {
            let question = item.select(&QA_QUESTION).next().map(clean_text)?;
            if question.is_empty() {
                return None;
            }
            let answer = item
                .select(&QA_ANSWER)
                .next()
                .map(clean_text)
                .and_then(non_empty);
            Some(QuestionAnswer { question, answer })
        })
        .collect()
}

/// View counter from `N vues` / `N views`
///
/// Text nodes are scanned one at a time so neighbouring numbers (a year, a
/// mileage) cannot merge into the counter; the flattened page text is the
/// fallback for counters split across elements.
pub fn views(document: &Html) -> Option<u64> {
    document
        .root_element()
        .text()
        .find_map(parse_views)
        .or_else(|| parse_views(&clean_text(document.root_element())))
}

fn parse_views(text: &str) -> Option<u64> {
    let captures = VIEWS_REGEX.captures(text)?;
    let digits: String = captures[1].chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Date shown on the listing, verbatim
pub fn last_updated(document: &Html) -> Option<String> {
    document
        .select(&UPDATED)
        .map(clean_text)
        .find(|text| !text.is_empty())
}
