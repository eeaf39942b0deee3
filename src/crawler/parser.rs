//! Outbound link extraction for listing pages
//!
//! Links come from `<a href>` tags and `<link rel="canonical">`. Special
//! schemes, fragment-only anchors and download links are skipped; everything
//! else is resolved against the page URL. Classification happens later.

use lazy_static::lazy_static;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

lazy_static! {
    static ref ANCHOR_SELECTOR: Selector = Selector::parse("a[href]").unwrap();
    static ref CANONICAL_SELECTOR: Selector =
        Selector::parse(r#"link[rel="canonical"][href]"#).unwrap();
}

const SKIPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "whatsapp:"];

/// Extracts absolute outbound links from an HTML page, in document order
///
/// Each resolved URL appears once.
pub fn extract_links(html: &str, page_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let anchors = document
        .select(&ANCHOR_SELECTOR)
        .filter(|element| element.value().attr("download").is_none())
        .filter_map(|element| element.value().attr("href"));
    let canonical = document
        .select(&CANONICAL_SELECTOR)
        .filter_map(|element| element.value().attr("href"));

    for href in anchors.chain(canonical) {
        if let Some(absolute) = resolve_link(href, page_url) {
            if seen.insert(absolute.clone()) {
                links.push(absolute);
            }
        }
    }

    links
}

/// Resolves an href against the page URL
///
/// Returns None for special schemes, fragment-only anchors and anything that
/// does not resolve to http(s).
fn resolve_link(href: &str, page_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme)) {
        return None;
    }

    let absolute = page_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://www.ouedkniss.com/automobiles").unwrap()
    }

    #[test]
    fn test_resolves_relative_links() {
        let html = r#"<html><body>
            <a href="/automobiles/peugeot-208-d12345678">208</a>
            <a href="automobiles/2">Next</a>
        </body></html>"#;
        let links = extract_links(html, &page_url());

        assert_eq!(
            links,
            vec![
                "https://www.ouedkniss.com/automobiles/peugeot-208-d12345678".to_string(),
                "https://www.ouedkniss.com/automobiles/2".to_string(),
            ]
        );
    }

    #[test]
    fn test_keeps_absolute_links_to_other_hosts() {
        let html = r#"<a href="https://facebook.com/ouedkniss">fb</a>"#;
        let links = extract_links(html, &page_url());
        assert_eq!(links, vec!["https://facebook.com/ouedkniss".to_string()]);
    }

    #[test]
    fn test_skips_special_schemes_and_anchors() {
        let html = r##"<html><body>
            <a href="javascript:void(0)">js</a>
            <a href="mailto:contact@ouedkniss.com">mail</a>
            <a href="tel:+213555000000">call</a>
            <a href="WhatsApp:send?phone=213555000000">wa</a>
            <a href="#gallery">jump</a>
            <a href="">empty</a>
        </body></html>"##;
        assert!(extract_links(html, &page_url()).is_empty());
    }

    #[test]
    fn test_skips_download_links() {
        let html = r#"<a href="/catalogue.pdf" download>pdf</a>"#;
        assert!(extract_links(html, &page_url()).is_empty());
    }

    #[test]
    fn test_includes_canonical_link() {
        let html = r#"<html><head>
            <link rel="canonical" href="https://www.ouedkniss.com/automobiles/1" />
        </head><body></body></html>"#;
        let links = extract_links(html, &page_url());
        assert_eq!(links, vec!["https://www.ouedkniss.com/automobiles/1".to_string()]);
    }

    #[test]
    fn test_duplicate_links_reported_once() {
        let html = r#"
            <a href="/automobiles/clio-4-d20000001">photo</a>
            <a href="/automobiles/clio-4-d20000001">title</a>
        "#;
        assert_eq!(extract_links(html, &page_url()).len(), 1);
    }
}
