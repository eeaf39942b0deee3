//! Price text parsing
//!
//! Listing prices come as free text: `85 000 DZD`, `1.250.000 DA`,
//! `دج 45000`, `12 500,50 €`, `Prix non précisé`, `2 000 000 DA Négociable`.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// First run of digits with thousands/decimal separators
    static ref AMOUNT_REGEX: Regex = Regex::new(r"\d[\d\s\u{a0}\u{202f}.,]*").unwrap();
    static ref CURRENCY_REGEX: Regex =
        Regex::new(r"(?i)(\bDZD\b|\bDA\b|دج|\bEUR\b|€|\bUSD\b|\$)").unwrap();
}

const NEGOTIABLE_MARKERS: &[&str] = &["négociable", "negociable", "negotiable", "à débattre", "offert"];

/// Parsed pieces of a price text
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPrice {
    pub amount: Option<f64>,
    /// ISO code if the text carried a currency marker
    pub currency: Option<String>,
    pub negotiable: bool,
}

/// Parses a price text
///
/// Never fails: a text without a usable number yields `amount: None`.
pub fn parse_price(text: &str) -> ParsedPrice {
    let lowered = text.to_lowercase();
    let negotiable = NEGOTIABLE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker));

    let currency = CURRENCY_REGEX
        .find(text)
        .map(|m| currency_code(m.as_str()).to_string());

    let amount = AMOUNT_REGEX
        .find(text)
        .and_then(|m| parse_amount(m.as_str()));

    ParsedPrice {
        amount,
        currency,
        negotiable,
    }
}

fn currency_code(marker: &str) -> &'static str {
    match marker.to_uppercase().as_str() {
        "EUR" | "€" => "EUR",
        "USD" | "$" => "USD",
        _ => "DZD",
    }
}

/// Interprets a digit run with mixed separators
///
/// Spaces always group thousands. A `.` or `,` is decimal only when it occurs
/// once (or last, after the other kind) and is followed by one or two digits.
fn parse_amount(raw: &str) -> Option<f64> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .collect();
    let compact = compact.trim_end_matches(|c| c == '.' || c == ',');

    let last_separator = compact.rfind(|c| c == '.' || c == ',');
    let normalized = match last_separator {
        None => compact.to_string(),
        Some(index) => {
            let separator = compact[index..].chars().next()?;
            let fraction_len = compact.len() - index - 1;
            let occurrences = compact.matches(separator).count();
            let is_decimal = occurrences == 1 && (1..=2).contains(&fraction_len);

            if is_decimal {
                let integer: String = compact[..index]
                    .chars()
                    .filter(|c| c.is_ascii_digit())
                    .collect();
                format!("{}.{}", integer, &compact[index + 1..])
            } else {
                compact.chars().filter(|c| c.is_ascii_digit()).collect()
            }
        }
    };

    normalized.parse::<f64>().ok()
}
