use crate::UrlError;
use url::Url;

/// Tracking query parameters dropped during normalization
const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "mc_eid",
    "ref",
    "source",
    "_ga",
    "yclid",
];

/// Normalizes a URL so equivalent spellings collapse to one frontier key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Lowercase the host
/// 3. Normalize path:
///    - Remove dot segments (. and ..) and empty segments
///    - Remove trailing slash (except for root /)
/// 4. Remove fragment (everything after #)
/// 5. Remove tracking query parameters (`utm_*`, `fbclid`, ...)
/// 6. Sort remaining query parameters by key
/// 7. Remove empty query string (trailing ?)
///
/// # Examples
///
/// ```
/// use ouedkniss_scraper::url::normalize_url;
///
/// let url = normalize_url("https://WWW.OUEDKNISS.COM/automobiles/?utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://www.ouedkniss.com/automobiles");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?.to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Normalizes a URL and returns it as the string key used for deduplication
///
/// Unlike [`normalize_url`], the key also drops a leading `www.` so both
/// spellings of a host share one key.
pub fn normalize_key(url_str: &str) -> Result<String, UrlError> {
    let mut url = normalize_url(url_str)?;

    let bare = url.host_str().and_then(|host| host.strip_prefix("www.")).map(str::to_string);
    if let Some(bare) = bare {
        url.set_host(Some(&bare))
            .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
    }

    Ok(url.into())
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
