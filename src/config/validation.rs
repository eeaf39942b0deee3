use crate::config::types::{ClassifierConfig, Config, CrawlConfig, OutputConfig, ScraperConfig};
use crate::url::UrlCategory;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scraper_config(&config.scraper)?;
    validate_crawl_config(&config.crawl)?;
    validate_classifier_config(&config.classifier)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates HTTP behavior settings
fn validate_scraper_config(config: &ScraperConfig) -> Result<(), ConfigError> {
    validate_http_url(&config.base_url, "base_url")?;

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_requests must be between 1 and 100, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.backoff_max_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_max_ms ({}) must be >= backoff_base_ms ({})",
            config.backoff_max_ms, config.backoff_base_ms
        )));
    }

    if config.default_currency.trim().is_empty() {
        return Err(ConfigError::Validation(
            "default_currency cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawl limits and seeds
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    if config.max_products == Some(0) {
        return Err(ConfigError::Validation(
            "max_products must be >= 1 when set".to_string(),
        ));
    }

    for seed in &config.seeds {
        validate_http_url(seed, "seed")?;
    }

    Ok(())
}

/// Validates the classifier precedence override
fn validate_classifier_config(config: &ClassifierConfig) -> Result<(), ConfigError> {
    if config.min_id_digits == 0 {
        return Err(ConfigError::Validation(
            "min_id_digits must be >= 1".to_string(),
        ));
    }

    if let Some(precedence) = &config.precedence {
        if precedence.contains(&UrlCategory::Irrelevant) {
            return Err(ConfigError::Validation(
                "precedence cannot rank 'irrelevant'; it is always the fallback".to_string(),
            ));
        }

        for (i, category) in precedence.iter().enumerate() {
            if precedence[i + 1..].contains(category) {
                return Err(ConfigError::Validation(format!(
                    "precedence lists '{}' more than once",
                    category
                )));
            }
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates that a string is an absolute HTTP(S) URL with a host
fn validate_http_url(value: &str, field: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use HTTP or HTTPS",
            field, value
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' has no host",
            field, value
        )));
    }

    Ok(())
}
