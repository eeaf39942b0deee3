//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler and the pipeline:
//! - Building the HTTP client from configuration
//! - A global concurrency ceiling (semaphore)
//! - A minimum delay between dispatches, enforced as a slot reservation
//! - Retry with exponential backoff and jitter for transient failures
//! - Error classification into [`FetchStatus`]

use crate::config::ScraperConfig;
use rand::Rng;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

/// Outcome of the last attempt of a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// 2xx response with a readable body
    Ok,

    /// Non-success HTTP status
    HttpError(u16),

    /// Connection, TLS or body read failure
    NetworkError(String),

    /// The request exceeded the configured timeout
    Timeout,
}

impl FetchStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true if another attempt may succeed
    ///
    /// Network errors, timeouts, 429 and 5xx are transient. Every other HTTP
    /// error is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Ok => false,
            Self::HttpError(code) => *code == 429 || (500..600).contains(code),
            Self::NetworkError(_) | Self::Timeout => true,
        }
    }
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::HttpError(code) => write!(f, "http {}", code),
            Self::NetworkError(error) => write!(f, "network error: {}", error),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Result of a fetch, after all attempts
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The URL that was requested
    pub url: String,

    /// Status of the final attempt
    pub status: FetchStatus,

    /// Response body, present only when `status` is `Ok`
    pub body: Option<String>,

    /// Wall time from the first dispatch to the final response, backoff included
    pub elapsed: Duration,

    /// Number of attempts made (at least 1)
    pub attempts: u32,

    /// Backoff delays applied between attempts, in order
    pub backoff_delays: Vec<Duration>,
}

impl FetchResult {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

/// Exponential backoff parameters
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: Duration::from_millis(config.backoff_base_ms),
            cap: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Delay before retry number `retry` (0-based)
    ///
    /// `min(base * 2^retry + jitter, cap)` with jitter in `[0, base * 2^retry / 5]`.
    /// A `Retry-After` hint raises the delay but never past the cap.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let cap_ms = self.cap.as_millis() as u64;

        let exponential = base_ms.saturating_mul(1u64 << retry.min(32));
        let max_jitter = exponential / 5;
        let jitter = if max_jitter > 0 {
            rand::thread_rng().gen_range(0..=max_jitter)
        } else {
            0
        };

        let mut delay_ms = exponential.saturating_add(jitter);
        if let Some(hint) = retry_after {
            delay_ms = delay_ms.max(hint.as_millis() as u64);
        }

        Duration::from_millis(delay_ms.min(cap_ms))
    }
}

/// Builds an HTTP client with proper configuration
pub fn build_http_client(config: &ScraperConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.request_timeout_secs.min(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Concurrency-bounded, rate-limited HTTP fetcher
///
/// One fetcher is shared by the crawler and the pipeline so that the
/// concurrency ceiling and the dispatch delay bound all HTTP traffic of a
/// session.
pub struct Fetcher {
    client: Client,
    permits: Arc<Semaphore>,
    concurrency: usize,
    delay: Duration,
    /// Most recently reserved dispatch slot
    last_slot: Mutex<Option<Instant>>,
    retry: RetryPolicy,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    total_attempts: AtomicU64,
}

impl Fetcher {
    /// Creates a fetcher from the scraper configuration
    pub fn new(config: &ScraperConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config)?;
        Ok(Self::with_client(client, config))
    }

    /// Creates a fetcher around an existing client
    pub fn with_client(client: Client, config: &ScraperConfig) -> Self {
        let concurrency = config.max_concurrent_requests.max(1) as usize;
        Self {
            client,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            delay: Duration::from_millis(config.rate_limit_delay_ms),
            last_slot: Mutex::new(None),
            retry: RetryPolicy::from_config(config),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            total_attempts: AtomicU64::new(0),
        }
    }

    /// Maximum number of requests in flight at once
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Requests currently in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of requests observed in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Attempts made across all fetches
    pub fn total_attempts(&self) -> u64 {
        self.total_attempts.load(Ordering::SeqCst)
    }

    /// Fetches a URL, retrying transient failures
    ///
    /// Never returns an error: exhausting retries yields the failed result of
    /// the last attempt.
    pub async fn fetch(&self, url: &str) -> FetchResult {
        let started = Instant::now();
        let mut backoff_delays = Vec::new();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let (status, body, retry_after) = self.attempt(url).await;

            tracing::debug!(url, attempt = attempts, status = %status, "Fetch attempt finished");

            let retries_used = attempts - 1;
            if status.is_ok() || !status.is_retryable() || retries_used >= self.retry.max_retries
            {
                if !status.is_ok() {
                    tracing::warn!(url, attempts, status = %status, "Fetch failed");
                }
                return FetchResult {
                    url: url.to_string(),
                    status,
                    body,
                    elapsed: started.elapsed(),
                    attempts,
                    backoff_delays,
                };
            }

            let delay = self.retry.delay_for(retries_used, retry_after);
            tracing::info!(
                url,
                attempt = attempts,
                status = %status,
                delay_ms = delay.as_millis() as u64,
                "Retrying after backoff"
            );
            backoff_delays.push(delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// Performs a single attempt under a concurrency permit and a dispatch slot
    async fn attempt(&self, url: &str) -> (FetchStatus, Option<String>, Option<Duration>) {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return (FetchStatus::NetworkError("fetcher closed".to_string()), None, None),
        };

        self.wait_for_slot().await;

        let (_in_flight, current) = InFlight::enter(&self.in_flight);
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        self.total_attempts.fetch_add(1, Ordering::SeqCst);

        self.send(url).await
    }

    /// Reserves the next dispatch slot and sleeps until it opens
    async fn wait_for_slot(&self) {
        if self.delay.is_zero() {
            return;
        }

        let slot = {
            let mut last = self.last_slot.lock().await;
            let now = Instant::now();
            let slot = match *last {
                Some(previous) => (previous + self.delay).max(now),
                None => now,
            };
            *last = Some(slot);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }

    async fn send(&self, url: &str) -> (FetchStatus, Option<String>, Option<Duration>) {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return (classify_error(&e), None, None),
        };

        let status = response.status();
        if !status.is_success() {
            let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
                response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs)
            } else {
                None
            };
            return (FetchStatus::HttpError(status.as_u16()), None, retry_after);
        }

        match response.text().await {
            Ok(body) => (FetchStatus::Ok, Some(body), None),
            Err(e) => (classify_error(&e), None, None),
        }
    }
}

/// Counts one request in flight until dropped, including on cancellation
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> (Self, usize) {
        let current = counter.fetch_add(1, Ordering::SeqCst) + 1;
        (Self(counter), current)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn classify_error(error: &reqwest::Error) -> FetchStatus {
    if error.is_timeout() {
        FetchStatus::Timeout
    } else if error.is_connect() {
        FetchStatus::NetworkError(format!("connection failed: {}", error))
    } else {
        FetchStatus::NetworkError(error.to_string())
    }
}
