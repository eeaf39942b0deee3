//! Crawl session: frontier + classifier + fetcher
//!
//! A session starts from seed URLs, fetches listing pages in batches of at
//! most C (the fetcher's concurrency), routes every outbound link through the
//! site classifier and emits product-detail URLs on a channel. It ends
//! `Completed` when the frontier runs dry, or `StoppedByLimit` when a page or
//! product limit is hit or the stop signal is raised.

use crate::crawler::parser::extract_links;
use crate::crawler::{FetchResult, Fetcher, Frontier, UrlRecord};
use crate::site::SiteProfile;
use crate::state::{SessionOutcome, SessionState, UrlState};
use crate::url::{normalize_key, normalize_url, UrlCategory};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use url::Url;

/// Summary of a finished crawl session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub outcome: SessionOutcome,
    /// Listing pages fetched, failed ones included
    pub pages_visited: u32,
    pub pages_failed: u32,
    pub products_emitted: u32,
    /// Distinct crawlable URLs discovered
    pub urls_discovered: usize,
}

/// Discovers product-detail URLs starting from seed pages
pub struct Crawler {
    fetcher: Arc<Fetcher>,
    site: Arc<dyn SiteProfile>,
    frontier: Frontier,
    max_pages: Option<u32>,
    max_products: Option<u32>,
    stop: Arc<AtomicBool>,
    state: SessionState,
    /// Product keys already emitted this session
    emitted: HashSet<String>,
    pages_visited: u32,
    pages_failed: u32,
}

impl Crawler {
    pub fn new(fetcher: Arc<Fetcher>, site: Arc<dyn SiteProfile>) -> Self {
        Self {
            fetcher,
            site,
            frontier: Frontier::new(),
            max_pages: None,
            max_products: None,
            stop: Arc::new(AtomicBool::new(false)),
            state: SessionState::Idle,
            emitted: HashSet::new(),
            pages_visited: 0,
            pages_failed: 0,
        }
    }

    /// Stops after this many listing pages have been fetched
    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Stops after this many product URLs have been emitted
    pub fn with_max_products(mut self, max_products: Option<u32>) -> Self {
        self.max_products = max_products;
        self
    }

    /// Shares an external stop signal
    pub fn with_stop_signal(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Handle that stops the session cooperatively when set
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    fn products_emitted(&self) -> u32 {
        self.emitted.len() as u32
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn product_limit_reached(&self) -> bool {
        self.max_products
            .map_or(false, |max| self.products_emitted() >= max)
    }

    /// Returns a description of the first limit that is reached, if any
    fn limit_reached(&self) -> Option<&'static str> {
        if self.stop_requested() {
            Some("stop requested")
        } else if self.max_pages.map_or(false, |max| self.pages_visited >= max) {
            Some("page limit reached")
        } else if self.product_limit_reached() {
            Some("product limit reached")
        } else {
            None
        }
    }

    /// Runs the session until completion or a limit
    ///
    /// Product-detail URLs are sent on `emit`; a closed receiver stops the
    /// crawl. Fetch failures are recorded and never end the session.
    pub async fn run(&mut self, seeds: &[String], emit: mpsc::Sender<String>) -> CrawlReport {
        let started = Instant::now();
        self.state = SessionState::Running;
        tracing::info!(site = self.site.name(), seeds = seeds.len(), "Starting crawl session");

        for seed in seeds {
            if self.site.classify(seed) == UrlCategory::Irrelevant {
                tracing::warn!(seed = %seed, "Seed URL is not crawlable, skipping");
                continue;
            }
            self.route_link(seed, &emit).await;
        }

        let concurrency = self.fetcher.concurrency();

        let outcome = loop {
            if let Some(reason) = self.limit_reached() {
                tracing::info!(reason, "Stopping crawl");
                break SessionOutcome::StoppedByLimit;
            }

            if !self.frontier.has_pending() {
                tracing::info!("Frontier exhausted, crawl complete");
                break SessionOutcome::Completed;
            }

            let budget = match self.max_pages {
                Some(max) => (max - self.pages_visited) as usize,
                None => concurrency,
            };
            let batch = self.frontier.next_batch(concurrency.min(budget));
            if batch.is_empty() {
                break SessionOutcome::Completed;
            }

            tracing::debug!(size = batch.len(), "Dispatching batch");

            let visited_before = self.pages_visited;

            // The whole batch drains before limits are checked again
            let results = join_all(batch.iter().map(|record| self.fetcher.fetch(&record.url))).await;

            for (record, result) in batch.into_iter().zip(results) {
                self.process_page(record, result, &emit).await;
            }

            if visited_before / 10 != self.pages_visited / 10 {
                tracing::info!(
                    "Progress: {} pages visited, {} products found, {} URLs known",
                    self.pages_visited,
                    self.products_emitted(),
                    self.frontier.len()
                );
            }
        };

        self.state = SessionState::Finished(outcome);

        let report = CrawlReport {
            outcome,
            pages_visited: self.pages_visited,
            pages_failed: self.pages_failed,
            products_emitted: self.products_emitted(),
            urls_discovered: self.frontier.len(),
        };

        tracing::info!(
            outcome = %report.outcome,
            pages = report.pages_visited,
            failed = report.pages_failed,
            products = report.products_emitted,
            "Crawl finished in {:?}",
            started.elapsed()
        );

        report
    }

    async fn process_page(
        &mut self,
        record: UrlRecord,
        result: FetchResult,
        emit: &mpsc::Sender<String>,
    ) {
        self.pages_visited += 1;
        self.frontier.record_attempts(&record.url, result.attempts);

        let body = match (&result.body, result.is_ok()) {
            (Some(body), true) => body,
            _ => {
                self.pages_failed += 1;
                tracing::warn!(url = %record.url, status = %result.status, "Listing page failed");
                self.mark(&record.url, UrlState::Failed);
                return;
            }
        };

        let links = match Url::parse(&record.url) {
            Ok(page_url) => extract_links(body, &page_url),
            Err(_) => Vec::new(),
        };
        self.mark(&record.url, UrlState::Done);

        tracing::debug!(url = %record.url, category = %record.category, links = links.len(), "Page processed");

        for link in links {
            self.route_link(&link, emit).await;
        }
    }

    fn mark(&self, url: &str, state: UrlState) {
        if let Err(e) = self.frontier.mark(url, state) {
            tracing::error!("Frontier rejected update: {}", e);
        }
    }

    /// Classifies a URL and either emits it, queues it or drops it
    async fn route_link(&mut self, url: &str, emit: &mpsc::Sender<String>) {
        match self.site.classify(url) {
            UrlCategory::ProductDetail => self.emit_product(url, emit).await,
            category @ (UrlCategory::CategoryIndex
            | UrlCategory::Listing
            | UrlCategory::Pagination) => {
                if let Err(e) = self.frontier.add(url, category) {
                    tracing::debug!(url, "Skipping malformed link: {}", e);
                }
            }
            UrlCategory::Irrelevant => {
                tracing::trace!(url, "Discarding irrelevant link");
            }
        }
    }

    async fn emit_product(&mut self, url: &str, emit: &mpsc::Sender<String>) {
        if self.stop_requested() || self.product_limit_reached() {
            return;
        }

        let (Ok(normalized), Ok(fallback_key)) = (normalize_url(url), normalize_key(url)) else {
            return;
        };
        let normalized = String::from(normalized);
        let key = self.site.product_id(&normalized).unwrap_or(fallback_key);

        if !self.emitted.insert(key) {
            return;
        }

        tracing::debug!(url = %normalized, "Found product");
        if emit.send(normalized).await.is_err() {
            tracing::info!("Product receiver closed, stopping crawl");
            self.stop.store(true, Ordering::SeqCst);
        }
    }
}
