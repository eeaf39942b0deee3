//! Pipeline coordinator
//!
//! Drives product URLs (from a crawl session or given directly) through the
//! site extractor, deduplicates them against storage and upserts new or
//! changed products. Extractions run concurrently, bounded by the fetcher's
//! concurrency; storage access is serialized through one lock.

use crate::config::{Config, DedupPolicy};
use crate::crawler::{CrawlReport, Crawler, Fetcher};
use crate::extract::{Extraction, ExtractionFailure, FailureReason};
use crate::site::{Ouedkniss, SiteProfile};
use crate::state::SessionOutcome;
use crate::storage::{ProductStore, RunCounters, RunMode, StorageError, StorageResult};
use crate::Result;
use futures::stream::{self, Stream, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::mpsc;

/// Summary of a pipeline session
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub outcome: SessionOutcome,

    /// Crawl summary (crawl mode only)
    pub crawl: Option<CrawlReport>,

    /// Products handed to storage (new or changed)
    pub forwarded: u32,

    /// Re-fetched products whose content had not changed
    pub unchanged: u32,

    /// Known products skipped without fetching
    pub skipped_existing: u32,

    /// URLs whose product id was already handled this session
    pub duplicates: u32,

    pub failures: Vec<ExtractionFailure>,

    /// Total parse warnings across extracted products
    pub warnings: u32,

    /// Storage run id of this session
    pub run_id: i64,
}

/// What happened to one product URL before the forwarding decision
enum Step {
    Extracted(Extraction),
    Failed(ExtractionFailure),
    SkippedExisting,
    /// Dropped because the session was already stopping
    Cancelled,
}

#[derive(Debug, Default)]
struct Tally {
    forwarded: u32,
    unchanged: u32,
    skipped_existing: u32,
    duplicates: u32,
    failures: Vec<ExtractionFailure>,
    warnings: u32,
    limit_reached: bool,
}

/// Coordinates crawling, extraction and storage for one site
pub struct Pipeline<S: ProductStore> {
    fetcher: Arc<Fetcher>,
    site: Arc<dyn SiteProfile>,
    store: Arc<Mutex<S>>,
    dedup: DedupPolicy,
    max_pages: Option<u32>,
    max_products: Option<u32>,
    config_hash: String,
}

impl<S: ProductStore> Pipeline<S> {
    pub fn new(fetcher: Arc<Fetcher>, site: Arc<dyn SiteProfile>, store: Arc<Mutex<S>>) -> Self {
        Self {
            fetcher,
            site,
            store,
            dedup: DedupPolicy::default(),
            max_pages: None,
            max_products: None,
            config_hash: String::new(),
        }
    }

    /// Builds the fetcher and the Ouedkniss profile from configuration
    pub fn from_config(config: &Config, config_hash: &str, store: S) -> Result<Self> {
        let fetcher = Arc::new(Fetcher::new(&config.scraper)?);
        let site: Arc<dyn SiteProfile> = Arc::new(Ouedkniss::from_config(config)?);

        Ok(Self::new(fetcher, site, Arc::new(Mutex::new(store)))
            .with_dedup(config.crawl.dedup)
            .with_max_pages(config.crawl.max_pages)
            .with_max_products(config.crawl.max_products)
            .with_config_hash(config_hash))
    }

    pub fn with_dedup(mut self, dedup: DedupPolicy) -> Self {
        self.dedup = dedup;
        self
    }

    /// Page limit passed on to the crawler
    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Stops the session after exactly this many products are forwarded
    pub fn with_max_products(mut self, max_products: Option<u32>) -> Self {
        self.max_products = max_products;
        self
    }

    /// Configuration hash recorded with each run
    pub fn with_config_hash(mut self, config_hash: &str) -> Self {
        self.config_hash = config_hash.to_string();
        self
    }

    pub fn store(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.store)
    }

    fn product_limit_reached(&self, forwarded: u32) -> bool {
        self.max_products.map_or(false, |max| forwarded >= max)
    }

    fn lock_store(&self) -> StorageResult<MutexGuard<'_, S>> {
        self.store
            .lock()
            .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))
    }

    /// Crawls from the seed URLs and stores every product found
    pub async fn run_crawl(&self, seeds: &[String]) -> Result<PipelineReport> {
        let run_id = self.lock_store()?.create_run(RunMode::Crawl, &self.config_hash)?;
        let started = Instant::now();
        tracing::info!(run_id, seeds = seeds.len(), "Starting crawl pipeline");

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(self.fetcher.concurrency() * 4);

        let mut crawler = Crawler::new(Arc::clone(&self.fetcher), Arc::clone(&self.site))
            .with_max_pages(self.max_pages)
            .with_stop_signal(Arc::clone(&stop));

        let product_urls = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|url| (url, rx))
        });

        let (crawl_report, tally) = tokio::join!(
            crawler.run(seeds, tx),
            self.consume(product_urls, &stop)
        );
        let tally = tally?;

        let outcome = if tally.limit_reached {
            SessionOutcome::StoppedByLimit
        } else {
            crawl_report.outcome
        };

        self.finish(run_id, outcome, Some(crawl_report), tally, started)
    }

    /// Scrapes the given product URLs directly, without crawling
    pub async fn run_scrape(&self, urls: &[String]) -> Result<PipelineReport> {
        let run_id = self.lock_store()?.create_run(RunMode::Scrape, &self.config_hash)?;
        let started = Instant::now();
        tracing::info!(run_id, urls = urls.len(), "Starting direct scrape");

        let stop = Arc::new(AtomicBool::new(false));
        let tally = self
            .consume(stream::iter(urls.iter().cloned()), &stop)
            .await?;

        let outcome = if tally.limit_reached {
            SessionOutcome::StoppedByLimit
        } else {
            SessionOutcome::Completed
        };

        self.finish(run_id, outcome, None, tally, started)
    }

    fn finish(
        &self,
        run_id: i64,
        outcome: SessionOutcome,
        crawl: Option<CrawlReport>,
        tally: Tally,
        started: Instant,
    ) -> Result<PipelineReport> {
        let counters = RunCounters {
            pages_visited: crawl.as_ref().map_or(0, |c| c.pages_visited),
            products_stored: tally.forwarded,
            products_unchanged: tally.unchanged,
            products_skipped: tally.skipped_existing,
            failures: tally.failures.len() as u32,
        };
        self.lock_store()?.finish_run(run_id, outcome, &counters)?;

        tracing::info!(
            run_id,
            outcome = %outcome,
            stored = tally.forwarded,
            unchanged = tally.unchanged,
            skipped = tally.skipped_existing,
            failed = tally.failures.len(),
            "Session finished in {:?}",
            started.elapsed()
        );

        Ok(PipelineReport {
            outcome,
            crawl,
            forwarded: tally.forwarded,
            unchanged: tally.unchanged,
            skipped_existing: tally.skipped_existing,
            duplicates: tally.duplicates,
            failures: tally.failures,
            warnings: tally.warnings,
            run_id,
        })
    }

    /// Extracts and stores products from a stream of product URLs
    ///
    /// Returns once the stream ends and every in-flight extraction has drained.
    async fn consume<U>(&self, urls: U, stop: &Arc<AtomicBool>) -> StorageResult<Tally>
    where
        U: Stream<Item = String>,
    {
        let mut seen = HashSet::new();
        let mut tally = Tally::default();
        let mut forwarded_ids = HashSet::new();

        if self.product_limit_reached(0) {
            tracing::info!("Product limit is 0, nothing will be stored");
            tally.limit_reached = true;
            stop.store(true, Ordering::SeqCst);
        }

        let steps = urls
            .map(|url| {
                let admission = self.admit(&url, &mut seen);
                async move {
                    if !admission? {
                        return Ok((url, Step::SkippedExisting));
                    }
                    if stop.load(Ordering::SeqCst) {
                        return Ok((url, Step::Cancelled));
                    }
                    let fetched = self.fetcher.fetch(&url).await;
                    let step = match self.site.extract(&fetched) {
                        Ok(extraction) => Step::Extracted(extraction),
                        Err(failure) => Step::Failed(failure),
                    };
                    Ok::<_, AdmissionError>((url, step))
                }
            })
            .buffer_unordered(self.fetcher.concurrency());
        futures::pin_mut!(steps);

        while let Some(result) = steps.next().await {
            let (url, step) = match result {
                Ok(done) => done,
                Err(AdmissionError::Duplicate(url)) => {
                    tally.duplicates += 1;
                    tracing::debug!(url = %url, "Duplicate product URL");
                    continue;
                }
                Err(AdmissionError::NoProductId(url)) => {
                    tracing::warn!(url = %url, "No product id in URL, skipping");
                    tally
                        .failures
                        .push(ExtractionFailure::new(&url, FailureReason::MissingProductId));
                    continue;
                }
                Err(AdmissionError::Storage(e)) => return Err(e),
            };

            match step {
                Step::Extracted(extraction) => {
                    self.forward(extraction, &mut tally, &mut forwarded_ids, stop)?;
                }
                Step::Failed(failure) => {
                    tracing::warn!(url = %url, "Extraction failed: {}", failure.reason);
                    tally.failures.push(failure);
                }
                Step::SkippedExisting => {
                    tally.skipped_existing += 1;
                    tracing::debug!(url = %url, "Already stored, skipping");
                }
                Step::Cancelled => {
                    tracing::debug!(url = %url, "Session stopping, not fetched");
                }
            }
        }

        Ok(tally)
    }

    /// Decides whether a product URL should be fetched
    ///
    /// Returns `Ok(false)` for products already stored under `skip-existing`.
    fn admit(
        &self,
        url: &str,
        seen: &mut HashSet<String>,
    ) -> std::result::Result<bool, AdmissionError> {
        let product_id = self
            .site
            .product_id(url)
            .ok_or_else(|| AdmissionError::NoProductId(url.to_string()))?;

        if !seen.insert(product_id.clone()) {
            return Err(AdmissionError::Duplicate(url.to_string()));
        }

        if self.dedup == DedupPolicy::SkipExisting {
            let exists = self
                .lock_store()
                .and_then(|store| store.exists(&product_id))
                .map_err(AdmissionError::Storage)?;
            return Ok(!exists);
        }

        Ok(true)
    }

    /// Stores an extracted product if it is new or changed
    fn forward(
        &self,
        extraction: Extraction,
        tally: &mut Tally,
        forwarded_ids: &mut HashSet<String>,
        stop: &Arc<AtomicBool>,
    ) -> StorageResult<()> {
        tally.warnings += extraction.warnings.len() as u32;
        let product = extraction.product;

        if tally.limit_reached || self.product_limit_reached(tally.forwarded) {
            tracing::debug!(product_id = %product.product_id, "Limit reached, not storing");
            tally.limit_reached = true;
            stop.store(true, Ordering::SeqCst);
            return Ok(());
        }

        if forwarded_ids.contains(&product.product_id) {
            tally.duplicates += 1;
            return Ok(());
        }

        let mut store = self.lock_store()?;
        match self.dedup {
            DedupPolicy::Refresh => {
                if store.fingerprint(&product.product_id)?.as_deref()
                    == Some(product.fingerprint().as_str())
                {
                    tally.unchanged += 1;
                    tracing::debug!(product_id = %product.product_id, "Unchanged");
                    return Ok(());
                }
            }
            DedupPolicy::SkipExisting => {
                // Stored by someone else while this page was in flight
                if store.exists(&product.product_id)? {
                    tally.skipped_existing += 1;
                    return Ok(());
                }
            }
        }

        let outcome = store.upsert(&product)?;
        drop(store);

        forwarded_ids.insert(product.product_id.clone());
        tally.forwarded += 1;
        tracing::debug!(product_id = %product.product_id, ?outcome, "Stored product");

        if tally.forwarded % 10 == 0 {
            tracing::info!(
                "Progress: {} products stored, {} unchanged, {} skipped, {} failed",
                tally.forwarded,
                tally.unchanged,
                tally.skipped_existing,
                tally.failures.len()
            );
        }

        if self.product_limit_reached(tally.forwarded) {
            tracing::info!(max = tally.forwarded, "Product limit reached, stopping session");
            tally.limit_reached = true;
            stop.store(true, Ordering::SeqCst);
        }

        Ok(())
    }
}

/// Reasons a URL is not admitted for fetching
enum AdmissionError {
    Duplicate(String),
    NoProductId(String),
    Storage(StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScraperConfig;
    use crate::extract::Product;
    use crate::storage::{RunRecord, UpsertOutcome};
    use crate::url::UrlClassifier;
    use std::collections::HashMap;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// In-memory store recording every upsert
    #[derive(Default)]
    struct MemoryStore {
        products: HashMap<String, Product>,
        upserts: Vec<String>,
        runs: Vec<(RunMode, Option<SessionOutcome>, RunCounters)>,
    }

    impl ProductStore for MemoryStore {
        fn exists(&self, product_id: &str) -> StorageResult<bool> {
            Ok(self.products.contains_key(product_id))
        }

        fn fingerprint(&self, product_id: &str) -> StorageResult<Option<String>> {
            Ok(self.products.get(product_id).map(Product::fingerprint))
        }

        fn upsert(&mut self, product: &Product) -> StorageResult<UpsertOutcome> {
            self.upserts.push(product.product_id.clone());
            Ok(
                match self
                    .products
                    .insert(product.product_id.clone(), product.clone())
                {
                    Some(_) => UpsertOutcome::Updated,
                    None => UpsertOutcome::Inserted,
                },
            )
        }

        fn create_run(&mut self, mode: RunMode, _config_hash: &str) -> StorageResult<i64> {
            self.runs.push((mode, None, RunCounters::default()));
            Ok(self.runs.len() as i64)
        }

        fn finish_run(
            &mut self,
            run_id: i64,
            outcome: SessionOutcome,
            counters: &RunCounters,
        ) -> StorageResult<()> {
            let run = self
                .runs
                .get_mut(run_id as usize - 1)
                .ok_or(StorageError::RunNotFound(run_id))?;
            run.1 = Some(outcome);
            run.2 = counters.clone();
            Ok(())
        }

        fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
            Err(StorageError::RunNotFound(run_id))
        }
    }

    fn product_page(title: &str, price: &str) -> String {
        format!(
            r#"<html><body><h1 class="title">{}</h1><div class="price">{}</div></body></html>"#,
            title, price
        )
    }

    async fn mount(server: &MockServer, route: &str, html: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(server)
            .await;
    }

    fn pipeline_for(server: &MockServer, store: MemoryStore) -> Pipeline<MemoryStore> {
        let config = ScraperConfig {
            base_url: server.uri(),
            user_agent: "ouedkniss-scraper-test/1.0".to_string(),
            request_timeout_secs: 5,
            rate_limit_delay_ms: 0,
            max_concurrent_requests: 3,
            max_retries: 0,
            backoff_base_ms: 10,
            backoff_max_ms: 100,
            default_currency: "DZD".to_string(),
        };
        let fetcher = Arc::new(Fetcher::new(&config).unwrap());
        let classifier = UrlClassifier::new(&Url::parse(&server.uri()).unwrap()).unwrap();
        let site: Arc<dyn SiteProfile> = Arc::new(Ouedkniss::new(classifier, "DZD"));
        Pipeline::new(fetcher, site, Arc::new(Mutex::new(store)))
    }

    #[tokio::test]
    async fn test_scrape_stores_products_and_reports_failures() {
        let server = MockServer::start().await;
        mount(&server, "/telephones/galaxy-s21-d5000001", product_page("Galaxy S21", "85 000 DA")).await;
        mount(&server, "/telephones/broken-d5000002", "<p>no title</p>".to_string()).await;

        let pipeline = pipeline_for(&server, MemoryStore::default());
        let urls = vec![
            format!("{}/telephones/galaxy-s21-d5000001", server.uri()),
            format!("{}/telephones/broken-d5000002", server.uri()),
            format!("{}/telephones/galaxy-s21-d5000001?ref=home", server.uri()),
            format!("{}/telephones", server.uri()),
        ];
        let report = pipeline.run_scrape(&urls).await.unwrap();

        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.forwarded, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.failures.len(), 2);
        assert!(report.crawl.is_none());

        let store = pipeline.store();
        let store = store.lock().unwrap();
        assert_eq!(store.products["5000001"].price, Some(85000.0));
        assert_eq!(store.runs[0].0, RunMode::Scrape);
        assert_eq!(store.runs[0].1, Some(SessionOutcome::Completed));
        assert_eq!(store.runs[0].2.products_stored, 1);
    }

    #[tokio::test]
    async fn test_skip_existing_does_not_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(product_page("X", "1 DA")))
            .expect(0)
            .mount(&server)
            .await;

        let mut store = MemoryStore::default();
        let mut known = crate::extract::sample_product("5000001");
        known.url = format!("{}/telephones/x-d5000001", server.uri());
        store.products.insert("5000001".to_string(), known);

        let pipeline = pipeline_for(&server, store);
        let report = pipeline
            .run_scrape(&[format!("{}/telephones/x-d5000001", server.uri())])
            .await
            .unwrap();

        assert_eq!(report.skipped_existing, 1);
        assert_eq!(report.forwarded, 0);
    }

    #[tokio::test]
    async fn test_refresh_forwards_only_changed_products() {
        let server = MockServer::start().await;
        mount(&server, "/telephones/a-d5000001", product_page("Phone A", "1 000 DA")).await;
        mount(&server, "/telephones/b-d5000002", product_page("Phone B", "2 000 DA")).await;

        let urls = vec![
            format!("{}/telephones/a-d5000001", server.uri()),
            format!("{}/telephones/b-d5000002", server.uri()),
        ];

        let pipeline = pipeline_for(&server, MemoryStore::default()).with_dedup(DedupPolicy::Refresh);
        let first = pipeline.run_scrape(&urls).await.unwrap();
        assert_eq!(first.forwarded, 2);

        // Phone B changes price between sessions
        server.reset().await;
        mount(&server, "/telephones/a-d5000001", product_page("Phone A", "1 000 DA")).await;
        mount(&server, "/telephones/b-d5000002", product_page("Phone B", "1 500 DA")).await;

        let second = pipeline.run_scrape(&urls).await.unwrap();
        assert_eq!(second.forwarded, 1);
        assert_eq!(second.unchanged, 1);

        let store = pipeline.store();
        let store = store.lock().unwrap();
        assert_eq!(store.products["5000002"].price, Some(1500.0));
        assert_eq!(store.upserts.len(), 3);
    }

    #[tokio::test]
    async fn test_max_products_forwards_exactly_n() {
        let server = MockServer::start().await;
        let mut urls = Vec::new();
        for i in 1..=8 {
            let route = format!("/telephones/phone-d{}", 6000000 + i);
            mount(&server, &route, product_page(&format!("Phone {}", i), "10 000 DA")).await;
            urls.push(format!("{}{}", server.uri(), route));
        }

        let pipeline = pipeline_for(&server, MemoryStore::default()).with_max_products(Some(2));
        let report = pipeline.run_scrape(&urls).await.unwrap();

        assert_eq!(report.outcome, SessionOutcome::StoppedByLimit);
        assert_eq!(report.forwarded, 2);

        let store = pipeline.store();
        let store = store.lock().unwrap();
        assert_eq!(store.products.len(), 2);
        assert_eq!(store.runs[0].1, Some(SessionOutcome::StoppedByLimit));
    }

    #[tokio::test]
    async fn test_zero_product_limit_stores_nothing() {
        let server = MockServer::start().await;
        let mut urls = Vec::new();
        for i in 1..=3 {
            let route = format!("/telephones/phone-d{}", 6100000 + i);
            mount(&server, &route, product_page(&format!("Phone {}", i), "10 000 DA")).await;
            urls.push(format!("{}{}", server.uri(), route));
        }

        let pipeline = pipeline_for(&server, MemoryStore::default()).with_max_products(Some(0));
        let report = pipeline.run_scrape(&urls).await.unwrap();

        assert_eq!(report.outcome, SessionOutcome::StoppedByLimit);
        assert_eq!(report.forwarded, 0);
        assert!(pipeline.store().lock().unwrap().upserts.is_empty());
    }

    #[tokio::test]
    async fn test_crawl_mode_records_crawl_report() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/telephones",
            r#"<a href="/telephones/a-d5000001">a</a><a href="/telephones/b-d5000002">b</a>"#
                .to_string(),
        )
        .await;
        mount(&server, "/telephones/a-d5000001", product_page("Phone A", "1 000 DA")).await;
        mount(&server, "/telephones/b-d5000002", product_page("Phone B", "2 000 DA")).await;

        let pipeline = pipeline_for(&server, MemoryStore::default());
        let report = pipeline
            .run_crawl(&[format!("{}/telephones", server.uri())])
            .await
            .unwrap();

        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.forwarded, 2);
        let crawl = report.crawl.unwrap();
        assert_eq!(crawl.pages_visited, 1);
        assert_eq!(crawl.products_emitted, 2);
    }
}
