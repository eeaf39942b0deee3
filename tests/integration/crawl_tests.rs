//! Integration tests for the crawl-and-extract pipeline
//!
//! These tests use wiremock to serve a small classifieds site and run full
//! sessions against it, with products stored in a temporary SQLite database.

use ouedkniss_scraper::config::{parse_config, Config};
use ouedkniss_scraper::crawler::{Crawler, Fetcher};
use ouedkniss_scraper::output::load_statistics;
use ouedkniss_scraper::site::{Ouedkniss, SiteProfile};
use ouedkniss_scraper::state::SessionOutcome;
use ouedkniss_scraper::storage::{ProductStore, SqliteStorage};
use ouedkniss_scraper::Pipeline;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, db_path: &str, extra: &str) -> Config {
    let content = format!(
        r#"
[scraper]
base-url = "{}"
user-agent = "ouedkniss-scraper-test/1.0"
rate-limit-delay-ms = 0
max-concurrent-requests = 3
max-retries = 1
backoff-base-ms = 10
backoff-max-ms = 50

[crawl]
{}

[output]
database-path = "{}"
"#,
        base_url, extra, db_path
    );
    parse_config(&content).expect("test config should be valid")
}

fn product_page(title: &str, price: &str) -> String {
    format!(
        r#"<html><head><title>{title}</title></head><body>
        <nav class="breadcrumb"><a href="/">Accueil</a><a href="/telephones">Téléphones</a></nav>
        <h1 class="title">{title}</h1>
        <div class="price">{price}</div>
        <div class="description">Bon état, boîte d'origine.</div>
        <div class="gallery"><img src="/images/{title}.jpg"></div>
        </body></html>"#,
        title = title,
        price = price
    )
}

async fn mount_page(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

/// One category page with 3 products and a second page with 2 more
async fn mount_site(server: &MockServer) {
    mount_page(
        server,
        "/telephones",
        r#"<html><body>
           <a href="/telephones/galaxy-s21-d7000001">Galaxy S21</a>
           <a href="/telephones/iphone-12-d7000002">iPhone 12</a>
           <a href="/telephones/redmi-note-10-d7000003">Redmi Note 10</a>
           <a href="/telephones/2">Page suivante</a>
           </body></html>"#
            .to_string(),
    )
    .await;
    mount_page(
        server,
        "/telephones/2",
        r#"<html><body>
           <a href="/telephones/pixel-6-d7000004">Pixel 6</a>
           <a href="/telephones/nokia-g20-d7000005">Nokia G20</a>
           <a href="/telephones">Page précédente</a>
           </body></html>"#
            .to_string(),
    )
    .await;

    let products = [
        ("/telephones/galaxy-s21-d7000001", "Galaxy S21", "85 000 DA"),
        ("/telephones/iphone-12-d7000002", "iPhone 12", "120 000 DA"),
        ("/telephones/redmi-note-10-d7000003", "Redmi Note 10", "32 000 DA"),
        ("/telephones/pixel-6-d7000004", "Pixel 6", "70 000 DA"),
        ("/telephones/nokia-g20-d7000005", "Nokia G20", "Prix non précisé"),
    ];
    for (route, title, price) in products {
        mount_page(server, route, product_page(title, price)).await;
    }
}

fn temp_db(dir: &TempDir) -> String {
    dir.path().join("products.db").to_string_lossy().to_string()
}

#[tokio::test]
async fn test_crawl_two_pages_emits_five_products() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &temp_db(&dir), "max-pages = 2");

    let fetcher = Arc::new(Fetcher::new(&config.scraper).unwrap());
    let site: Arc<dyn SiteProfile> = Arc::new(Ouedkniss::from_config(&config).unwrap());
    let mut crawler = Crawler::new(fetcher, site).with_max_pages(config.crawl.max_pages);

    let (tx, mut rx) = mpsc::channel(16);
    let report = crawler
        .run(&[format!("{}/telephones", server.uri())], tx)
        .await;

    let mut emitted = Vec::new();
    while let Some(url) = rx.recv().await {
        emitted.push(url);
    }
    emitted.sort();
    emitted.dedup();

    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.products_emitted, 5);
    assert_eq!(emitted.len(), 5);
}

#[tokio::test]
async fn test_full_crawl_stores_products() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &temp_db(&dir), "");
    let storage = SqliteStorage::new(dir.path().join("products.db").as_path()).unwrap();

    let pipeline = Pipeline::from_config(&config, "test-hash", storage).unwrap();
    let report = pipeline
        .run_crawl(&[format!("{}/telephones", server.uri())])
        .await
        .unwrap();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.forwarded, 5);
    assert!(report.failures.is_empty());

    let store = pipeline.store();
    let store = store.lock().unwrap();
    let galaxy = store.get_product("7000001").unwrap().unwrap();
    assert_eq!(galaxy.title, "Galaxy S21");
    assert_eq!(galaxy.price, Some(85000.0));
    assert_eq!(galaxy.currency, "DZD");

    let nokia = store.get_product("7000005").unwrap().unwrap();
    assert_eq!(nokia.price, None);

    let stats = load_statistics(&store).unwrap();
    assert_eq!(stats.total_products, 5);
    let run = stats.latest_run.unwrap();
    assert_eq!(run.outcome, Some(SessionOutcome::Completed));
    assert_eq!(run.counters.products_stored, 5);
    assert_eq!(run.counters.pages_visited, 2);
}

#[tokio::test]
async fn test_max_products_stops_session() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &temp_db(&dir), "max-products = 2");
    let storage = SqliteStorage::new(dir.path().join("products.db").as_path()).unwrap();

    let pipeline = Pipeline::from_config(&config, "test-hash", storage).unwrap();
    let report = pipeline
        .run_crawl(&[format!("{}/telephones", server.uri())])
        .await
        .unwrap();

    assert_eq!(report.outcome, SessionOutcome::StoppedByLimit);
    assert_eq!(report.forwarded, 2);

    let store = pipeline.store();
    let store = store.lock().unwrap();
    assert_eq!(store.count_products().unwrap(), 2);
}

#[tokio::test]
async fn test_second_crawl_skips_stored_products() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("products.db");
    let config = create_test_config(&server.uri(), &temp_db(&dir), "");
    let seeds = vec![format!("{}/telephones", server.uri())];

    let first = Pipeline::from_config(&config, "h", SqliteStorage::new(&db_path).unwrap())
        .unwrap()
        .run_crawl(&seeds)
        .await
        .unwrap();
    assert_eq!(first.forwarded, 5);

    let second = Pipeline::from_config(&config, "h", SqliteStorage::new(&db_path).unwrap())
        .unwrap()
        .run_crawl(&seeds)
        .await
        .unwrap();
    assert_eq!(second.forwarded, 0);
    assert_eq!(second.skipped_existing, 5);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_runs().unwrap(), 2);
}

#[tokio::test]
async fn test_refresh_stores_changed_listing() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/telephones/galaxy-s21-d7000001",
        product_page("Galaxy S21", "85 000 DA"),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("products.db");
    let config = create_test_config(&server.uri(), &temp_db(&dir), r#"dedup = "refresh""#);
    let urls = vec![format!("{}/telephones/galaxy-s21-d7000001", server.uri())];

    let pipeline = Pipeline::from_config(&config, "h", SqliteStorage::new(&db_path).unwrap()).unwrap();
    assert_eq!(pipeline.run_scrape(&urls).await.unwrap().forwarded, 1);
    assert_eq!(pipeline.run_scrape(&urls).await.unwrap().unchanged, 1);

    server.reset().await;
    mount_page(
        &server,
        "/telephones/galaxy-s21-d7000001",
        product_page("Galaxy S21", "79 000 DA"),
    )
    .await;

    let report = pipeline.run_scrape(&urls).await.unwrap();
    assert_eq!(report.forwarded, 1);

    let store = pipeline.store();
    let store = store.lock().unwrap();
    assert_eq!(store.get_product("7000001").unwrap().unwrap().price, Some(79000.0));
    assert!(store.exists("7000001").unwrap());
}

#[tokio::test]
async fn test_scrape_reports_unreachable_product() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/telephones/gone-d7000009"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &temp_db(&dir), "");
    let storage = SqliteStorage::new(dir.path().join("products.db").as_path()).unwrap();

    let pipeline = Pipeline::from_config(&config, "h", storage).unwrap();
    let report = pipeline
        .run_scrape(&[format!("{}/telephones/gone-d7000009", server.uri())])
        .await
        .unwrap();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.forwarded, 0);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].url.ends_with("gone-d7000009"));
}
