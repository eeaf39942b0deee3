//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of [`ProductStore`]
//! plus the read queries behind the `stats` command.

use crate::extract::Product;
use crate::state::SessionOutcome;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ProductStore, StorageError, StorageResult, UpsertOutcome};
use crate::storage::{PriceStats, ProductSummary, RunCounters, RunMode, RunRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RUN_COLUMNS: &str = "id, mode, started_at, finished_at, config_hash, outcome, \
     pages_visited, products_stored, products_unchanged, products_skipped, failures";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Loads a stored product
    pub fn get_product(&self, product_id: &str) -> StorageResult<Option<Product>> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM products WHERE product_id = ?1",
                params![product_id],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Deletes every stored product; runs are kept
    pub fn clear_products(&mut self) -> StorageResult<usize> {
        Ok(self.conn.execute("DELETE FROM products", [])?)
    }

    // ===== Statistics =====

    pub fn count_products(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Product counts per category, largest first
    pub fn category_counts(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) AS n FROM products GROUP BY category ORDER BY n DESC, category",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Min/avg/max over priced products; None when no product has a price
    pub fn price_stats(&self) -> StorageResult<Option<PriceStats>> {
        let stats = self.conn.query_row(
            "SELECT MIN(price), AVG(price), MAX(price), COUNT(price) FROM products WHERE price IS NOT NULL",
            [],
            |row| {
                let priced: i64 = row.get(3)?;
                if priced == 0 {
                    return Ok(None);
                }
                Ok(Some(PriceStats {
                    min: row.get(0)?,
                    avg: row.get(1)?,
                    max: row.get(2)?,
                    priced: priced as u64,
                }))
            },
        )?;
        Ok(stats)
    }

    /// Most recently scraped products
    pub fn recent_products(&self, limit: usize) -> StorageResult<Vec<ProductSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT product_id, title, category, price, currency, scraped_at
             FROM products ORDER BY scraped_at DESC, product_id LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(ProductSummary {
                product_id: row.get(0)?,
                title: row.get(1)?,
                category: row.get(2)?,
                price: row.get(3)?,
                currency: row.get(4)?,
                scraped_at: row.get(5)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Gets the most recent run
    pub fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        Ok(self.conn.query_row(&sql, [], run_from_row).optional()?)
    }

    pub fn count_runs(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let mode: String = row.get(1)?;
    let outcome: Option<String> = row.get(5)?;

    Ok(RunRecord {
        id: row.get(0)?,
        mode: RunMode::from_db_string(&mode).unwrap_or(RunMode::Crawl),
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        outcome: outcome.as_deref().and_then(SessionOutcome::parse),
        counters: RunCounters {
            pages_visited: row.get(6)?,
            products_stored: row.get(7)?,
            products_unchanged: row.get(8)?,
            products_skipped: row.get(9)?,
            failures: row.get(10)?,
        },
    })
}

impl ProductStore for SqliteStorage {
    // ===== Products =====

    fn exists(&self, product_id: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM products WHERE product_id = ?1",
                params![product_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn fingerprint(&self, product_id: &str) -> StorageResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT fingerprint FROM products WHERE product_id = ?1",
                params![product_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn upsert(&mut self, product: &Product) -> StorageResult<UpsertOutcome> {
        if product.product_id.is_empty() {
            return Err(StorageError::Database(format!(
                "product without id: {}",
                product.url
            )));
        }

        let existed = self.exists(&product.product_id)?;
        let data = serde_json::to_string(product)?;
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO products
                (product_id, url, title, category, price, currency, fingerprint, data, scraped_at, first_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(product_id) DO UPDATE SET
                url = excluded.url,
                title = excluded.title,
                category = excluded.category,
                price = excluded.price,
                currency = excluded.currency,
                fingerprint = excluded.fingerprint,
                data = excluded.data,
                scraped_at = excluded.scraped_at",
            params![
                product.product_id,
                product.url,
                product.title,
                product.category,
                product.price,
                product.currency,
                product.fingerprint(),
                data,
                product.scraped_at.to_rfc3339(),
                now,
            ],
        )?;

        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    // ===== Runs =====

    fn create_run(&mut self, mode: RunMode, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (mode, started_at, config_hash) VALUES (?1, ?2, ?3)",
            params![mode.to_db_string(), now, config_hash],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        outcome: SessionOutcome,
        counters: &RunCounters,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET finished_at = ?1, outcome = ?2, pages_visited = ?3,
                products_stored = ?4, products_unchanged = ?5, products_skipped = ?6, failures = ?7
             WHERE id = ?8",
            params![
                now,
                outcome.as_str(),
                counters.pages_visited,
                counters.products_stored,
                counters.products_unchanged,
                counters.products_skipped,
                counters.failures,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::sample_product;

    #[test]
    fn test_upsert_inserts_then_updates() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let product = sample_product("12345678");

        assert!(!storage.exists("12345678").unwrap());
        assert_eq!(storage.upsert(&product).unwrap(), UpsertOutcome::Inserted);
        assert!(storage.exists("12345678").unwrap());

        let mut changed = product.clone();
        changed.price = Some(2_300_000.0);
        assert_eq!(storage.upsert(&changed).unwrap(), UpsertOutcome::Updated);

        assert_eq!(storage.count_products().unwrap(), 1);
        let stored = storage.get_product("12345678").unwrap().unwrap();
        assert_eq!(stored.price, Some(2_300_000.0));
    }

    #[test]
    fn test_fingerprint_lookup() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let product = sample_product("12345678");
        storage.upsert(&product).unwrap();

        assert_eq!(
            storage.fingerprint("12345678").unwrap(),
            Some(product.fingerprint())
        );
        assert_eq!(storage.fingerprint("99999999").unwrap(), None);
    }

    #[test]
    fn test_upsert_rejects_missing_id() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let product = sample_product("");
        assert!(storage.upsert(&product).is_err());
    }

    #[test]
    fn test_statistics() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();

        let mut first = sample_product("10000001");
        first.price = Some(1000.0);
        let mut second = sample_product("10000002");
        second.price = Some(3000.0);
        let mut third = sample_product("10000003");
        third.price = None;
        third.category = "Téléphones".to_string();

        for product in [&first, &second, &third] {
            storage.upsert(product).unwrap();
        }

        assert_eq!(storage.count_products().unwrap(), 3);
        assert_eq!(
            storage.category_counts().unwrap(),
            vec![("Automobiles".to_string(), 2), ("Téléphones".to_string(), 1)]
        );

        let prices = storage.price_stats().unwrap().unwrap();
        assert_eq!(prices.min, 1000.0);
        assert_eq!(prices.max, 3000.0);
        assert_eq!(prices.avg, 2000.0);
        assert_eq!(prices.priced, 2);

        assert_eq!(storage.recent_products(2).unwrap().len(), 2);
    }

    #[test]
    fn test_price_stats_empty() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert_eq!(storage.price_stats().unwrap(), None);
    }

    #[test]
    fn test_run_lifecycle() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let run_id = storage.create_run(RunMode::Crawl, "abc123").unwrap();

        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.mode, RunMode::Crawl);
        assert_eq!(run.outcome, None);
        assert!(run.finished_at.is_none());

        let counters = RunCounters {
            pages_visited: 2,
            products_stored: 5,
            ..RunCounters::default()
        };
        storage
            .finish_run(run_id, SessionOutcome::StoppedByLimit, &counters)
            .unwrap();

        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.outcome, Some(SessionOutcome::StoppedByLimit));
        assert_eq!(run.counters, counters);
        assert_eq!(run.config_hash, "abc123");
    }

    #[test]
    fn test_unknown_run() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        assert!(matches!(
            storage.get_run(42),
            Err(StorageError::RunNotFound(42))
        ));
        assert!(storage
            .finish_run(42, SessionOutcome::Completed, &RunCounters::default())
            .is_err());
    }

    #[test]
    fn test_clear_products() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        storage.upsert(&sample_product("10000001")).unwrap();
        storage.create_run(RunMode::Scrape, "abc").unwrap();

        assert_eq!(storage.clear_products().unwrap(), 1);
        assert_eq!(storage.count_products().unwrap(), 0);
        assert_eq!(storage.count_runs().unwrap(), 1);
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.db");

        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            storage.upsert(&sample_product("10000001")).unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        assert!(storage.exists("10000001").unwrap());
    }
}
