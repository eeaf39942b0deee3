//! Storage traits and error types
//!
//! This module defines the trait interface the pipeline uses to persist
//! products and record runs, and the associated error types.

use crate::extract::Product;
use crate::storage::{RunCounters, RunMode, RunRecord};
use crate::state::SessionOutcome;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Storage collaborator of the pipeline
///
/// Products are keyed by `product_id`; `upsert` is idempotent.
pub trait ProductStore: Send {
    // ===== Products =====

    /// Returns true if a product with this id is stored
    fn exists(&self, product_id: &str) -> StorageResult<bool>;

    /// Returns the stored fingerprint of a product
    fn fingerprint(&self, product_id: &str) -> StorageResult<Option<String>>;

    /// Inserts a product or replaces the stored one
    fn upsert(&mut self, product: &Product) -> StorageResult<UpsertOutcome>;

    // ===== Runs =====

    /// Records the start of a session, returning its run id
    fn create_run(&mut self, mode: RunMode, config_hash: &str) -> StorageResult<i64>;

    /// Records the end of a session
    fn finish_run(
        &mut self,
        run_id: i64,
        outcome: SessionOutcome,
        counters: &RunCounters,
    ) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;
}
