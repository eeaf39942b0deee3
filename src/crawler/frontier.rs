//! URL frontier for one crawl session
//!
//! The frontier owns one [`UrlRecord`] per normalized URL. Every mutation
//! (discovery, dispatch, completion) goes through a single lock, so a URL is
//! dispatched to exactly one caller even when many tasks pull concurrently.

use crate::state::UrlState;
use crate::url::{normalize_key, normalize_url, UrlCategory};
use crate::{ScraperError, UrlError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// A URL known to the crawl session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    /// Normalized URL (the dedup key)
    pub url: String,

    /// Category assigned when the URL was discovered
    pub category: UrlCategory,

    /// Current crawl state
    pub state: UrlState,

    /// Fetch attempts made for this URL
    pub attempt_count: u32,
}

#[derive(Debug, Default)]
struct FrontierTable {
    records: HashMap<String, UrlRecord>,

    /// Discovered URLs in discovery order
    queue: VecDeque<String>,
}

/// Set of discovered URLs and their crawl state
#[derive(Debug, Default)]
pub struct Frontier {
    table: Mutex<FrontierTable>,
}

impl Frontier {
    /// Creates an empty frontier
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, FrontierTable> {
        // A panic while holding the lock leaves the table itself consistent
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a discovered URL
    ///
    /// Returns `Ok(true)` if the URL was new, `Ok(false)` if an equivalent URL
    /// is already known (in any state).
    pub fn add(&self, url: &str, category: UrlCategory) -> Result<bool, UrlError> {
        let key = normalize_key(url)?;
        let normalized = normalize_url(url)?;
        let mut table = self.table();

        if table.records.contains_key(&key) {
            return Ok(false);
        }

        table.records.insert(
            key.clone(),
            UrlRecord {
                url: normalized.into(),
                category,
                state: UrlState::Discovered,
                attempt_count: 0,
            },
        );
        table.queue.push_back(key);

        Ok(true)
    }

    /// Dispatches the oldest discovered URL, moving it to `InFlight`
    ///
    /// Returns None when nothing is waiting for dispatch (URLs may still be in
    /// flight; see [`Frontier::has_pending`]).
    pub fn next(&self) -> Option<UrlRecord> {
        let mut table = self.table();
        Self::dispatch_one(&mut table)
    }

    /// Dispatches up to `max` URLs in one critical section
    pub fn next_batch(&self, max: usize) -> Vec<UrlRecord> {
        let mut table = self.table();
        let mut batch = Vec::with_capacity(max.min(table.queue.len()));

        while batch.len() < max {
            match Self::dispatch_one(&mut table) {
                Some(record) => batch.push(record),
                None => break,
            }
        }

        batch
    }

    fn dispatch_one(table: &mut FrontierTable) -> Option<UrlRecord> {
        while let Some(key) = table.queue.pop_front() {
            if let Some(record) = table.records.get_mut(&key) {
                if record.state == UrlState::Discovered {
                    record.state = UrlState::InFlight;
                    return Some(record.clone());
                }
            }
        }
        None
    }

    /// Moves a URL to a new state
    ///
    /// Only `Discovered → InFlight` and `InFlight → Done | Failed` are legal.
    pub fn mark(&self, url: &str, state: UrlState) -> Result<(), ScraperError> {
        let key = normalize_key(url).unwrap_or_else(|_| url.to_string());
        let mut table = self.table();

        let record = table
            .records
            .get_mut(&key)
            .ok_or_else(|| ScraperError::UnknownUrl(key.clone()))?;

        if !record.state.can_transition_to(state) {
            return Err(ScraperError::InvalidTransition {
                url: key,
                from: record.state,
                to: state,
            });
        }

        record.state = state;
        Ok(())
    }

    /// Records how many fetch attempts a URL took
    pub fn record_attempts(&self, url: &str, attempts: u32) {
        let key = normalize_key(url).unwrap_or_else(|_| url.to_string());
        if let Some(record) = self.table().records.get_mut(&key) {
            record.attempt_count = record.attempt_count.saturating_add(attempts);
        }
    }

    /// Returns a snapshot of the record for a URL
    pub fn get(&self, url: &str) -> Option<UrlRecord> {
        let key = normalize_key(url).ok()?;
        self.table().records.get(&key).cloned()
    }

    /// Returns true if an equivalent URL is known
    pub fn contains(&self, url: &str) -> bool {
        self.get(url).is_some()
    }

    /// Returns true while any URL is discovered or in flight
    pub fn has_pending(&self) -> bool {
        self.table()
            .records
            .values()
            .any(|record| record.state.is_pending())
    }

    /// Counts records per state
    pub fn counts(&self) -> HashMap<UrlState, usize> {
        let mut counts = HashMap::new();
        for record in self.table().records.values() {
            *counts.entry(record.state).or_insert(0) += 1;
        }
        counts
    }

    /// Number of distinct URLs known
    pub fn len(&self) -> usize {
        self.table().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
