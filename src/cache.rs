//! This module provides the in-memory freshness cache for per-date event lists

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::event::CalendarEvent;
use crate::traits::{Clock, SystemClock};

/// What the cache holds for one date: the full event list and the moment it was last
/// successfully refreshed. The two are only ever written together.
#[derive(Clone, Debug)]
struct CacheEntry {
    events: Vec<CalendarEvent>,
    last_update: DateTime<Utc>,
}

/// An in-memory map from calendar date to that date's event list, with time-to-live
/// freshness.
///
/// A refresh always replaces the full list for a date (overwrite semantics, never a
/// merge), and concurrent writers are last-writer-wins. Cloning a `FreshnessCache`
/// yields a handle onto the same underlying storage, so the scheduler, the window
/// loader and the store facade can all share it. \
/// All operations are safe to call from concurrent fetch tasks; mutations serialize
/// through a single mutex, which is never held across an `await`.
#[derive(Clone, Debug)]
pub struct FreshnessCache {
    entries: Arc<Mutex<HashMap<NaiveDate, CacheEntry>>>,
    clock: Arc<dyn Clock>,
}

impl FreshnessCache {
    /// Create an empty cache using the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty cache with a custom clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Returns the cached event list and last-refresh timestamp for a date, or `None`
    /// when the date has never been fetched (or has been invalidated since)
    pub fn try_get(&self, date: NaiveDate) -> Option<(Vec<CalendarEvent>, DateTime<Utc>)> {
        let entries = self.entries.lock().unwrap();
        entries.get(&date).map(|entry| (entry.events.clone(), entry.last_update))
    }

    /// Store the event list for a date, stamping it with the current time.
    /// Any previous entry for that date is overwritten wholesale.
    pub fn set(&self, date: NaiveDate, events: Vec<CalendarEvent>) {
        let last_update = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        entries.insert(date, CacheEntry { events, last_update });
    }

    /// Whether an entry exists for this date and is younger than `ttl`
    pub fn is_fresh(&self, date: NaiveDate, ttl: Duration) -> bool {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap();
        match entries.get(&date) {
            Some(entry) => now - entry.last_update <= ttl,
            None => false,
        }
    }

    /// Drop the entry for a single date, so the next read refetches it.
    /// Used by the write path after an event mutation.
    pub fn invalidate(&self, date: NaiveDate) {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(&date);
    }

    /// Remove every entry whose date is earlier than `today - keep_days`.
    /// Returns how many entries were dropped.
    pub fn cleanup_old_entries(&self, keep_days: i64) -> usize {
        let horizon = self.clock.today() - Duration::days(keep_days);
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|date, _| *date >= horizon);
        let removed = before - entries.len();
        if removed > 0 {
            log::debug!("Evicted {} cache entries older than {}", removed, horizon);
        }
        removed
    }

    /// The number of dates currently cached
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FreshnessCache {
    fn default() -> Self {
        Self::new()
    }
}
