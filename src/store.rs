//! A facade over the external event store that makes every call resilient.
//!
//! The rest of the crate never talks to the raw [`EventSource`]: reads and writes all go
//! through this facade, so the retry policy is applied uniformly. Writes additionally
//! invalidate the cached entries of every date the event covers, so a later read
//! refetches instead of serving a list that no longer matches the store.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tokio_util::sync::CancellationToken;

use crate::cache::FreshnessCache;
use crate::error::StoreError;
use crate::event::CalendarEvent;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::traits::EventSource;

/// The one gateway to the backing event store.
///
/// Cloning is cheap and yields a handle onto the same source, cache and policy.
#[derive(Clone)]
pub struct ResilientEventStore {
    source: Arc<dyn EventSource>,
    cache: FreshnessCache,
    policy: RetryPolicy,
}

impl ResilientEventStore {
    pub fn new(source: Arc<dyn EventSource>, cache: FreshnessCache, policy: RetryPolicy) -> Self {
        Self { source, cache, policy }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch the event list of a single date, retrying transient failures
    pub async fn events_for_date(&self, date: NaiveDate, cancel: &CancellationToken)
        -> Result<Vec<CalendarEvent>, StoreError>
    {
        let source = Arc::clone(&self.source);
        run_with_retry(&self.policy, cancel, || source.events_for_date(date)).await
    }

    /// Fetch every event between `start` and `end` (inclusive), retrying transient failures
    pub async fn events_for_range(&self, start: NaiveDate, end: NaiveDate,
                                  cancel: &CancellationToken)
        -> Result<Vec<CalendarEvent>, StoreError>
    {
        let source = Arc::clone(&self.source);
        run_with_retry(&self.policy, cancel, || source.events_for_range(start, end)).await
    }

    /// Persist a new event. Unlike the read path, a failure here propagates to the caller
    /// once retries are exhausted: silently losing a write is not acceptable.
    pub async fn add_event(&self, event: &CalendarEvent, cancel: &CancellationToken)
        -> Result<(), StoreError>
    {
        let source = Arc::clone(&self.source);
        let payload = event.clone();
        run_with_retry(&self.policy, cancel, || source.add_event(payload.clone())).await?;
        self.invalidate_covered_dates(event);
        Ok(())
    }

    /// Overwrite an existing event
    pub async fn update_event(&self, event: &CalendarEvent, cancel: &CancellationToken)
        -> Result<(), StoreError>
    {
        let source = Arc::clone(&self.source);
        let payload = event.clone();
        run_with_retry(&self.policy, cancel, || source.update_event(payload.clone())).await?;
        self.invalidate_covered_dates(event);
        Ok(())
    }

    /// Delete an event
    pub async fn delete_event(&self, event: &CalendarEvent, cancel: &CancellationToken)
        -> Result<(), StoreError>
    {
        let source = Arc::clone(&self.source);
        let id = event.id();
        run_with_retry(&self.policy, cancel, || source.delete_event(id)).await?;
        self.invalidate_covered_dates(event);
        Ok(())
    }

    /// Flip the completion flag of an event
    pub async fn set_completed(&self, event: &CalendarEvent, completed: bool,
                               cancel: &CancellationToken)
        -> Result<(), StoreError>
    {
        let source = Arc::clone(&self.source);
        let id = event.id();
        run_with_retry(&self.policy, cancel, || source.set_completed(id, completed)).await?;
        self.invalidate_covered_dates(event);
        Ok(())
    }

    /// Drop the cached entries of every date this event covers, so the next read of those
    /// dates goes back to the store
    fn invalidate_covered_dates(&self, event: &CalendarEvent) {
        let mut date = event.date();
        let last = match event.end() {
            Some(end) => end.date_naive(),
            None => date,
        };
        while date <= last {
            self.cache.invalidate(date);
            date = date + Duration::days(1);
        }
    }
}
