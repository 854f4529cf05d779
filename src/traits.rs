//! The collaborator seams this crate talks through.
//!
//! The actual event store (an ORM-backed database in the companion app), the UI thread
//! dispatcher and the wall clock all live outside this crate. They are injected through
//! these traits, so that tests can substitute them and so that no component reaches into
//! process-wide static state.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::StoreError;
use crate::event::{CalendarEvent, EventId};

/// The backing event store.
///
/// Every method may be slow (it usually hits a database) and may fail transiently when
/// the shared data-access context is being torn down or rebuilt concurrently; callers are
/// expected to go through [`ResilientEventStore`](crate::store::ResilientEventStore),
/// which wraps each call in the retry layer.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Returns every event that occurs on the given date
    async fn events_for_date(&self, date: NaiveDate) -> Result<Vec<CalendarEvent>, StoreError>;
    /// Returns every event that occurs between `start` and `end` (both inclusive)
    async fn events_for_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<CalendarEvent>, StoreError>;

    /// Persist a new event
    async fn add_event(&self, event: CalendarEvent) -> Result<(), StoreError>;
    /// Overwrite an existing event
    async fn update_event(&self, event: CalendarEvent) -> Result<(), StoreError>;
    /// Delete an event
    async fn delete_event(&self, id: EventId) -> Result<(), StoreError>;
    /// Flip the completion flag of an event
    async fn set_completed(&self, id: EventId, completed: bool) -> Result<(), StoreError>;
}

/// A source of "now", injectable so that freshness tests do not have to sleep
pub trait Clock: std::fmt::Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// The current calendar date (time-of-day truncated)
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// The [`Clock`] everybody uses outside of tests
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Marshals a callback onto the single UI execution context.
///
/// The engine itself is thread-agnostic; only the thin adapter in
/// [`dispatch`](crate::dispatch) ever uses this.
pub trait UiDispatcher: Send + Sync {
    fn run_on_ui_thread(&self, action: Box<dyn FnOnce() + Send>);
}
