//! Recovery-timeline calendar events

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};

/// The identifier of a [`CalendarEvent`].
///
/// Events are owned by the external event store; this crate only ever holds transient
/// copies, so the identifier is the one stable handle to reach back into the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId {
    content: Uuid,
}
impl EventId {
    /// Generate a random EventId.
    pub fn random() -> Self {
        Self { content: Uuid::new_v4() }
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.content
    }
}
impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self { content: uuid }
    }
}
impl Display for EventId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.content)
    }
}

/// The kind of recovery event. This enumeration is fixed: the clinician back-end only
/// ever emits these categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// A medication intake
    Medication,
    /// The patient is asked to photograph the surgical site
    PhotoCapture,
    /// A video the patient should watch
    VideoInstruction,
    /// An appointment at the clinic
    MedicalVisit,
    /// A free-form recommendation
    GeneralRecommendation,
    /// A restriction or warning the patient must not miss
    CriticalWarning,
}

/// How prominently an event should be surfaced
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

/// The part of the day an event belongs to, for grouping in the day view
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

/// The store models completion as an optional flag plus an optional completion timestamp,
/// yet some combinations make no sense (a completion date on an uncompleted event).
/// This enum provides an API that forbids such impossible combinations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CompletionStatus {
    Completed(Option<DateTime<Utc>>),
    Uncompleted,
}
impl CompletionStatus {
    pub fn is_completed(&self) -> bool {
        match self {
            CompletionStatus::Completed(_) => true,
            _ => false,
        }
    }
}

/// A recovery-timeline item: a medication intake, a photo report request, a visit...
///
/// Instances are transient copies of rows owned by the external event store. The cache
/// layer never merges them: a refreshed date replaces its whole event list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// The event identifier, assigned by whoever created the event
    id: EventId,

    /// The display title of the event
    title: String,
    /// A longer description shown when the event is opened
    description: String,

    /// When the event starts
    start: DateTime<Utc>,
    /// The last moment of the event, for multi-day events (a restriction spanning a week).
    /// `None` for single-day events.
    end: Option<DateTime<Utc>>,

    /// What kind of recovery event this is
    category: EventCategory,
    /// How prominently it should be surfaced
    priority: Priority,
    /// The part of the day it belongs to
    time_of_day: TimeOfDay,

    /// The completion status of this event
    completion_status: CompletionStatus,

    /// The time this event was created.
    /// Can be `None` for events coming from older back-end versions.
    creation_date: Option<DateTime<Utc>>,
    /// The last time this event was modified
    last_modified: DateTime<Utc>,

    /// For time-bounded restrictions: the moment this event stops applying.
    /// `None` for events that never expire.
    expires_at: Option<DateTime<Utc>>,
}

impl CalendarEvent {
    /// Create a brand new event that is not in the store yet.
    /// This will pick a new (random) event ID.
    pub fn new(title: String, category: EventCategory, priority: Priority,
               time_of_day: TimeOfDay, start: DateTime<Utc>) -> Self
    {
        let new_id = EventId::random();
        let new_creation_date = Some(Utc::now());
        let new_last_modified = Utc::now();
        Self::new_with_parameters(new_id, title, String::new(), start, None,
                                  category, priority, time_of_day,
                                  CompletionStatus::Uncompleted,
                                  new_creation_date, new_last_modified, None)
    }

    /// Create a new event instance from data the store already holds
    pub fn new_with_parameters(id: EventId, title: String, description: String,
                               start: DateTime<Utc>, end: Option<DateTime<Utc>>,
                               category: EventCategory, priority: Priority, time_of_day: TimeOfDay,
                               completion_status: CompletionStatus,
                               creation_date: Option<DateTime<Utc>>, last_modified: DateTime<Utc>,
                               expires_at: Option<DateTime<Utc>>,
                            ) -> Self
    {
        Self {
            id,
            title,
            description,
            start,
            end,
            category,
            priority,
            time_of_day,
            completion_status,
            creation_date,
            last_modified,
            expires_at,
        }
    }

    pub fn id(&self) -> EventId                 { self.id          }
    pub fn title(&self) -> &str                 { &self.title      }
    pub fn description(&self) -> &str           { &self.description }
    pub fn start(&self) -> &DateTime<Utc>       { &self.start      }
    pub fn end(&self) -> Option<&DateTime<Utc>> { self.end.as_ref() }
    pub fn category(&self) -> EventCategory     { self.category    }
    pub fn priority(&self) -> Priority          { self.priority    }
    pub fn time_of_day(&self) -> TimeOfDay      { self.time_of_day }
    pub fn completed(&self) -> bool             { self.completion_status.is_completed() }
    pub fn completion_status(&self) -> &CompletionStatus  { &self.completion_status }
    pub fn creation_date(&self) -> Option<&DateTime<Utc>> { self.creation_date.as_ref() }
    pub fn last_modified(&self) -> &DateTime<Utc>         { &self.last_modified }
    pub fn expires_at(&self) -> Option<&DateTime<Utc>>    { self.expires_at.as_ref() }

    /// The calendar date this event starts on (time-of-day truncated).
    /// This is the key the cache layer files it under.
    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// Whether this event covers the given calendar date.
    /// Single-day events cover their start date only; multi-day events cover every date
    /// of their `start..=end` span.
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        let first = self.start.date_naive();
        let last = match &self.end {
            Some(end) => end.date_naive(),
            None => first,
        };
        first <= date && date <= last
    }

    /// Whether this time-bounded event has stopped applying at the given instant.
    /// Events without an expiration never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match &self.expires_at {
            Some(expires_at) => *expires_at <= now,
            None => false,
        }
    }

    fn update_last_modified(&mut self) {
        self.last_modified = Utc::now();
    }

    /// Rename an event.
    /// This updates its "last modified" field
    pub fn set_title(&mut self, new_title: String) {
        self.update_last_modified();
        self.title = new_title;
    }

    pub fn set_description(&mut self, new_description: String) {
        self.update_last_modified();
        self.description = new_description;
    }

    /// Set the completion status
    pub fn set_completion_status(&mut self, new_completion_status: CompletionStatus) {
        self.update_last_modified();
        self.completion_status = new_completion_status;
    }

    /// Set or clear the expiration timestamp of a time-bounded restriction
    pub fn set_expires_at(&mut self, expires_at: Option<DateTime<Utc>>) {
        self.update_last_modified();
        self.expires_at = expires_at;
    }
}
