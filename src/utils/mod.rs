///! Some utility functions

use chrono::{Duration, NaiveDate};

use crate::event::{CalendarEvent, EventCategory};

/// The `count` consecutive dates starting at `start` (inclusive).
/// A non-positive count yields an empty sequence.
pub fn date_sequence(start: NaiveDate, count: i64) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut offset = 0;
    while offset < count {
        dates.push(start + Duration::days(offset));
        offset += 1;
    }
    dates
}

/// The dates surrounding `center`: `days_before` dates before it and `days_after` dates
/// after it, in chronological order. The center itself is not included.
pub fn adjacent_dates(center: NaiveDate, days_before: i64, days_after: i64) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut offset = -days_before.max(0);
    while offset <= days_after.max(0) {
        if offset != 0 {
            dates.push(center + Duration::days(offset));
        }
        offset += 1;
    }
    dates
}

/// A debug utility that pretty-prints the events of a date
pub fn print_date_events(date: NaiveDate, events: &[CalendarEvent]) {
    println!("DAY {} ({} events)", date, events.len());
    for event in events {
        print_event(event);
    }
}

pub fn print_event(event: &CalendarEvent) {
    let completion = if event.completed() { "✓" } else { " " };
    let kind = match event.category() {
        EventCategory::Medication => "med",
        EventCategory::PhotoCapture => "photo",
        EventCategory::VideoInstruction => "video",
        EventCategory::MedicalVisit => "visit",
        EventCategory::GeneralRecommendation => "note",
        EventCategory::CriticalWarning => "warn!",
    };
    println!("    {} [{}]\t{}\t{}", completion, kind, event.title(), event.id());
}
