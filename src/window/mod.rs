//! The rolling window of dates materialized for the infinite-scroll calendar view.
//!
//! The loader owns the ordered, contiguous sequence of dates the view can currently
//! display. It materializes an initial window around "today", extends the tail on demand
//! (bounded by a hard ceiling on the total span), reports its progress through a feedback
//! channel, and evicts old cache entries once a load succeeds. A newer load request
//! supersedes any in-flight one by cancelling its token.

use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDate};
use tokio_util::sync::CancellationToken;

use crate::event::CalendarEvent;
use crate::scheduler::PrefetchScheduler;
use crate::settings::WindowSettings;
use crate::traits::{Clock, SystemClock};
use crate::utils::date_sequence;

pub mod progress;
use progress::{FeedbackSender, WindowEvent, WindowProgress};

/// Where the loader currently is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowStatus {
    /// Nothing has been materialized yet
    NotStarted,
    /// A load or extension is in progress
    Loading,
    /// The last load finished successfully
    Completed,
    /// The last load failed; calling [`RollingWindowLoader::extend_window`] again retries
    Error,
    /// The window has grown to its maximum span and will not extend further
    MaximumReached,
}

/// How a load or extension request ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtendOutcome {
    /// The window now contains the requested dates
    Extended,
    /// A newer request cancelled this one before it finished
    Superseded,
    /// A date could not be loaded; the window keeps what was appended so far
    Failed,
    /// The window is already at its maximum span; nothing was changed
    MaximumReached,
}

#[derive(Debug)]
struct LoaderState {
    status: WindowStatus,
    percent: u8,
    message: String,
}

/// Owns the materialized date window and drives its growth.
///
/// All fetching goes through the [`PrefetchScheduler`]'s bounded per-date path; the
/// loader adds no retry layer of its own on top of the store facade's executor. \
/// The window is append-only: it never shrinks and interior dates are never reordered,
/// so the presentation layer can bind to it as a stable, ordered sequence.
pub struct RollingWindowLoader {
    scheduler: Arc<PrefetchScheduler>,
    clock: Arc<dyn Clock>,
    settings: WindowSettings,

    /// The materialized dates, oldest first, always contiguous
    window: Mutex<Vec<NaiveDate>>,
    state: Mutex<LoaderState>,
    /// Token of the load currently allowed to mutate the window. Superseding a load and
    /// appending a batch both serialize through this mutex, so a cancelled load can never
    /// append after its successor has read the tail.
    current_load: Mutex<CancellationToken>,
}

impl RollingWindowLoader {
    pub fn new(scheduler: Arc<PrefetchScheduler>, settings: WindowSettings) -> Self {
        Self::with_clock(scheduler, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(scheduler: Arc<PrefetchScheduler>, settings: WindowSettings,
                      clock: Arc<dyn Clock>) -> Self
    {
        Self {
            scheduler,
            clock,
            settings,
            window: Mutex::new(Vec::new()),
            state: Mutex::new(LoaderState {
                status: WindowStatus::NotStarted,
                percent: 0,
                message: format!("{}", WindowEvent::NotStarted),
            }),
            current_load: Mutex::new(CancellationToken::new()),
        }
    }

    /// Materialize the default window (90 days beginning 7 days before today, with the
    /// default settings), without progress feedback.
    ///
    /// A no-op if the window is already materialized.
    pub async fn load_initial(&self) -> ExtendOutcome {
        self.initial_inner(WindowProgress::new()).await
    }

    /// Same as [`Self::load_initial`], reporting progress through the given channel
    pub async fn load_initial_with_feedback(&self, channel: FeedbackSender) -> ExtendOutcome {
        self.initial_inner(WindowProgress::new_with_feedback_channel(channel)).await
    }

    /// Extend the window tail by the configured increment, without progress feedback.
    ///
    /// Cancels any in-flight load first (rapid successive calls supersede each other).
    /// Refuses to grow past the maximum span, reporting
    /// [`ExtendOutcome::MaximumReached`] and leaving the window untouched.
    pub async fn extend_window(&self) -> ExtendOutcome {
        self.extend_inner(WindowProgress::new()).await
    }

    /// Same as [`Self::extend_window`], reporting progress through the given channel
    pub async fn extend_window_with_feedback(&self, channel: FeedbackSender) -> ExtendOutcome {
        self.extend_inner(WindowProgress::new_with_feedback_channel(channel)).await
    }

    /// The materialized dates, oldest first.
    /// Callers must treat this as a read-only, append-only sequence.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.window.lock().unwrap().clone()
    }

    /// The current total span of the window, in days
    pub fn span_days(&self) -> i64 {
        self.window.lock().unwrap().len() as i64
    }

    /// The cached events of a materialized date. Returns an empty list for dates that
    /// have no cache entry (not fetched yet, or invalidated): the read path degrades
    /// rather than erroring.
    pub fn cached_events(&self, date: NaiveDate) -> Vec<CalendarEvent> {
        match self.scheduler.cache().try_get(date) {
            Some((events, _)) => events,
            None => Vec::new(),
        }
    }

    pub fn status(&self) -> WindowStatus {
        self.state.lock().unwrap().status
    }

    /// Progress of the current (or last) load, 0 to 100
    pub fn progress_percent(&self) -> u8 {
        self.state.lock().unwrap().percent
    }

    /// A human-readable description of the current state
    pub fn status_message(&self) -> String {
        self.state.lock().unwrap().message.clone()
    }


    async fn initial_inner(&self, mut progress: WindowProgress) -> ExtendOutcome {
        if self.window.lock().unwrap().is_empty() == false {
            log::debug!("Initial window is already materialized, nothing to do");
            return ExtendOutcome::Extended;
        }

        let (token, _, _) = self.begin_load();
        let start = self.clock.today() - Duration::days(self.settings.lead_days);
        let dates = date_sequence(start, self.settings.initial_days);
        progress.info(&format!("Materializing the initial window: {} days from {}",
                               dates.len(), start));
        self.run_load(dates, progress, token).await
    }

    async fn extend_inner(&self, mut progress: WindowProgress) -> ExtendOutcome {
        let (token, tail, span) = self.begin_load();

        let tail = match tail {
            Some(tail) => tail,
            None => {
                // Nothing materialized yet: an extension request is served as the initial load
                let start = self.clock.today() - Duration::days(self.settings.lead_days);
                let dates = date_sequence(start, self.settings.initial_days);
                progress.info(&format!("Materializing the initial window: {} days from {}",
                                       dates.len(), start));
                return self.run_load(dates, progress, token).await;
            },
        };

        if span + self.settings.increment_days > self.settings.max_span_days {
            progress.info(&format!("Window already spans {} days, not extending past {}",
                                   span, self.settings.max_span_days));
            self.set_state_guarded(&token, WindowStatus::MaximumReached, 100,
                                   &format!("{}", WindowEvent::MaximumReached));
            progress.feedback(WindowEvent::MaximumReached);
            return ExtendOutcome::MaximumReached;
        }

        let dates = date_sequence(tail + Duration::days(1), self.settings.increment_days);
        progress.info(&format!("Extending the window by {} days after {}", dates.len(), tail));
        self.run_load(dates, progress, token).await
    }

    /// Process `dates` in batches through the scheduler's bounded fetch path, appending
    /// each successful batch to the window and publishing progress after it
    async fn run_load(&self, dates: Vec<NaiveDate>, mut progress: WindowProgress,
                      token: CancellationToken) -> ExtendOutcome
    {
        if dates.is_empty() {
            return ExtendOutcome::Extended;
        }

        self.set_state_guarded(&token, WindowStatus::Loading, 0,
                               &format!("{}", WindowEvent::Started));
        progress.feedback(WindowEvent::Started);

        let total_batches = (dates.len() + self.settings.batch_size - 1) / self.settings.batch_size;
        for (index, batch) in dates.chunks(self.settings.batch_size).enumerate() {
            let outcome = self.scheduler.fetch_dates(batch, &token).await;

            if token.is_cancelled() || outcome.cancelled() {
                progress.debug("Window load superseded by a newer request");
                return ExtendOutcome::Superseded;
            }

            if outcome.is_success() == false {
                for (date, err) in &outcome.failures {
                    progress.error(&format!("Unable to load {}: {}", date, err));
                }
                let percent = ((index * 100) / total_batches) as u8;
                self.set_state_guarded(&token, WindowStatus::Error, percent,
                                       &format!("{}", WindowEvent::Finished{ success: false }));
                progress.feedback(WindowEvent::Finished{ success: false });
                return ExtendOutcome::Failed;
            }

            if self.append_batch(&token, batch) == false {
                progress.debug("Window load superseded by a newer request");
                return ExtendOutcome::Superseded;
            }

            let percent = (((index + 1) * 100) / total_batches) as u8;
            let details = format!("loaded {} to {}", batch[0], batch[batch.len() - 1]);
            self.set_state_guarded(&token, WindowStatus::Loading, percent, &details);
            progress.feedback(WindowEvent::InProgress{ percent, details });
        }

        // Bound memory now that the window grew
        self.scheduler.cache().cleanup_old_entries(self.settings.retention_days);

        self.set_state_guarded(&token, WindowStatus::Completed, 100,
                               &format!("{}", WindowEvent::Finished{ success: true }));
        progress.info("Window load finished");
        progress.feedback(WindowEvent::Finished{ success: true });
        ExtendOutcome::Extended
    }

    /// Cancel whatever load is in flight, install a fresh token, and snapshot the window
    /// tail, all in one critical section
    fn begin_load(&self) -> (CancellationToken, Option<NaiveDate>, i64) {
        let mut current = self.current_load.lock().unwrap();
        current.cancel();
        let fresh = CancellationToken::new();
        *current = fresh.clone();

        let window = self.window.lock().unwrap();
        (fresh, window.last().copied(), window.len() as i64)
    }

    /// Append a batch to the window unless this load has been superseded meanwhile
    fn append_batch(&self, token: &CancellationToken, batch: &[NaiveDate]) -> bool {
        let _current = self.current_load.lock().unwrap();
        if token.is_cancelled() {
            return false;
        }
        self.window.lock().unwrap().extend_from_slice(batch);
        true
    }

    /// Update the observable state unless this load has been superseded meanwhile
    fn set_state_guarded(&self, token: &CancellationToken, status: WindowStatus,
                         percent: u8, message: &str) -> bool
    {
        let _current = self.current_load.lock().unwrap();
        if token.is_cancelled() {
            return false;
        }
        let mut state = self.state.lock().unwrap();
        state.status = status;
        state.percent = percent;
        state.message = message.to_string();
        true
    }
}
