//! Speculative prefetching of calendar dates.
//!
//! The scheduler fills the freshness cache ahead of the user: dates adjacent to the one
//! being looked at, whole ranges for the scrolling view, and a background queue of dates
//! some other component guessed would be needed soon. All store traffic funnels through
//! one counting semaphore, so however many preloads pile up, the backing store never
//! sees more than a bounded number of concurrent fetches.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::FreshnessCache;
use crate::error::StoreError;
use crate::settings::PrefetchSettings;
use crate::store::ResilientEventStore;
use crate::utils::{adjacent_dates, date_sequence};

/// The bounded FIFO of dates awaiting speculative fetch
#[derive(Debug)]
struct PreloadQueue {
    pending: VecDeque<NaiveDate>,
    /// Mirror of `pending` for O(1) duplicate checks
    queued: HashSet<NaiveDate>,
    capacity: usize,
}

impl PreloadQueue {
    fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            queued: HashSet::new(),
            capacity,
        }
    }

    /// Returns whether the date was actually enqueued (it is not when the queue is full
    /// or the date is already pending)
    fn push(&mut self, date: NaiveDate) -> bool {
        if self.pending.len() >= self.capacity {
            log::debug!("Preload queue is full, dropping {}", date);
            return false;
        }
        if self.queued.insert(date) == false {
            return false;
        }
        self.pending.push_back(date);
        true
    }

    fn drain_batch(&mut self, max: usize) -> Vec<NaiveDate> {
        let mut batch = Vec::new();
        while batch.len() < max {
            match self.pending.pop_front() {
                Some(date) => {
                    self.queued.remove(&date);
                    batch.push(date);
                },
                None => break,
            }
        }
        batch
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.queued.clear();
    }

    fn len(&self) -> usize {
        self.pending.len()
    }
}

/// What happened to one batch of per-date fetches
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Dates actually fetched from the store and written through to the cache
    pub fetched: usize,
    /// Dates skipped because the cache already had a fresh entry
    pub fresh: usize,
    /// Dates that failed, with the error that ended their retry loop
    pub failures: Vec<(NaiveDate, StoreError)>,
}

impl BatchOutcome {
    /// Whether any of the failures actually is a cooperative cancellation
    pub fn cancelled(&self) -> bool {
        self.failures.iter().any(|(_, err)| err.is_cancelled())
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

struct BackgroundPreloader {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Computes which dates need loading and fetches them under bounded concurrency.
///
/// The scheduler is meant to be shared behind an [`Arc`]: every method takes `&self`, and
/// the cache handle it hands out can be cloned freely.
pub struct PrefetchScheduler {
    store: ResilientEventStore,
    cache: FreshnessCache,
    settings: PrefetchSettings,
    /// The sole throttle on the backing store
    fetch_permits: Arc<Semaphore>,
    queue: Arc<Mutex<PreloadQueue>>,
    background: Mutex<Option<BackgroundPreloader>>,
}

impl PrefetchScheduler {
    pub fn new(store: ResilientEventStore, cache: FreshnessCache, settings: PrefetchSettings) -> Self {
        let fetch_permits = Arc::new(Semaphore::new(settings.max_concurrent_fetches));
        let queue = Arc::new(Mutex::new(PreloadQueue::new(settings.queue_capacity)));
        Self {
            store,
            cache,
            settings,
            fetch_permits,
            queue,
            background: Mutex::new(None),
        }
    }

    /// The cache this scheduler writes through to
    pub fn cache(&self) -> &FreshnessCache {
        &self.cache
    }

    /// Fetch a set of dates concurrently, bounded by the fetch semaphore.
    /// Failures are collected per date and never abort sibling fetches.
    pub async fn fetch_dates(&self, dates: &[NaiveDate], cancel: &CancellationToken) -> BatchOutcome {
        let mut handles = Vec::with_capacity(dates.len());
        for date in dates.iter().copied() {
            let permits = Arc::clone(&self.fetch_permits);
            let store = self.store.clone();
            let cache = self.cache.clone();
            let settings = self.settings.clone();
            let cancel = cancel.clone();
            handles.push((date, tokio::spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Err(StoreError::Cancelled),
                };
                refresh_date(&store, &cache, &settings, date, &cancel).await
            })));
        }

        let mut outcome = BatchOutcome::default();
        for (date, handle) in handles {
            match handle.await {
                Ok(Ok(true)) => outcome.fetched += 1,
                Ok(Ok(false)) => outcome.fresh += 1,
                Ok(Err(err)) => outcome.failures.push((date, err)),
                Err(join_err) => {
                    outcome.failures.push((date, StoreError::Backend(
                        format!("fetch task ended abruptly: {}", join_err))));
                },
            }
        }
        outcome
    }

    /// Preload the dates around `center`: `days_before` dates before it and `days_after`
    /// dates after it (the center itself is assumed to be loaded already).
    ///
    /// Dates that are still fresh in the cache are skipped; the rest are fetched
    /// concurrently under the semaphore bound. Individual failures are logged and
    /// skipped, so one bad date never spoils its neighbours.
    pub async fn preload_adjacent_dates(&self, center: NaiveDate, days_before: i64, days_after: i64,
                                        cancel: &CancellationToken)
    {
        let candidates: Vec<NaiveDate> = adjacent_dates(center, days_before, days_after)
            .into_iter()
            .filter(|date| self.cache.is_fresh(*date, self.settings.freshness_ttl) == false)
            .collect();
        if candidates.is_empty() {
            log::trace!("All dates around {} are still fresh, nothing to preload", center);
            return;
        }

        log::debug!("Preloading {} dates around {}", candidates.len(), center);
        let outcome = self.fetch_dates(&candidates, cancel).await;
        log_outcome("Adjacent preload", &outcome);
    }

    /// Preload every date from `start` to `end` (both inclusive), in sequential batches
    /// with full bounded concurrency inside each batch.
    ///
    /// The span must be positive and below the sanity ceiling; anything else is a caller
    /// bug and is rejected without touching the store.
    pub async fn preload_date_range(&self, start: NaiveDate, end: NaiveDate,
                                    cancel: &CancellationToken) -> Result<(), StoreError>
    {
        let span = (end - start).num_days() + 1;
        if span <= 0 {
            return Err(StoreError::InvalidRange(
                format!("Range {} to {} is empty or reversed", start, end)));
        }
        if span > self.settings.max_range_days {
            return Err(StoreError::InvalidRange(
                format!("Range {} to {} spans {} days (limit is {})",
                        start, end, span, self.settings.max_range_days)));
        }

        let dates = date_sequence(start, span);
        for batch in dates.chunks(self.settings.range_batch_size) {
            if cancel.is_cancelled() {
                log::debug!("Range preload superseded, stopping before the next batch");
                return Ok(());
            }
            let outcome = self.fetch_dates(batch, cancel).await;
            if outcome.cancelled() {
                log::debug!("Range preload superseded mid-batch");
                return Ok(());
            }
            log_outcome("Range preload", &outcome);
        }
        Ok(())
    }

    /// Remember a date for the background loop to fetch later.
    /// A no-op when the queue is at capacity or the date is already pending.
    pub fn queue_date_for_preload(&self, date: NaiveDate) {
        let mut queue = self.queue.lock().unwrap();
        if queue.push(date) {
            log::trace!("Queued {} for background preload ({} pending)", date, queue.len());
        }
    }

    /// Forget every queued date (e.g. because the user navigated away)
    pub fn clear_preload_queue(&self) {
        self.queue.lock().unwrap().clear();
    }

    /// How many dates are currently awaiting background preload
    pub fn queued_count(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Start the cooperative background loop that drains the preload queue.
    /// A no-op if the loop is already running.
    pub fn start_background_preloading(&self) {
        let mut guard = self.background.lock().unwrap();
        if let Some(background) = guard.as_ref() {
            if background.handle.is_finished() == false {
                log::debug!("Background preloading is already running");
                return;
            }
        }

        let token = CancellationToken::new();
        let loop_token = token.clone();
        let store = self.store.clone();
        let cache = self.cache.clone();
        let settings = self.settings.clone();
        let permits = Arc::clone(&self.fetch_permits);
        let queue = Arc::clone(&self.queue);
        let handle = tokio::spawn(async move {
            background_loop(store, cache, settings, permits, queue, loop_token).await;
        });
        *guard = Some(BackgroundPreloader { token, handle });
        log::info!("Background preloading started");
    }

    /// Signal the background loop to stop and wait for it to wind down
    pub async fn stop_background_preloading(&self) {
        let background = self.background.lock().unwrap().take();
        if let Some(background) = background {
            background.token.cancel();
            if let Err(err) = background.handle.await {
                log::warn!("Background preload task ended abruptly: {}", err);
            }
            log::info!("Background preloading stopped");
        }
    }

}

/// The long-running drain loop: wake on a fixed interval, fetch a handful of queued
/// dates, and degrade to a longer sleep when the store misbehaves rather than dying.
async fn background_loop(store: ResilientEventStore, cache: FreshnessCache,
                         settings: PrefetchSettings, permits: Arc<Semaphore>,
                         queue: Arc<Mutex<PreloadQueue>>, token: CancellationToken)
{
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(settings.poll_interval) => {},
        }

        let batch = queue.lock().unwrap().drain_batch(settings.queue_batch_size);
        if batch.is_empty() {
            continue;
        }
        log::debug!("Background preload: fetching {} queued dates", batch.len());

        let mut degraded = false;
        for date in batch {
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let result = refresh_date(&store, &cache, &settings, date, &token).await;
            drop(permit);

            match result {
                Ok(_) => {},
                Err(err) if err.is_cancelled() => return,
                Err(err) => {
                    log::warn!("Background preload of {} failed: {}. Backing off", date, err);
                    degraded = true;
                },
            }
        }

        if degraded {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(settings.backoff_interval) => {},
            }
        }
    }
}

/// The shared per-date fetch path: freshness short-circuit, store call, cache write-through.
/// The caller is responsible for holding a fetch permit.
async fn refresh_date(store: &ResilientEventStore, cache: &FreshnessCache,
                      settings: &PrefetchSettings, date: NaiveDate, cancel: &CancellationToken)
    -> Result<bool, StoreError>
{
    if cache.is_fresh(date, settings.freshness_ttl) {
        log::trace!("{} is still fresh, skipping the store", date);
        return Ok(false);
    }

    let events = store.events_for_date(date, cancel).await?;
    log::trace!("Fetched {} events for {}", events.len(), date);
    cache.set(date, events);
    Ok(true)
}

fn log_outcome(what: &str, outcome: &BatchOutcome) {
    for (date, err) in &outcome.failures {
        if err.is_cancelled() {
            log::debug!("{} of {} was cancelled", what, date);
        } else {
            log::warn!("{} of {} failed: {}. Skipping it this time", what, date, err);
        }
    }
    log::trace!("{}: {} fetched, {} fresh, {} failed",
                what, outcome.fetched, outcome.fresh, outcome.failures.len());
}
