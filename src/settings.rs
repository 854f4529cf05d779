//! Tunables for the prefetch scheduler and the rolling window loader.
//!
//! Everything is plain data handed to constructors; there is deliberately no global
//! configuration state.

use chrono::Duration;

/// Knobs of the [`PrefetchScheduler`](crate::scheduler::PrefetchScheduler)
#[derive(Clone, Debug)]
pub struct PrefetchSettings {
    /// How long a cached date stays fresh before a preload refetches it
    pub freshness_ttl: Duration,
    /// How many store fetches may be in flight at once.
    /// Keeps a burst of speculative preloads from exhausting the store's connection pool.
    pub max_concurrent_fetches: usize,
    /// How many dates of a ranged preload are processed per batch
    pub range_batch_size: usize,
    /// Sanity ceiling on the span of a ranged preload, in days
    pub max_range_days: i64,
    /// Capacity of the speculative preload queue
    pub queue_capacity: usize,
    /// How many queued dates a background iteration drains at most
    pub queue_batch_size: usize,
    /// How long the background loop sleeps between iterations
    pub poll_interval: std::time::Duration,
    /// The longer sleep the background loop degrades to after an unexpected failure
    pub backoff_interval: std::time::Duration,
}

impl Default for PrefetchSettings {
    fn default() -> Self {
        Self {
            freshness_ttl: Duration::hours(1),
            max_concurrent_fetches: 3,
            range_batch_size: 5,
            max_range_days: 365,
            queue_capacity: 50,
            queue_batch_size: 5,
            poll_interval: std::time::Duration::from_secs(5),
            backoff_interval: std::time::Duration::from_secs(30),
        }
    }
}

/// Knobs of the [`RollingWindowLoader`](crate::window::RollingWindowLoader)
#[derive(Clone, Debug)]
pub struct WindowSettings {
    /// How many days before "today" the initial window starts
    pub lead_days: i64,
    /// Size of the initial window, in days
    pub initial_days: i64,
    /// How many days each extension appends at the tail
    pub increment_days: i64,
    /// Hard ceiling on the total window span, in days
    pub max_span_days: i64,
    /// How many dates are processed per batch during a load
    pub batch_size: usize,
    /// After a successful load, cache entries older than this many days are evicted
    pub retention_days: i64,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            lead_days: 7,
            initial_days: 90,
            increment_days: 60,
            max_span_days: 365,
            batch_size: 10,
            retention_days: 30,
        }
    }
}
