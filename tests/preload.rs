
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use recovery_agenda::settings::PrefetchSettings;
use recovery_agenda::traits::EventSource;
use recovery_agenda::{FreshnessCache, PrefetchScheduler, ResilientEventStore, RetryPolicy, StoreError};

use scenarii::{day, sample_event, FakeEventStore, MockBehaviour};

/// A retry policy with short backoffs, so failure tests stay fast
fn fast_retries() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_millis(2),
    }
}

fn build_scheduler(store: &Arc<FakeEventStore>, settings: PrefetchSettings,
                   policy: RetryPolicy) -> Arc<PrefetchScheduler>
{
    let cache = FreshnessCache::new();
    let source: Arc<dyn EventSource> = store.clone();
    let resilient = ResilientEventStore::new(source, cache.clone(), policy);
    Arc::new(PrefetchScheduler::new(resilient, cache, settings))
}


#[tokio::test]
async fn test_range_preload_respects_the_concurrency_bound() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = FakeEventStore::with_fetch_delay(Duration::from_millis(25));
    let settings = PrefetchSettings {
        max_concurrent_fetches: 3,
        // One big batch, so the semaphore is the only thing limiting concurrency
        range_batch_size: 20,
        ..PrefetchSettings::default()
    };
    let scheduler = build_scheduler(&store, settings, fast_retries());

    let cancel = CancellationToken::new();
    scheduler.preload_date_range(day(2024, 3, 1), day(2024, 3, 20), &cancel).await.unwrap();

    assert_eq!(store.date_fetches(), 20);
    assert!(store.max_in_flight() <= 3, "saw {} simultaneous fetches", store.max_in_flight());
    assert!(store.max_in_flight() >= 2, "fetches never overlapped at all");
    assert_eq!(scheduler.cache().len(), 20);
}

#[tokio::test]
async fn test_adjacent_preload_fetches_all_six_neighbours() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = FakeEventStore::with_fetch_delay(Duration::from_millis(5));
    let scheduler = build_scheduler(&store, PrefetchSettings::default(), fast_retries());
    let center = day(2024, 3, 15);

    let cancel = CancellationToken::new();
    scheduler.preload_adjacent_dates(center, 3, 3, &cancel).await;

    assert_eq!(store.date_fetches(), 6);
    assert!(store.max_in_flight() <= 3);
    assert_eq!(scheduler.cache().len(), 6);
    // The center itself is assumed to be displayed already and is not touched
    assert!(scheduler.cache().try_get(center).is_none());
}

#[tokio::test]
async fn test_adjacent_preload_skips_fresh_dates() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = FakeEventStore::new();
    let scheduler = build_scheduler(&store, PrefetchSettings::default(), fast_retries());
    let center = day(2024, 3, 15);

    // Two of the six candidates are already fresh
    scheduler.cache().set(day(2024, 3, 14), Vec::new());
    scheduler.cache().set(day(2024, 3, 16), Vec::new());

    let cancel = CancellationToken::new();
    scheduler.preload_adjacent_dates(center, 3, 3, &cancel).await;

    assert_eq!(store.date_fetches(), 4);
    assert_eq!(scheduler.cache().len(), 6);
}

#[tokio::test]
async fn test_range_preload_rejects_bad_spans() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = FakeEventStore::new();
    let scheduler = build_scheduler(&store, PrefetchSettings::default(), fast_retries());
    let cancel = CancellationToken::new();

    let reversed = scheduler.preload_date_range(day(2024, 3, 10), day(2024, 3, 1), &cancel).await;
    assert!(matches!(reversed, Err(StoreError::InvalidRange(_))));

    let too_large = scheduler.preload_date_range(day(2024, 1, 1), day(2026, 1, 1), &cancel).await;
    assert!(matches!(too_large, Err(StoreError::InvalidRange(_))));

    // The store was never bothered
    assert_eq!(store.date_fetches(), 0);
}

#[tokio::test]
async fn test_failed_dates_do_not_spoil_their_batch() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = FakeEventStore::new();
    store.fail_date(day(2024, 3, 3));
    store.fail_date(day(2024, 3, 7));
    let scheduler = build_scheduler(&store, PrefetchSettings::default(), fast_retries());

    let cancel = CancellationToken::new();
    scheduler.preload_date_range(day(2024, 3, 1), day(2024, 3, 10), &cancel).await.unwrap();

    // The eight healthy dates made it into the cache, the two bad ones were skipped
    assert_eq!(scheduler.cache().len(), 8);
    assert!(scheduler.cache().try_get(day(2024, 3, 3)).is_none());
    assert!(scheduler.cache().try_get(day(2024, 3, 7)).is_none());
    // Permanent failures are not retried: exactly one invocation per date
    assert_eq!(store.date_fetches(), 10);
}

#[tokio::test]
async fn test_transient_store_races_are_retried() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = FakeEventStore::new();
    let date = day(2024, 3, 15);
    store.insert_event(sample_event(date, "Take tacrolimus"));
    // The first three fetches hit a (mocked) disposed data-access context
    store.set_behaviour(MockBehaviour {
        events_for_date_behaviour: (0, 3),
        ..MockBehaviour::default()
    });
    let scheduler = build_scheduler(&store, PrefetchSettings::default(), fast_retries());

    let cancel = CancellationToken::new();
    scheduler.preload_date_range(date, date, &cancel).await.unwrap();

    // Three failed attempts, then the fourth one succeeded
    assert_eq!(store.date_fetches(), 4);
    let (events, _) = scheduler.cache().try_get(date).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title(), "Take tacrolimus");
}

#[tokio::test]
async fn test_write_failures_propagate_after_retries() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = FakeEventStore::new();
    store.set_behaviour(MockBehaviour {
        add_event_behaviour: (0, 99),
        ..MockBehaviour::default()
    });
    let cache = FreshnessCache::new();
    let source: Arc<dyn EventSource> = store.clone();
    let resilient = ResilientEventStore::new(source, cache.clone(), fast_retries());

    let event = sample_event(day(2024, 3, 15), "Photo of the scar");
    let cancel = CancellationToken::new();
    let result = resilient.add_event(&event, &cancel).await;

    // Unlike reads, a lost write must not be silent
    assert!(matches!(result, Err(StoreError::ConnectionDisposed(_))));
}

#[tokio::test]
async fn test_successful_writes_invalidate_the_cached_date() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = FakeEventStore::new();
    let cache = FreshnessCache::new();
    let source: Arc<dyn EventSource> = store.clone();
    let resilient = ResilientEventStore::new(source, cache.clone(), fast_retries());

    let date = day(2024, 3, 15);
    cache.set(date, Vec::new());

    let event = sample_event(date, "Photo of the scar");
    let cancel = CancellationToken::new();
    resilient.add_event(&event, &cancel).await.unwrap();

    // The stale (now wrong) entry is gone, so the next read refetches
    assert!(cache.try_get(date).is_none());
}

#[tokio::test]
async fn test_range_reads_go_through_the_facade() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = FakeEventStore::new();
    store.insert_event(sample_event(day(2024, 3, 10), "Blood sample"));
    store.insert_event(sample_event(day(2024, 3, 12), "Take tacrolimus"));
    store.insert_event(sample_event(day(2024, 4, 2), "Checkup visit"));
    let cache = FreshnessCache::new();
    let source: Arc<dyn EventSource> = store.clone();
    let resilient = ResilientEventStore::new(source, cache, fast_retries());

    let cancel = CancellationToken::new();
    let events = resilient.events_for_range(day(2024, 3, 1), day(2024, 3, 31), &cancel)
        .await.unwrap();

    // Only the two March events are in range
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn test_completing_an_event_updates_the_store_and_invalidates_the_cache() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = FakeEventStore::new();
    let date = day(2024, 3, 15);
    let event = sample_event(date, "Take tacrolimus");
    store.insert_event(event.clone());

    let cache = FreshnessCache::new();
    let source: Arc<dyn EventSource> = store.clone();
    let resilient = ResilientEventStore::new(source, cache.clone(), fast_retries());
    cache.set(date, vec![event.clone()]);

    let cancel = CancellationToken::new();
    resilient.set_completed(&event, true, &cancel).await.unwrap();

    assert!(cache.try_get(date).is_none());
    let stored = store.events_for_date(date).await.unwrap();
    assert!(stored[0].completed());
}

#[tokio::test]
async fn test_deleting_an_unknown_event_fails_fast() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = FakeEventStore::new();
    let cache = FreshnessCache::new();
    let source: Arc<dyn EventSource> = store.clone();
    let resilient = ResilientEventStore::new(source, cache, fast_retries());

    let never_added = sample_event(day(2024, 3, 15), "Ghost event");
    let cancel = CancellationToken::new();
    let result = resilient.delete_event(&never_added, &cancel).await;

    // Not-found is permanent: surfaced immediately, no retries
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_queue_is_bounded_and_deduplicated() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = FakeEventStore::new();
    let settings = PrefetchSettings {
        queue_capacity: 3,
        ..PrefetchSettings::default()
    };
    let scheduler = build_scheduler(&store, settings, fast_retries());

    scheduler.queue_date_for_preload(day(2024, 3, 1));
    scheduler.queue_date_for_preload(day(2024, 3, 2));
    scheduler.queue_date_for_preload(day(2024, 3, 2)); // duplicate, ignored
    scheduler.queue_date_for_preload(day(2024, 3, 3));
    scheduler.queue_date_for_preload(day(2024, 3, 4)); // over capacity, ignored
    assert_eq!(scheduler.queued_count(), 3);

    scheduler.clear_preload_queue();
    assert_eq!(scheduler.queued_count(), 0);
}

#[tokio::test]
async fn test_background_loop_drains_the_queue() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = FakeEventStore::new();
    let settings = PrefetchSettings {
        poll_interval: Duration::from_millis(30),
        ..PrefetchSettings::default()
    };
    let scheduler = build_scheduler(&store, settings, fast_retries());

    scheduler.queue_date_for_preload(day(2024, 3, 1));
    scheduler.queue_date_for_preload(day(2024, 3, 2));
    scheduler.queue_date_for_preload(day(2024, 3, 3));

    scheduler.start_background_preloading();
    // Starting again while running is a no-op
    scheduler.start_background_preloading();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(scheduler.cache().len(), 3);
    assert_eq!(scheduler.queued_count(), 0);

    scheduler.stop_background_preloading().await;

    // Once stopped, queued dates stay queued
    scheduler.queue_date_for_preload(day(2024, 3, 4));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(scheduler.cache().len(), 3);
    assert_eq!(scheduler.queued_count(), 1);
}

#[tokio::test]
async fn test_background_loop_survives_store_failures() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = FakeEventStore::new();
    let bad = day(2024, 3, 1);
    let good = day(2024, 3, 2);
    store.fail_date(bad);

    let settings = PrefetchSettings {
        poll_interval: Duration::from_millis(20),
        backoff_interval: Duration::from_millis(100),
        ..PrefetchSettings::default()
    };
    let scheduler = build_scheduler(&store, settings, fast_retries());

    scheduler.queue_date_for_preload(bad);
    scheduler.queue_date_for_preload(good);
    scheduler.start_background_preloading();

    // The failing date is logged and skipped, its batch sibling still gets fetched
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(scheduler.cache().try_get(good).is_some());
    assert!(scheduler.cache().try_get(bad).is_none());

    // The loop degraded to the longer interval but kept running
    store.heal_date(bad);
    scheduler.queue_date_for_preload(bad);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(scheduler.cache().try_get(bad).is_some());

    scheduler.stop_background_preloading().await;
}

#[tokio::test]
async fn test_cancelled_preload_stops_quietly() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = FakeEventStore::new();
    let scheduler = build_scheduler(&store, PrefetchSettings::default(), fast_retries());

    let cancel = CancellationToken::new();
    cancel.cancel();
    scheduler.preload_date_range(day(2024, 3, 1), day(2024, 3, 10), &cancel).await.unwrap();

    // Nothing was fetched, and nothing was reported as an error
    assert_eq!(store.date_fetches(), 0);
    assert!(scheduler.cache().is_empty());
}
