//! This crate provides the local event data layer of a post-transplant recovery
//! companion app.
//!
//! The backing event store lives behind a slow, occasionally flaky data-access layer, and
//! a user-friendly app wants to display the recovery calendar immediately and scroll it
//! without stutter. This crate therefore keeps an in-memory, per-date
//! [freshness cache](cache::FreshnessCache) of event lists, and fills it ahead of the
//! user with a [prefetch scheduler](scheduler::PrefetchScheduler) that bounds its
//! concurrency so the store is never overwhelmed.
//!
//! Every store call goes through the [resilient facade](store::ResilientEventStore),
//! which retries the transient infrastructure races such stores are prone to. \
//! On top of it all, the [rolling window loader](window::RollingWindowLoader) owns the
//! contiguous span of dates an infinite-scroll calendar view can display, growing it on
//! demand and reporting its progress through a feedback channel.
//!
//! The store itself, the UI thread and the wall clock are external collaborators,
//! injected through the [`traits`] module.

pub mod traits;

mod event;
pub use event::CalendarEvent;
pub use event::CompletionStatus;
pub use event::EventCategory;
pub use event::EventId;
pub use event::Priority;
pub use event::TimeOfDay;

pub mod error;
pub use error::StoreError;

pub mod retry;
pub use retry::RetryPolicy;

pub mod store;
pub use store::ResilientEventStore;

pub mod cache;
pub use cache::FreshnessCache;

pub mod scheduler;
pub use scheduler::PrefetchScheduler;

pub mod window;
pub use window::RollingWindowLoader;

pub mod dispatch;

pub mod settings;
pub mod utils;
