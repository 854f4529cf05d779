//! Errors surfaced by the backing event store, and their retry classification

use thiserror::Error;

use crate::event::EventId;

/// An error returned by a call into the backing event store.
///
/// Variants fall into three families that the rest of the crate treats differently:
/// * transient infrastructure races (see [`StoreError::is_transient`]), which the retry
///   layer re-attempts with backoff,
/// * permanent errors (not-found, validation...), which are surfaced immediately,
/// * [`StoreError::Cancelled`], which is never a failure: it aborts retry loops and
///   in-flight batches without being logged as an error.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum StoreError {
    /// The shared data-access context was torn down while the call was in flight.
    /// Typical of concurrent access races on the store connection; retrying usually succeeds.
    #[error("The store context was disposed during {0}")]
    ConnectionDisposed(String),

    /// The store is not done initializing yet. Another race flavour, also worth a retry.
    #[error("The store is still initializing ({0})")]
    StoreInitializing(String),

    /// No event exists for this identifier
    #[error("No event found for id {0}")]
    NotFound(EventId),

    /// The event data was rejected by the store
    #[error("Invalid event data: {0}")]
    InvalidEvent(String),

    /// A date range request was malformed (empty, reversed, or unreasonably large)
    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    /// The caller cancelled the operation. Not a failure.
    #[error("The operation was cancelled")]
    Cancelled,

    /// Any other store failure. Considered permanent.
    #[error("Event store failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error is likely to succeed on retry (an infrastructure race,
    /// as opposed to a permanent error)
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::ConnectionDisposed(_) => true,
            StoreError::StoreInitializing(_) => true,
            _ => false,
        }
    }

    /// Whether this "error" actually is a cooperative cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            StoreError::Cancelled => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(StoreError::ConnectionDisposed("fetch".to_string()).is_transient());
        assert!(StoreError::StoreInitializing("warmup".to_string()).is_transient());
        assert!(StoreError::InvalidEvent("no title".to_string()).is_transient() == false);
        assert!(StoreError::Backend("disk full".to_string()).is_transient() == false);

        assert!(StoreError::Cancelled.is_cancelled());
        assert!(StoreError::Cancelled.is_transient() == false);
        assert!(StoreError::Backend("disk full".to_string()).is_cancelled() == false);
    }
}
