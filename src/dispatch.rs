//! The thin adapter between the engine and the UI thread.
//!
//! The cache, scheduler and loader are thread-agnostic and publish plain values; only
//! this module knows that the presentation layer lives on a single UI execution context.
//! It watches a feedback channel and marshals every event through the injected
//! [`UiDispatcher`] collaborator.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::traits::UiDispatcher;
use crate::window::progress::{FeedbackReceiver, WindowEvent};

/// Spawn a task that forwards every window feedback event onto the UI thread.
///
/// `on_event` runs on the UI context, so it can touch bound view state directly.
/// The task ends when the sending side of the channel is dropped.
pub fn forward_feedback_to_ui(dispatcher: Arc<dyn UiDispatcher>,
                              mut receiver: FeedbackReceiver,
                              on_event: Arc<dyn Fn(WindowEvent) + Send + Sync>) -> JoinHandle<()>
{
    tokio::spawn(async move {
        while receiver.changed().await.is_ok() {
            let event = receiver.borrow_and_update().clone();
            let callback = Arc::clone(&on_event);
            dispatcher.run_on_ui_thread(Box::new(move || callback(event)));
        }
    })
}
