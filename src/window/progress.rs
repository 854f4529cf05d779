//! Utilities to track the progression of a window load

use std::fmt::{Display, Error, Formatter};

/// An event that happens while the rolling window is being loaded or extended
#[derive(Clone, Debug, PartialEq)]
pub enum WindowEvent {
    /// No load has started yet
    NotStarted,
    /// A load has just started but no batch is done yet
    Started,
    /// A load is in progress.
    InProgress { percent: u8, details: String },
    /// The load is finished
    Finished { success: bool },
    /// The window cannot grow any further
    MaximumReached,
}

impl Display for WindowEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match self {
            WindowEvent::NotStarted => write!(f, "Not started"),
            WindowEvent::Started => write!(f, "Loading the calendar..."),
            WindowEvent::InProgress{percent, details} => write!(f, "[{}%] {}...", percent, details),
            WindowEvent::Finished{success} => match success {
                true => write!(f, "Calendar is up to date"),
                false => write!(f, "Loading failed, pull to retry"),
            },
            WindowEvent::MaximumReached => write!(f, "Maximum calendar range reached"),
        }
    }
}

impl Default for WindowEvent {
    fn default() -> Self {
        Self::NotStarted
    }
}



/// See [`feedback_channel`]
pub type FeedbackSender = tokio::sync::watch::Sender<WindowEvent>;
/// See [`feedback_channel`]
pub type FeedbackReceiver = tokio::sync::watch::Receiver<WindowEvent>;

/// Create a feedback channel, that can be used to retrieve the current progress of a
/// window load operation
pub fn feedback_channel() -> (FeedbackSender, FeedbackReceiver) {
    tokio::sync::watch::channel(WindowEvent::default())
}




/// A structure that tracks the progression and the errors that happen during a window load
pub struct WindowProgress {
    n_errors: u32,
    feedback_channel: Option<FeedbackSender>
}
impl WindowProgress {
    pub fn new() -> Self {
        Self { n_errors: 0, feedback_channel: None }
    }
    pub fn new_with_feedback_channel(channel: FeedbackSender) -> Self {
        Self { n_errors: 0, feedback_channel: Some(channel) }
    }


    pub fn is_success(&self) -> bool {
        self.n_errors == 0
    }

    /// Log an error
    pub fn error(&mut self, text: &str) {
        log::error!("{}", text);
        self.n_errors += 1;
    }
    /// Log a warning
    pub fn warn(&mut self, text: &str) {
        log::warn!("{}", text);
        self.n_errors += 1;
    }
    /// Log an info
    pub fn info(&mut self, text: &str) {
        log::info!("{}", text);
    }
    /// Log a debug message
    pub fn debug(&mut self, text: &str) {
        log::debug!("{}", text);
    }
    /// Send an event as a feedback to the listener (if any).
    pub fn feedback(&mut self, event: WindowEvent) {
        self.feedback_channel
            .as_ref()
            .map(|sender| {
                sender.send(event)
            });
    }
}
