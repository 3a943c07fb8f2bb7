//! Error types for event operations.

use thiserror::Error;

/// Error raised by a listener's own logic.
///
/// Listeners are free to fail with any error type; it is boxed so that a
/// catcher (or the caller of `emit`) receives it untouched.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Event name or event value is not acceptable.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Listener specification could not be accepted.
    #[error("invalid listener: {0}")]
    InvalidListener(String),

    /// No event registered under this name.
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// A listener failed and had no catcher attached.
    #[error("listener failed while emitting '{event}': {source}")]
    ListenerFailed {
        /// Name of the event being emitted.
        event: String,
        /// The error returned by the listener.
        #[source]
        source: ListenerError,
    },

    /// Lock poisoned (thread panicked while holding lock).
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),
}

impl EventError {
    /// Returns the listener error carried by a `ListenerFailed` error.
    pub fn listener_error(&self) -> Option<&ListenerError> {
        match self {
            EventError::ListenerFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias for event operations.
pub type Result<T> = std::result::Result<T, EventError>;
