//! Error types returned by queue operations.

use std::io;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur while using a `DelayQueue`.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue was shut down, or is shutting down.
    #[error("Queue is stopped")]
    Stopped,

    /// `shutdown` was refused because items are still pending.
    #[error("Queue is not empty: {waiting} waiting, {ready} ready")]
    NotEmpty {
        /// Items not yet matured, including one held by the mover task.
        waiting: usize,
        /// Matured items not yet retrieved.
        ready: usize,
    },

    /// No item became available before the deadline.
    #[error("Timed out waiting for an item")]
    Timeout,

    /// The supplied configuration cannot be used.
    #[error("Invalid queue configuration: {0}")]
    InvalidConfig(String),

    /// A background task could not be spawned.
    #[error("Failed to spawn background task: {0}")]
    Spawn(#[source] io::Error),
}

impl QueueError {
    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        assert_eq!(QueueError::Stopped.to_string(), "Queue is stopped");
        assert_eq!(
            QueueError::NotEmpty { waiting: 2, ready: 1 }.to_string(),
            "Queue is not empty: 2 waiting, 1 ready"
        );
        assert_eq!(
            QueueError::invalid_config("tick").to_string(),
            "Invalid queue configuration: tick"
        );
    }

    #[test]
    fn spawn_error_keeps_source() {
        use std::error::Error as _;

        let error = QueueError::Spawn(io::Error::new(io::ErrorKind::Other, "no threads"));
        assert!(error.source().is_some());
    }
}
