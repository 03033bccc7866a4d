//! Error types for event delivery.
//!
//! A handler failure never escapes the scheduler. [`HandlerError`] is what a
//! handler returns; [`DeliveryFailure`] is what the scheduler records and
//! logs for one failed invocation, whether the handler returned an error,
//! panicked, or overran its time budget.

use std::time::Duration;

/// Error returned by an event handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The handler reported a failure.
    #[error("{message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },

    /// The handler propagated an underlying error.
    #[error(transparent)]
    Source(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Build a [`HandlerError::Failed`] from any displayable message.
    pub fn msg(message: impl core::fmt::Display) -> Self {
        Self::Failed {
            message: message.to_string(),
        }
    }
}

/// Why one handler invocation did not complete successfully.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryFailure {
    /// The handler returned an error.
    #[error("handler returned an error: {0}")]
    Failed(#[source] HandlerError),

    /// The handler panicked.
    #[error("handler panicked: {message}")]
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },

    /// The handler did not finish within the configured timeout.
    #[error("handler timed out after {}ms", after.as_millis())]
    TimedOut {
        /// The timeout that elapsed.
        after: Duration,
    },
}
