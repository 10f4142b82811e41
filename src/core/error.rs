//! Error types for pool operations.

use thiserror::Error;

/// Errors that can occur when using a `WorkerPool`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The task queue is full; no more tasks can be accepted.
    #[error("task queue is full")]
    QueueFull,

    /// The task ran longer than the configured deadline.
    #[error("operation timed out")]
    Timeout,

    /// The pool has been shut down.
    #[error("pool has been shut down")]
    PoolShutdown,

    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The processing routine ran and reported a failure.
    #[error("task failed: {0}")]
    Processing(String),

    /// The execution unit running the task crashed.
    #[error("execution unit crashed: {0}")]
    UnitCrashed(String),

    /// Internal error (thread spawn failure, runtime build failure, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Logical failure reported by a processing routine.
///
/// The message travels back to the caller inside [`PoolError::Processing`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProcessingError {
    message: String,
}

impl ProcessingError {
    /// Create a processing error from a description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ProcessingError> for PoolError {
    fn from(err: ProcessingError) -> Self {
        Self::Processing(err.message)
    }
}
