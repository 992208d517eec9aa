//! Error types shared across the crate.

use thiserror::Error;

/// Errors raised by scheduling operations.
///
/// All variants are synchronous and surface to the immediate caller;
/// nothing is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation was attempted in a lifecycle state that forbids it,
    /// such as configuring a running task or stopping an idle one.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A task with the same name is already registered.
    #[error("duplicate task name: {0}")]
    DuplicateName(String),

    /// No task with the given name is registered.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// A time string failed its grammar, or a numeric time argument was
    /// out of range (weekday name, day of month, repeat count).
    #[error("invalid time format: {0}")]
    TimeFormat(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    pub(crate) fn time_format(msg: impl Into<String>) -> Self {
        Error::TimeFormat(msg.into())
    }
}
