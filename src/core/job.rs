//! Job trait and error types.
//!
//! A `Job` is the opaque unit of work a task executes at each due time.
//! Fixed arguments are captured by the implementing closure or struct at
//! construction and used unchanged at every invocation; the scheduler does
//! not inspect them.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Errors a job can report from an invocation.
///
/// The scheduler logs these and keeps the task alive; a failed invocation
/// still counts as one execution.
#[derive(Debug, Error)]
pub enum JobError {
    /// Job execution failed with a message.
    #[error("job failed: {0}")]
    Failed(String),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// The unit of work bound to a task.
///
/// # Example
///
/// ```
/// use metronome::{Job, JobError};
/// use async_trait::async_trait;
///
/// struct Backup {
///     target: String,
/// }
///
/// #[async_trait]
/// impl Job for Backup {
///     async fn run(&self) -> Result<(), JobError> {
///         // back up self.target here
///         let _ = &self.target;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync {
    /// Execute the job once. Return values beyond success/failure are not
    /// interpreted by the scheduler.
    async fn run(&self) -> Result<(), JobError>;
}

#[async_trait]
impl<J: Job + ?Sized> Job for Arc<J> {
    async fn run(&self) -> Result<(), JobError> {
        (**self).run().await
    }
}

/// Adapter turning a plain closure into a [`Job`].
pub struct FnJob<F> {
    f: F,
}

impl<F> FnJob<F>
where
    F: Fn() + Send + Sync,
{
    /// Wrap a closure as a job.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Job for FnJob<F>
where
    F: Fn() + Send + Sync,
{
    async fn run(&self) -> Result<(), JobError> {
        (self.f)();
        Ok(())
    }
}
