//! Job source trait.

use async_trait::async_trait;

/// Produces the jobs a pipeline works on.
///
/// A source is pulled by every worker of a pipeline, one job at a time,
/// behind a lock. Returning `None` means the source is exhausted; the
/// pipeline never calls `next_job` again after that, nor after an error.
///
/// Implementations must be cancel-safe: a pending `next_job` future may be
/// dropped when the pipeline is canceled.
#[async_trait]
pub trait JobSource: Send + 'static {
    /// The job type handed to the transform.
    type Job: Send + 'static;
    /// The error type for a failing source.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Produce the next job, `None` once exhausted.
    async fn next_job(&mut self) -> Option<Result<Self::Job, Self::Error>>;
}
