//! Bounded concurrent pipeline.
//!
//! A pipeline pulls jobs from a [`JobSource`], applies a [`Transform`] with a
//! fixed number of workers, and streams the results back in completion
//! order:
//!
//! ```text
//!                    ┌──────────┐
//!               ┌──▶ │ worker 0 │ ──┐
//!  ┌────────┐   │    └──────────┘   │    ┌──────────────┐
//!  │ source │ ──┼──▶     ...      ──┼──▶ │ ResultStream │ ──▶ caller
//!  └────────┘   │    ┌──────────┐   │    └──────────────┘
//!               └──▶ │ worker N │ ──┘
//!                    └──────────┘
//! ```
//!
//! At most `workers` jobs are inside the transform at any instant. The first
//! failure (transform, source or panic) cancels the pipeline: in-flight jobs
//! still run to completion but their results are discarded, no new jobs
//! start, and the result stream closes once every worker has stopped.
//! Results of jobs that finished before the cancellation are still
//! delivered, so a canceled pipeline's stream must be drained or dropped.
//! A failure of a job that finishes after a caller cancel or the deadline is
//! logged and counted, but does not become the pipeline's error.
//!
//! Lifecycle: `Created → Running → Draining → Terminated`.

mod completion;
mod control;
mod handle;
mod sink;
mod supervisor;
mod worker;

pub use handle::{CancelHandle, Completion, PipelineResult, RunningPipeline};
pub use sink::ResultStream;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::source::{JobSource, SharedSource};
use crate::transform::Transform;
use control::{Control, ErrorSlot};
use worker::Worker;

/// Why a pipeline was canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller canceled, or dropped the result stream.
    Requested,
    /// A job, the source or a worker failed.
    Failed,
    /// The configured deadline elapsed.
    Deadline,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::Requested => "requested",
            CancelReason::Failed => "failed",
            CancelReason::Deadline => "deadline",
        }
    }
}

/// How a pipeline reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The source was exhausted and every job was processed.
    Drained,
    /// The pipeline was canceled before the source was exhausted.
    Canceled(CancelReason),
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Drained => "drained",
            Termination::Canceled(reason) => reason.as_str(),
        }
    }
}

/// Lifecycle state of one pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Running,
    /// No new work is being started; workers are finishing up.
    Draining,
    /// Every worker has stopped. Final.
    Terminated(Termination),
}

impl PipelineState {
    pub fn termination(&self) -> Option<Termination> {
        match self {
            PipelineState::Terminated(termination) => Some(*termination),
            _ => None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.termination().is_some()
    }
}

/// Accounting for a pipeline that terminated without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub workers: usize,
    /// Jobs taken from the source.
    pub jobs_dispatched: u64,
    /// Results handed to the result stream.
    pub results_emitted: u64,
    /// Results discarded because their job finished after the pipeline was
    /// canceled, or because the result stream was dropped.
    pub results_dropped: u64,
    /// Errors that were logged but not returned: failures after the first,
    /// and failures of jobs that finished after a cancel.
    pub errors_suppressed: u64,
    /// Highest number of jobs inside the transform at once.
    pub peak_in_flight: usize,
    pub termination: Termination,
}

/// Builder for one pipeline invocation.
///
/// # Examples
///
/// ```no_run
/// use std::convert::Infallible;
/// use conveyor::{Pipeline, PipelineConfig, source};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = Pipeline::new(PipelineConfig::new(2))?;
/// let running = pipeline.run(source::iter(1..=5_u64), |x: u64| async move {
///     Ok::<_, Infallible>(x * x)
/// });
/// let (squares, outcome) = running.collect().await;
/// assert_eq!(squares.len(), 5);
/// outcome?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    parent: Option<CancellationToken>,
    global_limit: Option<Arc<Semaphore>>,
}

impl Pipeline {
    /// Create a pipeline from a validated configuration.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            parent: None,
            global_limit: None,
        })
    }

    /// Cancel this pipeline when `parent` is canceled.
    ///
    /// The pipeline uses a child token, so its own cancellation (on error,
    /// deadline or `cancel()`) never propagates back to `parent`.
    pub fn with_shutdown(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Share a concurrency limit with other pipelines.
    ///
    /// Each in-flight job holds one permit, so the total across every
    /// pipeline using `limit` never exceeds its permit count.
    pub fn with_global_limit(mut self, limit: Arc<Semaphore>) -> Self {
        self.global_limit = Some(limit);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start the pipeline and return immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run<S, T>(self, source: S, transform: T) -> RunningPipeline<T::Output, T::Error>
    where
        S: JobSource,
        T: Transform<S::Job>,
    {
        let Self {
            config,
            parent,
            global_limit,
        } = self;

        let shutdown = parent.map(|p| p.child_token()).unwrap_or_default();
        let control = Arc::new(Control::new(config.name.clone(), config.workers, shutdown));
        let errors = Arc::new(ErrorSlot::new(control.clone()));
        let (sink, results) = sink::channel(config.effective_result_buffer());
        let source = Arc::new(SharedSource::new(source));
        let transform = Arc::new(transform);

        let mut workers = JoinSet::new();
        for id in 0..config.workers {
            let worker = Worker {
                id,
                source: source.clone(),
                transform: transform.clone(),
                sink: sink.clone(),
                control: control.clone(),
                errors: errors.clone(),
                global_limit: global_limit.clone(),
            };
            workers.spawn(worker.run());
        }
        // Only workers hold senders, so the stream closes when the last one stops.
        drop(sink);

        control.mark_running();
        info!(
            pipeline = %config.name,
            workers = config.workers,
            "Spawned {} workers",
            config.workers
        );

        let supervisor = tokio::spawn(supervisor::supervise(
            control.clone(),
            errors,
            workers,
            config.deadline(),
        ));

        RunningPipeline::new(results, control, supervisor)
    }
}

/// Start a pipeline with `workers` workers, canceled along with `cancel`.
///
/// Shorthand for [`Pipeline::new`] + [`Pipeline::with_shutdown`] +
/// [`Pipeline::run`] with an otherwise default configuration.
pub fn run<S, T>(
    source: S,
    transform: T,
    workers: usize,
    cancel: CancellationToken,
) -> Result<RunningPipeline<T::Output, T::Error>, ConfigError>
where
    S: JobSource,
    T: Transform<S::Job>,
{
    let pipeline = Pipeline::new(PipelineConfig::new(workers))?.with_shutdown(cancel);
    Ok(pipeline.run(source, transform))
}
