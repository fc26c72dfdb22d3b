//! Internal events emitted by the pipeline runtime.
//!
//! Every metric carries a `pipeline` label holding the configured pipeline
//! name.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

use crate::pipeline::Termination;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    fn emit(self);
}

/// A worker took a job from the source.
pub struct JobDispatched {
    pub pipeline: String,
}

impl InternalEvent for JobDispatched {
    fn emit(self) {
        counter!("conveyor_jobs_dispatched_total", "pipeline" => self.pipeline).increment(1);
    }
}

/// Outcome of a single transform call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }
}

/// A transform call returned.
pub struct JobCompleted {
    pub status: JobStatus,
    pub duration: Duration,
    pub pipeline: String,
}

impl InternalEvent for JobCompleted {
    fn emit(self) {
        trace!(
            status = self.status.as_str(),
            duration_ms = self.duration.as_millis(),
            pipeline = %self.pipeline,
            "Job completed"
        );
        histogram!("conveyor_transform_duration_seconds", "pipeline" => self.pipeline.clone())
            .record(self.duration.as_secs_f64());
        counter!(
            "conveyor_jobs_completed_total",
            "status" => self.status.as_str(),
            "pipeline" => self.pipeline
        )
        .increment(1);
    }
}

/// Number of jobs currently inside a transform.
pub struct JobsInFlight {
    pub count: usize,
    pub pipeline: String,
}

impl InternalEvent for JobsInFlight {
    fn emit(self) {
        gauge!("conveyor_jobs_in_flight", "pipeline" => self.pipeline).set(self.count as f64);
    }
}

/// Number of workers that have not yet signaled completion.
pub struct ActiveWorkers {
    pub count: usize,
    pub pipeline: String,
}

impl InternalEvent for ActiveWorkers {
    fn emit(self) {
        trace!(count = self.count, pipeline = %self.pipeline, "Active workers");
        gauge!("conveyor_workers_active", "pipeline" => self.pipeline).set(self.count as f64);
    }
}

/// A failure was logged but not returned, because the terminal error was
/// already chosen or the pipeline had been canceled.
pub struct ErrorSuppressed {
    pub kind: &'static str,
    pub pipeline: String,
}

impl InternalEvent for ErrorSuppressed {
    fn emit(self) {
        counter!(
            "conveyor_errors_suppressed_total",
            "kind" => self.kind,
            "pipeline" => self.pipeline
        )
        .increment(1);
    }
}

/// A finished result was discarded: its job finished after cancellation, or
/// the result stream was dropped.
pub struct ResultDropped {
    pub pipeline: String,
}

impl InternalEvent for ResultDropped {
    fn emit(self) {
        counter!("conveyor_results_dropped_total", "pipeline" => self.pipeline).increment(1);
    }
}

/// The pipeline reached its terminal state.
pub struct PipelineTerminated {
    pub termination: Termination,
    pub duration: Duration,
    pub pipeline: String,
}

impl InternalEvent for PipelineTerminated {
    fn emit(self) {
        histogram!("conveyor_pipeline_duration_seconds", "pipeline" => self.pipeline.clone())
            .record(self.duration.as_secs_f64());
        counter!(
            "conveyor_pipelines_terminated_total",
            "reason" => self.termination.as_str(),
            "pipeline" => self.pipeline
        )
        .increment(1);
    }
}
