//! Error types for conveyor pipelines.
//!
//! `PipelineError` is the single terminal error a pipeline invocation can
//! surface. `ConfigError` covers building and loading a `PipelineConfig`.

use snafu::prelude::*;

/// Boxed error used for job sources, whose concrete error type is erased.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ============ Pipeline Errors ============

/// Terminal error of one pipeline invocation.
///
/// Only the first failure to arrive is kept. Which one that is when several
/// workers fail concurrently is not tied to input order.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError<E>
where
    E: std::error::Error + 'static,
{
    /// The transform failed for one job.
    #[snafu(display("Transform failed: {source}"))]
    Transform { source: E },

    /// The job source failed while producing the next job.
    #[snafu(display("Job source failed: {source}"))]
    Source { source: BoxError },

    /// A worker task panicked.
    #[snafu(display("Worker {worker} panicked: {message}"))]
    WorkerPanicked { worker: usize, message: String },

    /// The supervisor task was torn down before the pipeline drained,
    /// e.g. because the runtime is shutting down.
    #[snafu(display("Pipeline supervisor stopped unexpectedly: {message}"))]
    Supervisor { message: String },
}

impl<E> PipelineError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns the transform error, if this is one.
    pub fn as_transform(&self) -> Option<&E> {
        match self {
            Self::Transform { source } => Some(source),
            _ => None,
        }
    }

    /// Consume the error, returning the transform error if this is one.
    pub fn into_transform(self) -> Option<E> {
        match self {
            Self::Transform { source } => Some(source),
            _ => None,
        }
    }

    /// Short label used for metrics and logs.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Transform { .. } => "transform",
            Self::Source { .. } => "source",
            Self::WorkerPanicked { .. } => "panic",
            Self::Supervisor { .. } => "supervisor",
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur while building or loading a pipeline configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Worker count must be at least one.
    #[snafu(display("Pipeline '{pipeline}' must have at least one worker"))]
    ZeroWorkers { pipeline: String },

    /// A bounded result buffer needs room for at least one result.
    #[snafu(display(
        "Pipeline '{pipeline}' has a zero result buffer (use a positive size or 'unbounded')"
    ))]
    ZeroResultBuffer { pipeline: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{}", errors.join("\n")))]
    EnvInterpolation { errors: Vec<String> },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}
