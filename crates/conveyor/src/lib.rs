//! conveyor: a bounded concurrent pipeline for async Rust.
//!
//! Jobs are pulled from a [`JobSource`], run through a [`Transform`] by a
//! fixed number of workers, and streamed back in completion order. The first
//! failure cancels the pipeline, in-flight jobs finish, and the caller gets
//! every result produced before the stop plus the terminal error.
//!
//! - `pipeline/` - Workers, supervisor, cancellation and the running handle
//! - `source/` - Job sources (iterators, generators, fallible streams)
//! - `transform` - The `Transform` trait and sync/blocking adapters
//! - `config/` - Pipeline configuration with environment variable interpolation
//! - `metrics/` - Internal events recorded through the `metrics` facade
//! - `signal` - OS shutdown signals wired to pipeline cancellation
//! - `tracing` - Subscriber setup for binaries and tests
//! - `error` - Error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod signal;
pub mod source;
pub mod tracing;
pub mod transform;

// Re-export commonly used items
pub use config::{DEFAULT_WORKERS, PipelineConfig, ResultBuffer};
pub use error::{BoxError, ConfigError, PipelineError};
pub use pipeline::{
    CancelHandle, CancelReason, Completion, Pipeline, PipelineResult, PipelineState,
    PipelineSummary, ResultStream, RunningPipeline, Termination, run,
};
pub use signal::{cancel_on_shutdown, shutdown_signal};
pub use source::JobSource;
pub use tokio_util::sync::CancellationToken;
pub use crate::tracing::init_tracing;
pub use transform::Transform;
