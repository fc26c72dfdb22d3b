//! Pipeline configuration.
//!
//! A `PipelineConfig` can be built in code or deserialized from YAML:
//!
//! ```yaml
//! name: thumbnails
//! workers: ${THUMBNAIL_WORKERS:-8}
//! result_buffer: unbounded
//! deadline_ms: 30000
//! ```

mod vars;

pub use vars::interpolate;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::path::Path;
use std::time::Duration;

use crate::error::{
    ConfigError, EnvInterpolationSnafu, ReadFileSnafu, YamlParseSnafu, ZeroResultBufferSnafu,
    ZeroWorkersSnafu,
};

/// Default number of workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Capacity of the channel carrying results from workers to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultBuffer {
    /// Workers never wait on the consumer.
    Unbounded,
    /// Workers wait once this many results are queued.
    #[serde(untagged)]
    Bounded(usize),
}

/// Configuration for one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Label used in logs and metrics.
    #[serde(default = "default_name")]
    pub name: String,
    /// Number of concurrent workers (fixed for the invocation).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Result channel capacity. Defaults to the worker count.
    #[serde(default)]
    pub result_buffer: Option<ResultBuffer>,
    /// Cancel the pipeline once this many milliseconds have elapsed.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            workers: default_workers(),
            result_buffer: None,
            deadline_ms: None,
        }
    }
}

fn default_name() -> String {
    "pipeline".to_string()
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl PipelineConfig {
    /// Create a configuration with the given worker count.
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_result_buffer(mut self, buffer: ResultBuffer) -> Self {
        self.result_buffer = Some(buffer);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// The result buffer actually used, resolving the default.
    pub fn effective_result_buffer(&self) -> ResultBuffer {
        self.result_buffer
            .unwrap_or(ResultBuffer::Bounded(self.workers))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// Check the invariants a pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.workers >= 1,
            ZeroWorkersSnafu {
                pipeline: &self.name
            }
        );
        ensure!(
            self.effective_result_buffer() != ResultBuffer::Bounded(0),
            ZeroResultBufferSnafu {
                pipeline: &self.name
            }
        );
        Ok(())
    }

    /// Parse and validate a YAML document after environment interpolation.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let text = interpolate(contents).map_err(|errors| EnvInterpolationSnafu { errors }.build())?;
        let config: Self = serde_yaml::from_str(&text).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, interpolate, parse and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        Self::from_yaml(&contents)
    }
}
