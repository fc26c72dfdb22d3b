//! Supervisor task: joins the workers, enforces the deadline, and produces
//! the pipeline outcome.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{error, info};

use super::control::{Control, ErrorSlot};
use super::{CancelReason, PipelineSummary};
use crate::error::PipelineError;

pub(crate) async fn supervise<E>(
    control: Arc<Control>,
    errors: Arc<ErrorSlot<E>>,
    mut workers: JoinSet<()>,
    deadline: Option<Duration>,
) -> Result<PipelineSummary, PipelineError<E>>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let timer = async move {
        match deadline {
            Some(deadline) => tokio::time::sleep(deadline).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(timer);
    let mut deadline_armed = deadline.is_some();

    loop {
        tokio::select! {
            joined = workers.join_next() => match joined {
                None => break,
                Some(Ok(())) => {}
                // Workers catch their own panics, so this only happens if the
                // runtime shuts down underneath the pipeline.
                Some(Err(e)) => {
                    error!(pipeline = %control.name, error = %e, "Worker task did not complete");
                    control.cancel(CancelReason::Failed);
                }
            },

            _ = &mut timer, if deadline_armed => {
                deadline_armed = false;
                info!(
                    pipeline = %control.name,
                    deadline_ms = deadline.map(|d| d.as_millis()).unwrap_or_default(),
                    "Pipeline deadline elapsed"
                );
                control.cancel(CancelReason::Deadline);
            }
        }
    }

    debug_assert!(control.is_drained(), "all workers joined but not drained");
    let summary = control.summary();

    match errors.take() {
        Some(err) => {
            info!(
                pipeline = %control.name,
                termination = summary.termination.as_str(),
                results = summary.results_emitted,
                "Pipeline terminated with error"
            );
            Err(err)
        }
        None => {
            info!(
                pipeline = %control.name,
                termination = summary.termination.as_str(),
                jobs = summary.jobs_dispatched,
                results = summary.results_emitted,
                dropped = summary.results_dropped,
                suppressed = summary.errors_suppressed,
                "Pipeline terminated"
            );
            Ok(summary)
        }
    }
}
