//! Caller-facing handles to a running pipeline.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;

use super::control::Control;
use super::sink::ResultStream;
use super::{CancelReason, PipelineState, PipelineSummary, Termination};
use crate::error::PipelineError;

/// Outcome of a finished pipeline.
pub type PipelineResult<E> = Result<PipelineSummary, PipelineError<E>>;

/// Cloneable handle that cancels a pipeline from any task or thread.
///
/// Canceling is idempotent: the second and later calls have no effect.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    control: Arc<Control>,
}

impl CancelHandle {
    pub(crate) fn new(control: Arc<Control>) -> Self {
        Self { control }
    }

    /// Stop producing jobs and let in-flight ones finish.
    pub fn cancel(&self) {
        self.control.cancel(CancelReason::Requested);
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    pub fn state(&self) -> PipelineState {
        self.control.state()
    }

    /// Wait until the pipeline has terminated.
    pub async fn terminated(&self) -> Termination {
        let mut state = self.control.subscribe();
        state
            .wait_for(|state| state.termination().is_some())
            .await
            .ok()
            .and_then(|state| state.termination())
            .unwrap_or(Termination::Drained)
    }
}

/// Completion half of a running pipeline, see [`RunningPipeline::into_parts`].
#[derive(Debug)]
pub struct Completion<E>
where
    E: std::error::Error + 'static,
{
    cancel: CancelHandle,
    supervisor: JoinHandle<PipelineResult<E>>,
}

impl<E> Completion<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> PipelineState {
        self.cancel.state()
    }

    /// Wait for every worker to stop and return the terminal outcome.
    ///
    /// The result stream must be drained or dropped, even after a cancel:
    /// results of jobs that finished before the cancel are still delivered,
    /// and their workers wait on a full result channel until then.
    pub async fn wait(self) -> PipelineResult<E> {
        match self.supervisor.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(PipelineError::Supervisor {
                message: e.to_string(),
            }),
        }
    }
}

/// A pipeline that has been started.
///
/// Results are received in completion order through [`next`](Self::next) or
/// the [`ResultStream`]. The terminal error, if any, is returned by
/// [`finish`](Self::finish) once the pipeline has drained.
#[derive(Debug)]
pub struct RunningPipeline<O, E>
where
    E: std::error::Error + 'static,
{
    results: ResultStream<O>,
    completion: Completion<E>,
}

impl<O, E> RunningPipeline<O, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub(crate) fn new(
        results: ResultStream<O>,
        control: Arc<Control>,
        supervisor: JoinHandle<PipelineResult<E>>,
    ) -> Self {
        Self {
            results,
            completion: Completion {
                cancel: CancelHandle::new(control),
                supervisor,
            },
        }
    }

    /// Receive the next result, `None` once the pipeline has drained.
    pub async fn next(&mut self) -> Option<O> {
        self.results.recv().await
    }

    pub fn results(&mut self) -> &mut ResultStream<O> {
        &mut self.results
    }

    pub fn cancel(&self) {
        self.completion.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.completion.cancel_handle()
    }

    pub fn state(&self) -> PipelineState {
        self.completion.state()
    }

    /// Split into the result stream and the completion handle, e.g. to
    /// consume results in one task and await the outcome in another.
    pub fn into_parts(self) -> (ResultStream<O>, Completion<E>) {
        (self.results, self.completion)
    }

    /// Drain and discard any remaining results, then return the outcome.
    ///
    /// For an unbounded source, cancel first or this never returns.
    pub async fn finish(mut self) -> PipelineResult<E> {
        while self.results.recv().await.is_some() {}
        self.completion.wait().await
    }

    /// Drain every remaining result into a vector and return the outcome.
    pub async fn collect(self) -> (Vec<O>, PipelineResult<E>) {
        let (results, completion) = self.into_parts();
        let collected: Vec<O> = results.collect().await;
        (collected, completion.wait().await)
    }
}
