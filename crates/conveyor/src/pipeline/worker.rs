//! Worker loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace, warn};

use super::control::{Control, ErrorSlot};
use super::sink::ResultSender;
use super::CancelReason;
use crate::emit;
use crate::error::PipelineError;
use crate::metrics::events::{JobCompleted, JobDispatched, JobStatus, ResultDropped};
use crate::source::{JobSource, Pull, SharedSource};
use crate::transform::Transform;

/// Why a worker left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    SourceClosed,
    Canceled,
    Failed,
    SinkClosed,
}

/// Signals worker completion when dropped, so it happens exactly once no
/// matter how the worker stops.
struct CompletionGuard {
    control: Arc<Control>,
    worker: usize,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.control.worker_exited(self.worker);
    }
}

/// Counts one job as in flight for as long as it lives.
struct InFlight<'a> {
    control: &'a Control,
}

impl<'a> InFlight<'a> {
    fn start(control: &'a Control) -> Self {
        control.job_started();
        Self { control }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.control.job_finished();
    }
}

pub(crate) struct Worker<S, T>
where
    S: JobSource,
    T: Transform<S::Job>,
{
    pub id: usize,
    pub source: Arc<SharedSource<S>>,
    pub transform: Arc<T>,
    pub sink: ResultSender<T::Output>,
    pub control: Arc<Control>,
    pub errors: Arc<ErrorSlot<T::Error>>,
    pub global_limit: Option<Arc<Semaphore>>,
}

impl<S, T> Worker<S, T>
where
    S: JobSource,
    T: Transform<S::Job>,
{
    /// Run until the source closes, the pipeline is canceled, or a job fails.
    pub async fn run(self) {
        let _completion = CompletionGuard {
            control: self.control.clone(),
            worker: self.id,
        };
        let id = self.id;
        let errors = self.errors.clone();

        // The worker (and its sender) is dropped at the end of this
        // statement, before the guard signals completion.
        match AssertUnwindSafe(self.work()).catch_unwind().await {
            Ok(exit) => debug!(worker = id, exit = ?exit, "Worker leaving loop"),
            Err(payload) => {
                errors.record(PipelineError::WorkerPanicked {
                    worker: id,
                    message: panic_message(payload.as_ref()),
                });
            }
        }
    }

    async fn work(self) -> Exit {
        let shutdown = self.control.shutdown.clone();

        loop {
            if shutdown.is_cancelled() {
                return Exit::Canceled;
            }

            let permit = match self.acquire_global_permit().await {
                Some(permit) => permit,
                None => return Exit::Canceled,
            };

            let job = match self.source.pull(&shutdown).await {
                Pull::Job(job) => job,
                Pull::Exhausted => {
                    debug!(pipeline = %self.control.name, worker = self.id, "Job source exhausted");
                    self.control.source_exhausted();
                    return Exit::SourceClosed;
                }
                Pull::Closed => return Exit::SourceClosed,
                Pull::Canceled => {
                    debug!(pipeline = %self.control.name, worker = self.id, "Job source closed on cancellation");
                    return Exit::Canceled;
                }
                Pull::Failed(source) => {
                    self.errors.record(PipelineError::Source { source });
                    return Exit::Failed;
                }
            };

            emit!(JobDispatched {
                pipeline: self.control.name.clone(),
            });
            self.control.job_dispatched();
            let in_flight = InFlight::start(&self.control);
            let started = Instant::now();

            // In-flight jobs always run to completion, cancellation is only
            // observed between jobs.
            let outcome = self.transform.apply(job).await;
            let canceled = self.control.is_cancelled();

            drop(in_flight);
            drop(permit);

            match outcome {
                Ok(output) => {
                    emit!(JobCompleted {
                        status: JobStatus::Success,
                        duration: started.elapsed(),
                        pipeline: self.control.name.clone(),
                    });
                    if canceled {
                        trace!(pipeline = %self.control.name, worker = self.id, "Dropping result after cancellation");
                        self.discard_result();
                        return Exit::Canceled;
                    }
                    if !self.deliver(output).await {
                        return Exit::SinkClosed;
                    }
                }
                Err(e) => {
                    emit!(JobCompleted {
                        status: JobStatus::Failed,
                        duration: started.elapsed(),
                        pipeline: self.control.name.clone(),
                    });
                    self.errors.record(PipelineError::Transform { source: e });
                    return Exit::Failed;
                }
            }
        }
    }

    /// Hold a permit of the cross-pipeline limit, if one is configured.
    ///
    /// Returns `None` if the pipeline was canceled while waiting. A closed
    /// limit cancels the pipeline as if the caller had asked.
    async fn acquire_global_permit(&self) -> Option<Option<OwnedSemaphorePermit>> {
        let Some(limit) = &self.global_limit else {
            return Some(None);
        };

        tokio::select! {
            biased;

            _ = self.control.shutdown.cancelled() => None,
            permit = limit.clone().acquire_owned() => match permit {
                Ok(permit) => Some(Some(permit)),
                Err(_) => {
                    warn!(pipeline = %self.control.name, worker = self.id, "Global concurrency limit closed, canceling");
                    self.control.cancel(CancelReason::Requested);
                    None
                }
            },
        }
    }

    /// Hand a result to the consumer, waiting while the channel is full.
    ///
    /// A result whose job finished before cancellation is always delivered;
    /// the wait ends early only if the consumer drops the stream. Returns
    /// `false` in that case.
    async fn deliver(&self, output: T::Output) -> bool {
        match self.sink.send(output).await {
            Ok(()) => {
                self.control.result_emitted();
                true
            }
            Err(_) => {
                debug!(pipeline = %self.control.name, worker = self.id, "Result stream dropped, canceling");
                self.discard_result();
                self.control.cancel(CancelReason::Requested);
                false
            }
        }
    }

    fn discard_result(&self) {
        emit!(ResultDropped {
            pipeline: self.control.name.clone(),
        });
        self.control.result_dropped();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_str() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");
    }

    #[test]
    fn test_panic_message_string() {
        let payload: Box<dyn Any + Send> = Box::new(format!("job {}", 3));
        assert_eq!(panic_message(payload.as_ref()), "job 3");
    }

    #[test]
    fn test_panic_message_other() {
        let payload: Box<dyn Any + Send> = Box::new(17_u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
