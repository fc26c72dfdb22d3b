//! State shared by every entity of one pipeline invocation.
//!
//! Nothing here is process-wide: a fresh `Control` is created per run.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::completion::CompletionCounter;
use super::{CancelReason, PipelineState, PipelineSummary, Termination};
use crate::emit;
use crate::error::PipelineError;
use crate::metrics::events::{ActiveWorkers, ErrorSuppressed, JobsInFlight, PipelineTerminated};

#[derive(Debug, Default)]
struct Stats {
    dispatched: AtomicU64,
    emitted: AtomicU64,
    dropped: AtomicU64,
    suppressed: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Lifecycle, cancellation and accounting for one pipeline.
#[derive(Debug)]
pub(crate) struct Control {
    pub name: String,
    pub workers: usize,
    pub shutdown: CancellationToken,
    cancel_reason: OnceLock<CancelReason>,
    source_exhausted: AtomicBool,
    state: watch::Sender<PipelineState>,
    completion: CompletionCounter,
    stats: Stats,
    started: Instant,
}

impl Control {
    pub fn new(name: String, workers: usize, shutdown: CancellationToken) -> Self {
        let (state, _) = watch::channel(PipelineState::Created);
        Self {
            name,
            workers,
            shutdown,
            cancel_reason: OnceLock::new(),
            source_exhausted: AtomicBool::new(false),
            state,
            completion: CompletionCounter::new(workers),
            stats: Stats::default(),
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn mark_running(&self) {
        self.state.send_if_modified(|state| {
            if *state == PipelineState::Created {
                *state = PipelineState::Running;
                true
            } else {
                false
            }
        });
    }

    /// Move from `Running` to `Draining`; any later state is kept.
    pub fn begin_draining(&self) {
        let changed = self.state.send_if_modified(|state| {
            if matches!(state, PipelineState::Created | PipelineState::Running) {
                *state = PipelineState::Draining;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(pipeline = %self.name, "Pipeline draining");
        }
    }

    /// Request cancellation. Only the first reason is kept.
    pub fn cancel(&self, reason: CancelReason) {
        if self.cancel_reason.set(reason).is_ok() && !self.shutdown.is_cancelled() {
            info!(
                pipeline = %self.name,
                reason = reason.as_str(),
                "Pipeline cancellation requested"
            );
        }
        self.shutdown.cancel();
        self.begin_draining();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Whether the pipeline was canceled for a reason other than a failure,
    /// including cancellation of the caller's parent token.
    fn is_cancelled_without_failure(&self) -> bool {
        self.is_cancelled() && self.cancel_reason.get() != Some(&CancelReason::Failed)
    }

    /// The source reported that it has no more jobs.
    pub fn source_exhausted(&self) {
        self.source_exhausted.store(true, Ordering::Release);
    }

    pub fn job_dispatched(&self) {
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_started(&self) {
        let count = self.stats.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.stats.peak_in_flight.fetch_max(count, Ordering::AcqRel);
        emit!(JobsInFlight {
            count,
            pipeline: self.name.clone(),
        });
    }

    pub fn job_finished(&self) {
        let count = self.stats.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        emit!(JobsInFlight {
            count,
            pipeline: self.name.clone(),
        });
    }

    pub fn result_emitted(&self) {
        self.stats.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn result_dropped(&self) {
        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn error_suppressed(&self, kind: &'static str) {
        self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
        emit!(ErrorSuppressed {
            kind,
            pipeline: self.name.clone(),
        });
    }

    /// Signal that a worker has stopped. Called exactly once per worker.
    pub fn worker_exited(&self, worker: usize) {
        self.begin_draining();
        let drained = self.completion.record();
        emit!(ActiveWorkers {
            count: self.completion.remaining(),
            pipeline: self.name.clone(),
        });
        debug!(
            pipeline = %self.name,
            worker,
            remaining = self.completion.remaining(),
            "Worker stopped"
        );
        if drained {
            self.terminate();
        }
    }

    fn terminate(&self) {
        let termination = self.termination();
        self.state
            .send_replace(PipelineState::Terminated(termination));
        emit!(PipelineTerminated {
            termination,
            duration: self.started.elapsed(),
            pipeline: self.name.clone(),
        });
    }

    /// A run whose source was exhausted counts as drained unless a job
    /// failed or its outcome was discarded, even if a cancel arrived while
    /// the last workers were stopping.
    fn termination(&self) -> Termination {
        let reason = self.cancel_reason.get().copied();
        let completed_every_job = self.source_exhausted.load(Ordering::Acquire)
            && self.stats.dropped.load(Ordering::Acquire) == 0
            && self.stats.suppressed.load(Ordering::Acquire) == 0;

        match reason {
            Some(CancelReason::Failed) => Termination::Canceled(CancelReason::Failed),
            _ if completed_every_job => Termination::Drained,
            _ if self.shutdown.is_cancelled() => {
                Termination::Canceled(reason.unwrap_or(CancelReason::Requested))
            }
            _ => Termination::Drained,
        }
    }

    pub fn is_drained(&self) -> bool {
        self.completion.is_drained()
    }

    /// Snapshot the accounting once the pipeline has terminated.
    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            workers: self.workers,
            jobs_dispatched: self.stats.dispatched.load(Ordering::Acquire),
            results_emitted: self.stats.emitted.load(Ordering::Acquire),
            results_dropped: self.stats.dropped.load(Ordering::Acquire),
            errors_suppressed: self.stats.suppressed.load(Ordering::Acquire),
            peak_in_flight: self.stats.peak_in_flight.load(Ordering::Acquire),
            termination: self.state().termination().unwrap_or(Termination::Drained),
        }
    }
}

/// Holds the first error reported by any worker.
pub(crate) struct ErrorSlot<E>
where
    E: std::error::Error + 'static,
{
    control: Arc<Control>,
    first: Mutex<Option<PipelineError<E>>>,
}

impl<E> ErrorSlot<E>
where
    E: std::error::Error + 'static,
{
    pub fn new(control: Arc<Control>) -> Self {
        Self {
            control,
            first: Mutex::new(None),
        }
    }

    /// Record a failure and cancel the pipeline.
    ///
    /// The first caller wins; later errors are logged and counted, never
    /// surfaced. An error that arrives after the pipeline was canceled for
    /// any other reason is treated the same way. Returns whether this error
    /// became the terminal one.
    pub fn record(&self, err: PipelineError<E>) -> bool {
        if self.control.is_cancelled_without_failure() {
            warn!(
                pipeline = %self.control.name,
                error = %err,
                "Ignoring error after cancellation"
            );
            self.control.error_suppressed(err.kind());
            return false;
        }

        let mut first = self.first.lock().unwrap_or_else(PoisonError::into_inner);
        let kept = if first.is_none() {
            error!(pipeline = %self.control.name, error = %err, "Pipeline failed");
            *first = Some(err);
            true
        } else {
            warn!(
                pipeline = %self.control.name,
                error = %err,
                "Suppressing error after first failure"
            );
            self.control.error_suppressed(err.kind());
            false
        };
        drop(first);

        self.control.cancel(CancelReason::Failed);
        kept
    }

    pub fn take(&self) -> Option<PipelineError<E>> {
        self.first
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
