//! A job source shared by all workers of one pipeline.

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::JobSource;
use crate::error::BoxError;

/// What a worker gets back when it asks for the next job.
///
/// `Exhausted`, `Canceled` and `Failed` are returned exactly once, to the
/// worker whose pull closed the source. Every later pull sees `Closed`.
#[derive(Debug)]
pub(crate) enum Pull<J> {
    Job(J),
    Exhausted,
    Canceled,
    Failed(BoxError),
    Closed,
}

struct Slot<S> {
    source: S,
    closed: bool,
}

/// Fused wrapper that serializes access to a `JobSource`.
pub(crate) struct SharedSource<S> {
    slot: Mutex<Slot<S>>,
}

impl<S: JobSource> SharedSource<S> {
    pub fn new(source: S) -> Self {
        Self {
            slot: Mutex::new(Slot {
                source,
                closed: false,
            }),
        }
    }

    /// Take the next job, or learn that there are none left.
    ///
    /// Cancellation is checked before the source is asked to produce, and a
    /// pending pull is abandoned as soon as the token fires.
    pub async fn pull(&self, shutdown: &CancellationToken) -> Pull<S::Job> {
        let mut slot = tokio::select! {
            biased;

            _ = shutdown.cancelled() => return Pull::Closed,
            slot = self.slot.lock() => slot,
        };

        if slot.closed {
            return Pull::Closed;
        }
        if shutdown.is_cancelled() {
            slot.closed = true;
            return Pull::Canceled;
        }

        let next = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                slot.closed = true;
                return Pull::Canceled;
            }
            next = slot.source.next_job() => next,
        };

        match next {
            Some(Ok(job)) => Pull::Job(job),
            Some(Err(e)) => {
                slot.closed = true;
                Pull::Failed(Box::new(e))
            }
            None => {
                slot.closed = true;
                Pull::Exhausted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source;
    use futures::stream;
    use std::time::Duration;

    #[tokio::test]
    async fn test_exhausted_is_reported_once() {
        let shared = SharedSource::new(source::iter(vec![7]));
        let token = CancellationToken::new();

        assert!(matches!(shared.pull(&token).await, Pull::Job(7)));
        assert!(matches!(shared.pull(&token).await, Pull::Exhausted));
        assert!(matches!(shared.pull(&token).await, Pull::Closed));
        assert!(matches!(shared.pull(&token).await, Pull::Closed));
    }

    #[tokio::test]
    async fn test_canceled_source_stops_producing() {
        let shared = SharedSource::new(source::counter(0));
        let token = CancellationToken::new();

        assert!(matches!(shared.pull(&token).await, Pull::Job(0)));
        token.cancel();
        // The lock race sees the token first, so the source is never touched.
        assert!(matches!(shared.pull(&token).await, Pull::Closed));
    }

    #[tokio::test]
    async fn test_failure_closes_source() {
        let items: Vec<Result<u8, std::io::Error>> =
            vec![Err(std::io::Error::other("bad record")), Ok(1)];
        let shared = SharedSource::new(source::try_stream(stream::iter(items)));
        let token = CancellationToken::new();

        match shared.pull(&token).await {
            Pull::Failed(e) => assert_eq!(e.to_string(), "bad record"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(matches!(shared.pull(&token).await, Pull::Closed));
    }

    #[tokio::test]
    async fn test_pending_pull_unblocks_on_cancel() {
        let shared = SharedSource::new(source::try_stream(stream::pending::<
            Result<u8, std::io::Error>,
        >()));
        let token = CancellationToken::new();
        let canceler = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceler.cancel();
        });

        let pulled = tokio::time::timeout(Duration::from_secs(1), shared.pull(&token))
            .await
            .expect("pull should return once canceled");
        assert!(matches!(pulled, Pull::Canceled));
    }
}
