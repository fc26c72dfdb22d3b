//! Result channel between workers and the consumer.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::config::ResultBuffer;

/// Worker side of the result channel.
pub(crate) enum ResultSender<O> {
    Bounded(mpsc::Sender<O>),
    Unbounded(mpsc::UnboundedSender<O>),
}

impl<O> Clone for ResultSender<O> {
    fn clone(&self) -> Self {
        match self {
            Self::Bounded(tx) => Self::Bounded(tx.clone()),
            Self::Unbounded(tx) => Self::Unbounded(tx.clone()),
        }
    }
}

impl<O> ResultSender<O> {
    /// Deliver a result, waiting for room in a bounded channel.
    ///
    /// Gives the value back if the consumer dropped the stream.
    pub async fn send(&self, value: O) -> Result<(), O> {
        match self {
            Self::Bounded(tx) => tx.send(value).await.map_err(|e| e.0),
            Self::Unbounded(tx) => tx.send(value).map_err(|e| e.0),
        }
    }
}

enum Receiver<O> {
    Bounded(mpsc::Receiver<O>),
    Unbounded(mpsc::UnboundedReceiver<O>),
}

/// Lazily filled sequence of pipeline results, in completion order.
///
/// The stream ends once every worker has stopped. Dropping it before then
/// cancels the pipeline.
pub struct ResultStream<O> {
    rx: Receiver<O>,
}

impl<O> ResultStream<O> {
    /// Receive the next result, `None` once the pipeline has drained.
    pub async fn recv(&mut self) -> Option<O> {
        match &mut self.rx {
            Receiver::Bounded(rx) => rx.recv().await,
            Receiver::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Number of results waiting to be received.
    pub fn len(&self) -> usize {
        match &self.rx {
            Receiver::Bounded(rx) => rx.len(),
            Receiver::Unbounded(rx) => rx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<O> Stream for ResultStream<O> {
    type Item = O;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<O>> {
        match &mut self.get_mut().rx {
            Receiver::Bounded(rx) => rx.poll_recv(cx),
            Receiver::Unbounded(rx) => rx.poll_recv(cx),
        }
    }
}

impl<O> std::fmt::Debug for ResultStream<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream")
            .field("queued", &self.len())
            .finish_non_exhaustive()
    }
}

/// Create the result channel for the given buffer policy.
pub(crate) fn channel<O>(buffer: ResultBuffer) -> (ResultSender<O>, ResultStream<O>) {
    match buffer {
        ResultBuffer::Bounded(capacity) => {
            let (tx, rx) = mpsc::channel(capacity);
            (
                ResultSender::Bounded(tx),
                ResultStream {
                    rx: Receiver::Bounded(rx),
                },
            )
        }
        ResultBuffer::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                ResultSender::Unbounded(tx),
                ResultStream {
                    rx: Receiver::Unbounded(rx),
                },
            )
        }
    }
}
