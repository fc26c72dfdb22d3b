//! Job sources.
//!
//! - `iter` - a finite, pre-known collection
//! - `generate` / `counter` - unbounded generators that stop only on cancellation
//! - `try_stream` - a fallible async stream, e.g. backed by I/O

mod shared;
mod traits;

pub(crate) use shared::{Pull, SharedSource};
pub use traits::JobSource;

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::pin::Pin;

/// Source over an iterator.
pub struct IterSource<It> {
    iter: It,
}

/// Create a source yielding every item of `items`, then closing.
pub fn iter<T>(items: T) -> IterSource<T::IntoIter>
where
    T: IntoIterator,
{
    IterSource {
        iter: items.into_iter(),
    }
}

#[async_trait]
impl<It> JobSource for IterSource<It>
where
    It: Iterator + Send + 'static,
    It::Item: Send + 'static,
{
    type Job = It::Item;
    type Error = Infallible;

    async fn next_job(&mut self) -> Option<Result<Self::Job, Self::Error>> {
        self.iter.next().map(Ok)
    }
}

/// Source driven by a generator callback.
pub struct GeneratorSource<F> {
    generator: F,
}

/// Create a source that calls `generator` for every job until it returns `None`.
pub fn generate<F, T>(generator: F) -> GeneratorSource<F>
where
    F: FnMut() -> Option<T> + Send + 'static,
    T: Send + 'static,
{
    GeneratorSource { generator }
}

#[async_trait]
impl<F, T> JobSource for GeneratorSource<F>
where
    F: FnMut() -> Option<T> + Send + 'static,
    T: Send + 'static,
{
    type Job = T;
    type Error = Infallible;

    async fn next_job(&mut self) -> Option<Result<T, Infallible>> {
        (self.generator)().map(Ok)
    }
}

/// An incrementing counter starting at `start`.
///
/// Effectively unbounded: it only closes on cancellation (or after yielding
/// `u64::MAX`).
pub fn counter(start: u64) -> GeneratorSource<impl FnMut() -> Option<u64> + Send + 'static> {
    let mut next = Some(start);
    generate(move || {
        let current = next?;
        next = current.checked_add(1);
        Some(current)
    })
}

/// Source over a fallible stream.
pub struct StreamSource<S> {
    stream: Pin<Box<S>>,
}

/// Create a source from a stream of `Result`s. The first `Err` fails the
/// pipeline.
pub fn try_stream<S, T, E>(stream: S) -> StreamSource<S>
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
{
    StreamSource {
        stream: Box::pin(stream),
    }
}

#[async_trait]
impl<S, T, E> JobSource for StreamSource<S>
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Job = T;
    type Error = E;

    async fn next_job(&mut self) -> Option<Result<T, E>> {
        self.stream.next().await
    }
}
