//! Transforms applied by pipeline workers.
//!
//! Any `Fn(I) -> impl Future<Output = Result<O, E>>` is a transform. For
//! synchronous functions use [`from_fn`], or [`blocking`] when the work is
//! CPU-heavy and should not run on the async worker threads.
//!
//! A transform is called by up to `workers` tasks at once. It must not rely
//! on shared mutable state without its own synchronization.

use std::future::Future;
use std::sync::Arc;

/// Work applied to every job of a pipeline.
pub trait Transform<I>: Send + Sync + 'static {
    type Output: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    fn apply(&self, job: I) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

impl<I, F, Fut, O, E> Transform<I> for F
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send,
    O: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Output = O;
    type Error = E;

    fn apply(&self, job: I) -> impl Future<Output = Result<O, E>> + Send {
        self(job)
    }
}

/// Transform wrapping a synchronous function run inline on the worker.
#[derive(Debug, Clone)]
pub struct FromFn<F> {
    f: F,
}

/// Use a synchronous, cheap function as a transform.
pub fn from_fn<F>(f: F) -> FromFn<F> {
    FromFn { f }
}

impl<I, F, O, E> Transform<I> for FromFn<F>
where
    I: Send,
    F: Fn(I) -> Result<O, E> + Send + Sync + 'static,
    O: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Output = O;
    type Error = E;

    fn apply(&self, job: I) -> impl Future<Output = Result<O, E>> + Send {
        std::future::ready((self.f)(job))
    }
}

/// Transform running a synchronous function on Tokio's blocking pool.
#[derive(Debug)]
pub struct Blocking<F> {
    f: Arc<F>,
}

impl<F> Clone for Blocking<F> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone() }
    }
}

/// Use a CPU-bound synchronous function as a transform.
///
/// A panic inside `f` is re-raised on the worker, which reports it as
/// [`PipelineError::WorkerPanicked`](crate::PipelineError::WorkerPanicked).
pub fn blocking<F>(f: F) -> Blocking<F> {
    Blocking { f: Arc::new(f) }
}

impl<I, F, O, E> Transform<I> for Blocking<F>
where
    I: Send + 'static,
    F: Fn(I) -> Result<O, E> + Send + Sync + 'static,
    O: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Output = O;
    type Error = E;

    fn apply(&self, job: I) -> impl Future<Output = Result<O, E>> + Send {
        let f = self.f.clone();
        async move {
            match tokio::task::spawn_blocking(move || f(job)).await {
                Ok(result) => result,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => std::panic::resume_unwind(Box::new(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::num::ParseIntError;

    #[tokio::test]
    async fn test_async_closure() {
        let double = |x: u32| async move { Ok::<_, Infallible>(x * 2) };
        assert_eq!(double.apply(21).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_from_fn() {
        let parse = from_fn(|s: &'static str| s.parse::<u8>());
        assert_eq!(parse.apply("7").await.unwrap(), 7);
        let err: ParseIntError = parse.apply("x").await.unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[tokio::test]
    async fn test_blocking_runs_off_worker() {
        let square = blocking(|x: u64| Ok::<_, Infallible>(x * x));
        assert_eq!(square.apply(12).await.unwrap(), 144);
    }

    #[tokio::test]
    async fn test_blocking_reraises_panic() {
        use futures::FutureExt;
        use std::panic::AssertUnwindSafe;

        let boom = blocking(|_: u8| -> Result<u8, Infallible> { panic!("exploded") });
        let caught = AssertUnwindSafe(boom.apply(0)).catch_unwind().await;
        let payload = caught.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"exploded"));
    }
}
