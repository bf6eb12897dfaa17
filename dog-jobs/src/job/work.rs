use std::future::Future;
use std::time::Duration;
use async_trait::async_trait;

use crate::WorkError;

/// The opaque body of a job.
///
/// Runs on a worker, never on the control context, and may take as long as it
/// needs. Whatever it returns, the executor marks the job completed afterwards.
#[async_trait]
pub trait WorkUnit: Send + 'static {
    /// Do the work
    async fn run(self: Box<Self>) -> Result<(), WorkError>;
}

/// Work unit backed by an async closure
pub struct FnWork<F>(F);

#[async_trait]
impl<F, Fut> WorkUnit for FnWork<F>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
{
    async fn run(self: Box<Self>) -> Result<(), WorkError> {
        let FnWork(f) = *self;
        f().await
    }
}

/// Wrap an async closure as a work unit
pub fn work_fn<F, Fut>(f: F) -> FnWork<F>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
{
    FnWork(f)
}

/// Work unit backed by a synchronous closure, run on the blocking pool
pub struct BlockingWork<F>(F);

#[async_trait]
impl<F> WorkUnit for BlockingWork<F>
where
    F: FnOnce() -> Result<(), WorkError> + Send + 'static,
{
    async fn run(self: Box<Self>) -> Result<(), WorkError> {
        let BlockingWork(f) = *self;
        // A panic inside `f` comes back as a JoinError, i.e. Interrupted
        tokio::task::spawn_blocking(f).await?
    }
}

/// Wrap a blocking closure as a work unit
pub fn blocking_fn<F>(f: F) -> BlockingWork<F>
where
    F: FnOnce() -> Result<(), WorkError> + Send + 'static,
{
    BlockingWork(f)
}

/// Work that just waits for a fixed time
#[derive(Debug, Clone, Copy)]
pub struct Delay(pub Duration);

#[async_trait]
impl WorkUnit for Delay {
    async fn run(self: Box<Self>) -> Result<(), WorkError> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }
}
