//! Result handles returned to callers.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::{PoolError, TaskId};

/// Asynchronous result of a submitted task.
///
/// Resolves exactly once: with the processed output, with the failure the
/// pool observed for the task, or with [`PoolError::PoolShutdown`] if the pool
/// was terminated before the task finished.
///
/// Await it from async code, or call [`TaskHandle::wait`] from a plain thread.
#[derive(Debug)]
#[must_use = "a task handle does nothing unless awaited or waited on"]
pub struct TaskHandle<R> {
    task_id: TaskId,
    rx: oneshot::Receiver<Result<R, PoolError>>,
}

impl<R> TaskHandle<R> {
    pub(crate) const fn new(task_id: TaskId, rx: oneshot::Receiver<Result<R, PoolError>>) -> Self {
        Self { task_id, rx }
    }

    /// Identifier assigned to the task at submission.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Block the current thread until the task resolves.
    ///
    /// # Errors
    ///
    /// Returns the failure reported for the task, or `PoolError::PoolShutdown`
    /// if the pool dropped it during termination.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context; await
    /// the handle there instead.
    pub fn wait(self) -> Result<R, PoolError> {
        self.rx.blocking_recv().unwrap_or(Err(PoolError::PoolShutdown))
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = Result<R, PoolError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(PoolError::PoolShutdown)))
    }
}

/// Completion signal returned by `WorkerPool::terminate`.
///
/// Resolves once every execution unit has been stopped (or detached after the
/// shutdown grace period) and coordinator state has been cleared.
#[derive(Debug)]
#[must_use = "termination runs in the background; await or wait to observe completion"]
pub struct Termination {
    rx: oneshot::Receiver<()>,
}

impl Termination {
    pub(crate) const fn new(rx: oneshot::Receiver<()>) -> Self {
        Self { rx }
    }

    /// A signal that is already complete.
    pub(crate) fn completed() -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        Self { rx }
    }

    /// Block the current thread until termination has finished.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn wait(self) {
        let _ = self.rx.blocking_recv();
    }
}

impl Future for Termination {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the coordinator is already gone.
        Pin::new(&mut self.get_mut().rx).poll(cx).map(|_| ())
    }
}
