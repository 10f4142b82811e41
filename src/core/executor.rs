//! Processing routine abstraction run by execution units.

use async_trait::async_trait;

use super::{ProcessingError, TaskMetadata};

/// Processing routine executed on a dedicated worker thread.
///
/// Every execution unit owns its own clone of the executor, so implementations
/// must not rely on mutable state shared between clones. A routine reports a
/// logical failure (e.g. malformed input) by returning `Err`; a panic is
/// treated as a crash of the unit running it and the unit is replaced.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use resume_parse_pool::core::{ProcessingError, TaskMetadata, WorkerExecutor};
///
/// #[derive(Clone)]
/// struct Upper;
///
/// #[async_trait]
/// impl WorkerExecutor<String, String> for Upper {
///     async fn process(&self, payload: String, _meta: TaskMetadata) -> Result<String, ProcessingError> {
///         Ok(payload.to_uppercase())
///     }
/// }
/// ```
#[async_trait]
pub trait WorkerExecutor<P, R>: Send + Sync + Clone + 'static
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Process a payload and produce exactly one outcome.
    ///
    /// # Threading
    ///
    /// Called from a dedicated worker thread with its own single-threaded
    /// tokio runtime, so blocking CPU work here never stalls the caller.
    async fn process(&self, payload: P, meta: TaskMetadata) -> Result<R, ProcessingError>;
}
