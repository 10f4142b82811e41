//! Core pool abstractions: tasks, executors, result handles and the pool itself.

pub mod error;
pub mod executor;
pub mod handle;
pub mod task;
pub mod worker_pool;

pub use error::{PoolError, ProcessingError};
pub use executor::WorkerExecutor;
pub use handle::{TaskHandle, Termination};
pub use task::{TaskId, TaskMetadata, UnitId};
pub use worker_pool::{PoolStats, WorkerPool};
