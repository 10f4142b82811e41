//! Configuration models for the worker pool.

pub mod pool;

pub use pool::{default_pool_size, WorkerPoolConfig};
