//! # Resume Parse Pool
//!
//! A self-healing worker thread pool that moves CPU-heavy document parsing off
//! the request-handling thread of the resume builder.
//!
//! ## Core Problem Solved
//!
//! Extracting text from uploaded resumes is CPU-bound. Running it on the
//! request runtime stalls every other request on that thread. The pool runs
//! the work on a fixed set of dedicated OS threads instead, and keeps that set
//! at full strength even when a parse panics or hangs.
//!
//! ## Key Features
//!
//! - **Fixed roster of execution units**: one OS thread each, true parallelism
//! - **FIFO dispatch**: a single coordinator thread owns all scheduling state
//! - **Crash supervision**: crashed or stuck units are replaced immediately
//!   and the affected task fails instead of hanging
//! - **Optional backpressure**: bounded queue with synchronous rejection
//! - **Inline fallback**: [`document::DocumentParser`] parses on the caller's
//!   thread when the pool is absent, saturated or shut down
//!
//! ## Example
//!
//! ```rust,ignore
//! use resume_parse_pool::config::WorkerPoolConfig;
//! use resume_parse_pool::document::{Document, DocumentParser};
//!
//! let parser = DocumentParser::with_pool(WorkerPoolConfig::from_env()?);
//! let text = parser.parse(Document::new(upload_bytes, "text/html")).await?;
//! ```
//!
//! For the generic pool, see [`core::WorkerPool`] and `tests/worker_pool_test.rs`.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core pool abstractions: executor trait, task handles and the pool.
pub mod core;
/// Configuration models for the pool.
pub mod config;
/// Document text extraction and the parse façade.
pub mod document;
/// Shared utilities.
pub mod util;

pub use crate::config::WorkerPoolConfig;
pub use crate::core::{
    PoolError, PoolStats, ProcessingError, TaskHandle, TaskMetadata, Termination, WorkerExecutor,
    WorkerPool,
};
