//! Caller-facing parse entry point with a synchronous fallback.
//!
//! Request handlers call [`DocumentParser::parse`] and never care where the
//! work ran: on a pool unit when the pool is healthy, or inline on the calling
//! thread when the pool is absent, saturated or shut down.

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::WorkerPoolConfig;
use crate::core::{PoolError, PoolStats, Termination, WorkerPool};

use super::extract::{extract_text, Document, ExtractError, TextExtractor};

/// Pool specialised for document text extraction.
pub type ParsePool = WorkerPool<Document, String, TextExtractor>;

/// Failure to parse a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The document itself could not be processed.
    #[error("{0}")]
    Extract(String),
    /// The pool failed the task for a reason unrelated to the document.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl From<ExtractError> for ParseError {
    fn from(err: ExtractError) -> Self {
        Self::Extract(err.to_string())
    }
}

/// Where a document was parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePath {
    /// On a pool execution unit.
    Pool,
    /// Synchronously on the caller's thread.
    Inline,
}

/// Document parser that prefers the worker pool and falls back to inline work.
pub struct DocumentParser {
    pool: Option<ParsePool>,
}

impl DocumentParser {
    /// Parser backed by a worker pool.
    ///
    /// If the pool cannot be created the parser degrades to inline parsing
    /// rather than failing.
    #[must_use]
    pub fn with_pool(config: WorkerPoolConfig) -> Self {
        match WorkerPool::new(config, TextExtractor) {
            Ok(pool) => Self { pool: Some(pool) },
            Err(e) => {
                warn!(error = %e, "Worker pool unavailable; parsing inline");
                Self { pool: None }
            }
        }
    }

    /// Parser that always works on the caller's thread.
    #[must_use]
    pub const fn inline() -> Self {
        Self { pool: None }
    }

    /// The backing pool, if any.
    #[must_use]
    pub const fn pool(&self) -> Option<&ParsePool> {
        self.pool.as_ref()
    }

    /// Extract text from a document.
    ///
    /// # Errors
    ///
    /// - `ParseError::Extract` when the document is malformed or unsupported
    /// - `ParseError::Pool` when its unit crashed or the task timed out
    pub async fn parse(&self, doc: Document) -> Result<String, ParseError> {
        self.parse_traced(doc).await.map(|(text, _)| text)
    }

    /// Like [`DocumentParser::parse`], also reporting where the work ran.
    ///
    /// # Errors
    ///
    /// See [`DocumentParser::parse`].
    pub async fn parse_traced(&self, doc: Document) -> Result<(String, ParsePath), ParseError> {
        let Some(pool) = &self.pool else {
            return Self::parse_inline(&doc).map(|text| (text, ParsePath::Inline));
        };

        let handle = match pool.execute(doc.clone()) {
            Ok(handle) => handle,
            Err(e @ (PoolError::QueueFull | PoolError::PoolShutdown)) => {
                debug!(error = %e, "Pool rejected document; parsing inline");
                return Self::parse_inline(&doc).map(|text| (text, ParsePath::Inline));
            }
            Err(e) => return Err(e.into()),
        };

        match handle.await {
            Ok(text) => Ok((text, ParsePath::Pool)),
            Err(PoolError::Processing(msg)) => Err(ParseError::Extract(msg)),
            Err(PoolError::PoolShutdown) => {
                debug!("Pool terminated under task; parsing inline");
                Self::parse_inline(&doc).map(|text| (text, ParsePath::Inline))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Synchronous extraction on the caller's thread, with the same output
    /// shape as the pooled path.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::Extract` when the document cannot be processed.
    pub fn parse_inline(doc: &Document) -> Result<String, ParseError> {
        extract_text(doc).map_err(ParseError::from)
    }

    /// Pool statistics, or `None` when parsing inline.
    #[must_use]
    pub fn stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(WorkerPool::stats)
    }

    /// Terminate the backing pool. Later parses run inline.
    pub fn terminate(&self) -> Termination {
        self.pool
            .as_ref()
            .map_or_else(Termination::completed, WorkerPool::terminate)
    }
}
