//! Worker pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default stack size for worker threads (2 MiB).
pub const DEFAULT_THREAD_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Default time to wait for each unit to exit during termination.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

/// Environment variable holding the pool size.
pub const ENV_POOL_SIZE: &str = "PARSE_POOL_SIZE";
/// Environment variable holding the queue bound.
pub const ENV_MAX_QUEUE_DEPTH: &str = "PARSE_POOL_MAX_QUEUE_DEPTH";
/// Environment variable holding the per-task deadline in milliseconds.
pub const ENV_TASK_TIMEOUT_MS: &str = "PARSE_POOL_TASK_TIMEOUT_MS";
/// Environment variable holding the worker thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "PARSE_POOL_THREAD_PREFIX";

/// Default pool size: available parallelism minus one, reserving a core for
/// the caller's own request handling, and never less than one.
#[must_use]
pub fn default_pool_size() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Number of execution units kept alive.
    pub pool_size: usize,
    /// Maximum queued (not yet dispatched) tasks. `None` means unbounded.
    pub max_queue_depth: Option<usize>,
    /// Per-task processing deadline in milliseconds. `None` disables it.
    pub task_timeout_ms: Option<u64>,
    /// Stack size for each worker thread.
    pub thread_stack_size: usize,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
    /// Time to wait for each unit to exit on termination before detaching it.
    pub shutdown_grace_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            max_queue_depth: None,
            task_timeout_ms: None,
            thread_stack_size: DEFAULT_THREAD_STACK_SIZE,
            thread_name_prefix: "parse-unit".into(),
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl WorkerPoolConfig {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of execution units.
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Bound the task queue; submissions beyond it are rejected.
    #[must_use]
    pub fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = Some(depth);
        self
    }

    /// Fail tasks (and replace their unit) once they run longer than `timeout`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub fn with_thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = size;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the per-unit grace period used during termination.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_ms = grace.as_millis() as u64;
        self
    }

    /// Per-task deadline, if configured.
    #[must_use]
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_ms.map(Duration::from_millis)
    }

    /// Grace period for each unit during termination.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.pool_size == 0 {
            return Err("pool_size must be greater than 0".into());
        }
        if self.max_queue_depth == Some(0) {
            return Err("max_queue_depth must be greater than 0 when set".into());
        }
        if self.task_timeout_ms == Some(0) {
            return Err("task_timeout_ms must be greater than 0 when set".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        if self.thread_name_prefix.is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate. Missing fields
    /// take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `PARSE_POOL_*` environment variables, loading a
    /// `.env` file first if one is present.
    ///
    /// # Errors
    ///
    /// Returns a description of a malformed variable or invalid result.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, applying defaults for
    /// missing keys.
    ///
    /// # Errors
    ///
    /// Returns a description of a malformed value or invalid result.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(raw) = lookup(ENV_POOL_SIZE) {
            cfg.pool_size = parse_var(ENV_POOL_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_QUEUE_DEPTH) {
            cfg.max_queue_depth = Some(parse_var(ENV_MAX_QUEUE_DEPTH, &raw)?);
        }
        if let Some(raw) = lookup(ENV_TASK_TIMEOUT_MS) {
            cfg.task_timeout_ms = Some(parse_var(ENV_TASK_TIMEOUT_MS, &raw)?);
        }
        if let Some(prefix) = lookup(ENV_THREAD_NAME_PREFIX) {
            cfg.thread_name_prefix = prefix;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| format!("{key}={raw:?} is invalid: {e}"))
}
