//! Self-healing worker pool backed by dedicated OS threads.
//!
//! The pool keeps a fixed roster of execution units, each an OS thread with
//! its own single-threaded tokio runtime, so CPU-heavy parsing never blocks
//! the caller's runtime. A coordinator thread owns all scheduling state and
//! talks to units purely through channels.
//!
//! # Key Features
//!
//! - **True parallelism**: one OS thread per unit
//! - **Strict FIFO dispatch**: tasks are handed out in submission order
//! - **Self-healing**: a crashed or stuck unit is replaced immediately and the
//!   task it was running fails with a descriptive error
//! - **Exactly-once results**: every accepted task resolves its handle once
//!
//! # Example
//!
//! ```rust,ignore
//! use resume_parse_pool::config::WorkerPoolConfig;
//! use resume_parse_pool::core::WorkerPool;
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::new().with_pool_size(4), my_executor)?;
//! let handle = pool.execute(job)?;
//! let output = handle.await?;
//! pool.terminate().await;
//! ```

mod coordinator;
mod unit;

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::WorkerPoolConfig;
use crate::core::executor::WorkerExecutor;
use crate::core::{PoolError, TaskHandle, TaskMetadata, Termination};
use crate::util::clock::now_ms;

use coordinator::{Coordinator, Event, Task};

/// Snapshot of pool liveness and load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Configured number of execution units.
    pub pool_size: usize,
    /// Units currently alive in the roster.
    pub live_units: usize,
    /// Live units waiting for work.
    pub available: usize,
    /// Live units running a task.
    pub busy: usize,
    /// Tasks waiting for a free unit.
    pub queued: usize,
    /// Tasks currently assigned to a unit.
    pub in_flight: usize,
    /// Total tasks accepted by `execute`.
    pub submitted_tasks: u64,
    /// Total tasks that produced output.
    pub completed_tasks: u64,
    /// Total tasks that failed (processing error, crash or timeout).
    pub failed_tasks: u64,
    /// Total units replaced after a crash.
    pub crashed_units: u64,
    /// Total tasks failed for exceeding their deadline.
    pub timed_out_tasks: u64,
}

impl PoolStats {
    /// Same totals with no live units and nothing queued or running.
    const fn terminated(self) -> Self {
        Self {
            live_units: 0,
            available: 0,
            busy: 0,
            queued: 0,
            in_flight: 0,
            ..self
        }
    }
}

/// Counters shared between the façade and the coordinator.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    /// Accepted but not yet dispatched; drives queue-bound admission.
    pub queued_tasks: AtomicUsize,
    pub submitted_tasks: AtomicU64,
}

/// Worker pool with dedicated OS threads for CPU-bound work.
///
/// Submitting is synchronous bookkeeping: [`WorkerPool::execute`] only hands the
/// task to the coordinator and returns a [`TaskHandle`]. Callers suspend when
/// awaiting that handle.
pub struct WorkerPool<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    config: WorkerPoolConfig,

    /// Event channel into the coordinator.
    events: Sender<Event<P, R>>,

    /// Last snapshot published by the coordinator; answers `stats` once the
    /// coordinator is gone.
    snapshot: Arc<RwLock<PoolStats>>,

    counters: Arc<PoolCounters>,

    /// Set once termination has been requested.
    shutdown: AtomicBool,

    next_task_id: AtomicU64,

    coordinator: Mutex<Option<JoinHandle<()>>>,

    _executor: PhantomData<fn() -> E>,
}

impl<P, R, E> WorkerPool<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    /// Create a pool and spawn `config.pool_size` execution units.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the configuration is invalid
    /// - `PoolError::Internal` if a thread cannot be spawned
    pub fn new(config: WorkerPoolConfig, executor: E) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let (events_tx, events_rx) = unbounded();
        let counters = Arc::new(PoolCounters::default());
        let snapshot = Arc::new(RwLock::new(PoolStats::default()));

        let coordinator = Coordinator::new(
            config.clone(),
            executor,
            events_tx.clone(),
            Arc::clone(&counters),
            Arc::clone(&snapshot),
        )?;
        let join = coordinator.start(events_rx)?;

        info!(
            pool_size = config.pool_size,
            max_queue_depth = ?config.max_queue_depth,
            task_timeout_ms = ?config.task_timeout_ms,
            "WorkerPool initialized"
        );

        Ok(Self {
            config,
            events: events_tx,
            snapshot,
            counters,
            shutdown: AtomicBool::new(false),
            next_task_id: AtomicU64::new(0),
            coordinator: Mutex::new(Some(join)),
            _executor: PhantomData,
        })
    }

    /// Submit a payload for processing on a worker thread.
    ///
    /// # Errors
    ///
    /// - `PoolError::PoolShutdown` if the pool has been terminated
    /// - `PoolError::QueueFull` if a queue bound is configured and reached
    pub fn execute(&self, payload: P) -> Result<TaskHandle<R>, PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }

        if let Some(max) = self.config.max_queue_depth {
            let queued = self.counters.queued_tasks.fetch_add(1, Ordering::AcqRel);
            if queued >= max {
                self.counters.queued_tasks.fetch_sub(1, Ordering::AcqRel);
                warn!(max_queue_depth = max, "Worker pool queue is full");
                return Err(PoolError::QueueFull);
            }
        } else {
            self.counters.queued_tasks.fetch_add(1, Ordering::AcqRel);
        }

        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        let task = Task {
            meta: TaskMetadata {
                id: task_id,
                created_at_ms: now_ms(),
            },
            payload,
            reply,
        };

        if self.events.send(Event::Submit(task)).is_err() {
            self.counters.queued_tasks.fetch_sub(1, Ordering::AcqRel);
            return Err(PoolError::PoolShutdown);
        }

        self.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
        debug!(task_id, "Task submitted to worker pool");
        Ok(TaskHandle::new(task_id, rx))
    }

    /// Current pool statistics.
    ///
    /// Reflects every `execute` call made before it on the same thread. Once
    /// `terminate` has been called the roster and queue read as empty, even
    /// before the returned [`Termination`] completes.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        if !self.shutdown.load(Ordering::Acquire) {
            let (tx, rx) = bounded(1);
            if self.events.send(Event::Stats(tx)).is_ok() {
                if let Ok(stats) = rx.recv() {
                    return stats;
                }
            }
        }
        self.snapshot.read().clone().terminated()
    }

    /// Configuration the pool was built with.
    #[must_use]
    pub const fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Whether `terminate` has been called.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop every execution unit and clear all pool state.
    ///
    /// Queued and in-flight tasks receive no result; their handles resolve to
    /// `PoolError::PoolShutdown`. Later `execute` calls are rejected. Calling
    /// this more than once returns an already-completed signal.
    pub fn terminate(&self) -> Termination {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return Termination::completed();
        }

        let (done, rx) = oneshot::channel();
        if self.events.send(Event::Terminate(done)).is_err() {
            return Termination::completed();
        }

        // The coordinator exits right after signalling; no need to join here.
        drop(self.coordinator.lock().take());
        Termination::new(rx)
    }
}

impl<P, R, E> Drop for WorkerPool<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    fn drop(&mut self) {
        // Signal shutdown but don't wait for units in Drop.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            let (done, _rx) = oneshot::channel();
            let _ = self.events.send(Event::Terminate(done));
            debug!("WorkerPool dropped without explicit terminate - shutting down in background");
        }
    }
}
