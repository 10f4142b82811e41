//! Pool coordinator: the single owner of roster, queue and outstanding state.
//!
//! The coordinator runs on its own thread and consumes every state change as
//! an [`Event`] from one channel, so roster/queue/table mutation is serialized
//! without locks. Units never touch this state; they only send events.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::WorkerPoolConfig;
use crate::core::executor::WorkerExecutor;
use crate::core::{PoolError, ProcessingError, TaskId, TaskMetadata, UnitId};

use super::unit::{spawn_unit, Dispatch, UnitHandle};
use super::{PoolCounters, PoolStats};

/// Delay before retrying a failed replacement spawn.
const RESPAWN_RETRY: Duration = Duration::from_millis(100);

/// A submitted task owned by the coordinator until it resolves.
pub(crate) struct Task<P, R> {
    pub meta: TaskMetadata,
    pub payload: P,
    pub reply: oneshot::Sender<Result<R, PoolError>>,
}

/// Messages consumed by the coordinator.
pub(crate) enum Event<P, R> {
    /// New work from the façade.
    Submit(Task<P, R>),
    /// A unit finished a task, successfully or with a processing failure.
    Finished {
        unit: UnitId,
        task_id: TaskId,
        outcome: Result<R, ProcessingError>,
    },
    /// A unit died; `task_id` is the task it was running, if known.
    Crashed {
        unit: UnitId,
        task_id: Option<TaskId>,
        reason: String,
    },
    /// Snapshot request.
    Stats(Sender<PoolStats>),
    /// Stop all units, clear state and exit.
    Terminate(oneshot::Sender<()>),
}

/// Coordinator view of a live unit.
struct UnitSlot<P> {
    tx: Sender<Dispatch<P>>,
    join: JoinHandle<()>,
    current: Option<TaskId>,
}

/// A dispatched task awaiting its unit's report.
struct InFlight<R> {
    unit: UnitId,
    reply: oneshot::Sender<Result<R, PoolError>>,
    deadline: Option<Instant>,
}

/// Whether the event loop keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub(crate) struct Coordinator<P, R, E> {
    config: WorkerPoolConfig,
    executor: E,
    events_tx: Sender<Event<P, R>>,
    roster: HashMap<UnitId, UnitSlot<P>>,
    available: VecDeque<UnitId>,
    queue: VecDeque<Task<P, R>>,
    outstanding: HashMap<TaskId, InFlight<R>>,
    next_unit_id: u64,
    /// Replacements that failed to spawn and must be retried.
    deficit: usize,
    counters: Arc<PoolCounters>,
    snapshot: Arc<RwLock<PoolStats>>,
    completed_tasks: u64,
    failed_tasks: u64,
    crashed_units: u64,
    timed_out_tasks: u64,
}

impl<P, R, E> Coordinator<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    /// Build a coordinator and spawn the initial roster.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Internal` if any initial unit fails to spawn; units
    /// spawned so far are released.
    pub(crate) fn new(
        config: WorkerPoolConfig,
        executor: E,
        events_tx: Sender<Event<P, R>>,
        counters: Arc<PoolCounters>,
        snapshot: Arc<RwLock<PoolStats>>,
    ) -> Result<Self, PoolError> {
        let mut coordinator = Self {
            roster: HashMap::with_capacity(config.pool_size),
            available: VecDeque::with_capacity(config.pool_size),
            queue: VecDeque::new(),
            outstanding: HashMap::with_capacity(config.pool_size),
            next_unit_id: 0,
            deficit: 0,
            config,
            executor,
            events_tx,
            counters,
            snapshot,
            completed_tasks: 0,
            failed_tasks: 0,
            crashed_units: 0,
            timed_out_tasks: 0,
        };

        for _ in 0..coordinator.config.pool_size {
            coordinator
                .spawn_into_roster()
                .map_err(|e| PoolError::Internal(format!("failed to spawn execution unit: {e}")))?;
        }
        coordinator.publish();
        Ok(coordinator)
    }

    /// Move the coordinator onto its own thread.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Internal` if the thread cannot be created.
    pub(crate) fn start(self, events_rx: Receiver<Event<P, R>>) -> Result<JoinHandle<()>, PoolError> {
        let name = format!("{}-coordinator", self.config.thread_name_prefix);
        thread::Builder::new()
            .name(name)
            .spawn(move || self.run(&events_rx))
            .map_err(|e| PoolError::Internal(format!("failed to spawn coordinator: {e}")))
    }

    fn run(mut self, events_rx: &Receiver<Event<P, R>>) {
        info!(pool_size = self.config.pool_size, "Pool coordinator running");
        loop {
            let event = match self.next_wakeup() {
                Some(at) => match events_rx.recv_deadline(at) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match events_rx.recv() {
                    Ok(event) => Some(event),
                    Err(_) => break,
                },
            };

            if let Some(event) = event {
                if self.handle(event) == Flow::Stop {
                    return;
                }
            }

            self.expire_overdue(Instant::now());
            self.replenish();
            self.dispatch();
            self.publish();
        }

        // Channel closed without a Terminate.
        self.shutdown_units();
    }

    fn handle(&mut self, event: Event<P, R>) -> Flow {
        match event {
            Event::Submit(task) => {
                debug!(task_id = task.meta.id, "Task queued");
                self.queue.push_back(task);
            }
            Event::Finished {
                unit,
                task_id,
                outcome,
            } => self.on_finished(unit, task_id, outcome),
            Event::Crashed {
                unit,
                task_id,
                reason,
            } => self.on_crashed(unit, task_id, &reason),
            Event::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Event::Terminate(done) => {
                self.shutdown_units();
                let _ = done.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Route a unit's report back to the waiting caller and recycle the unit.
    fn on_finished(&mut self, unit: UnitId, task_id: TaskId, outcome: Result<R, ProcessingError>) {
        let Some(in_flight) = self.outstanding.remove(&task_id) else {
            warn!(unit_id = unit.0, task_id, "Result for unknown task dropped");
            self.recycle(unit, task_id);
            return;
        };

        if in_flight.unit != unit {
            warn!(
                unit_id = unit.0,
                owner = in_flight.unit.0,
                task_id,
                "Result reported by a unit that does not own the task"
            );
        }

        match outcome {
            Ok(output) => {
                self.completed_tasks += 1;
                let _ = in_flight.reply.send(Ok(output));
            }
            Err(err) => {
                self.failed_tasks += 1;
                debug!(task_id, error = %err, "Task failed in processing routine");
                let _ = in_flight.reply.send(Err(err.into()));
            }
        }
        self.recycle(unit, task_id);
    }

    /// Return a live unit that was running `task_id` to the available set.
    fn recycle(&mut self, unit: UnitId, task_id: TaskId) {
        let Some(slot) = self.roster.get_mut(&unit) else {
            // Retired after a deadline; its thread is on its way out.
            return;
        };
        if slot.current == Some(task_id) {
            slot.current = None;
            self.available.push_back(unit);
        }
    }

    /// Remove a dead unit, fail its task and spawn its replacement.
    fn on_crashed(&mut self, unit: UnitId, reported: Option<TaskId>, reason: &str) {
        let Some(slot) = self.roster.remove(&unit) else {
            debug!(unit_id = unit.0, "Crash report from retired unit ignored");
            return;
        };
        self.available.retain(|id| *id != unit);
        self.crashed_units += 1;
        error!(unit_id = unit.0, reason, "Execution unit crashed; replacing");

        if let Some(task_id) = slot.current.or(reported) {
            if let Some(in_flight) = self.outstanding.remove(&task_id) {
                self.failed_tasks += 1;
                let _ = in_flight.reply.send(Err(PoolError::UnitCrashed(reason.to_string())));
            }
        }
        drop(slot.join);

        self.replace_unit();
    }

    /// Fail every task past its deadline and swap out the stuck units.
    fn expire_overdue(&mut self, now: Instant) {
        let overdue: Vec<TaskId> = self
            .outstanding
            .iter()
            .filter(|(_, f)| f.deadline.is_some_and(|d| d <= now))
            .map(|(id, _)| *id)
            .collect();

        for task_id in overdue {
            let Some(in_flight) = self.outstanding.remove(&task_id) else {
                continue;
            };
            self.timed_out_tasks += 1;
            self.failed_tasks += 1;
            warn!(task_id, unit_id = in_flight.unit.0, "Task exceeded deadline; retiring unit");
            let _ = in_flight.reply.send(Err(PoolError::Timeout));

            // Dropping the slot closes the unit's channel; the thread is
            // detached and exits once its stuck routine returns.
            if self.roster.remove(&in_flight.unit).is_some() {
                self.available.retain(|id| *id != in_flight.unit);
                self.replace_unit();
            }
        }
    }

    fn replace_unit(&mut self) {
        if let Err(e) = self.spawn_into_roster() {
            error!(error = %e, "Failed to spawn replacement unit; will retry");
            self.deficit += 1;
        }
    }

    /// Retry replacements that previously failed to spawn.
    fn replenish(&mut self) {
        while self.deficit > 0 {
            if let Err(e) = self.spawn_into_roster() {
                debug!(error = %e, deficit = self.deficit, "Replacement spawn still failing");
                return;
            }
            self.deficit -= 1;
        }
    }

    fn spawn_into_roster(&mut self) -> std::io::Result<()> {
        let id = UnitId(self.next_unit_id);
        self.next_unit_id += 1;
        let UnitHandle { id, tx, join } = spawn_unit(
            id,
            self.executor.clone(),
            self.events_tx.clone(),
            &self.config.thread_name_prefix,
            self.config.thread_stack_size,
        )?;
        self.roster.insert(
            id,
            UnitSlot {
                tx,
                join,
                current: None,
            },
        );
        self.available.push_back(id);
        debug!(unit_id = id.0, roster = self.roster.len(), "Execution unit added to roster");
        Ok(())
    }

    /// Strict FIFO: pair the oldest queued task with the longest-idle unit.
    fn dispatch(&mut self) {
        while !self.queue.is_empty() {
            let Some(unit) = self.available.pop_front() else {
                break;
            };
            let Some(task) = self.queue.pop_front() else {
                self.available.push_front(unit);
                break;
            };
            let Some(slot) = self.roster.get_mut(&unit) else {
                self.queue.push_front(task);
                continue;
            };

            let Task {
                meta,
                payload,
                reply,
            } = task;
            let task_id = meta.id;

            match slot.tx.send(Dispatch { meta, payload }) {
                Ok(()) => {
                    self.counters.queued_tasks.fetch_sub(1, Ordering::AcqRel);
                    slot.current = Some(task_id);
                    let deadline = self.config.task_timeout().map(|t| Instant::now() + t);
                    self.outstanding.insert(
                        task_id,
                        InFlight {
                            unit,
                            reply,
                            deadline,
                        },
                    );
                    debug!(task_id, unit_id = unit.0, "Task dispatched");
                }
                Err(crossbeam_channel::SendError(Dispatch { meta, payload })) => {
                    // Thread already gone; put the task back and heal the roster.
                    self.queue.push_front(Task {
                        meta,
                        payload,
                        reply,
                    });
                    self.on_crashed(unit, None, "unit channel disconnected");
                }
            }
        }
    }

    /// Earliest instant the loop must wake without an event.
    fn next_wakeup(&self) -> Option<Instant> {
        let deadline = self.outstanding.values().filter_map(|f| f.deadline).min();
        if self.deficit > 0 {
            let retry = Instant::now() + RESPAWN_RETRY;
            return Some(deadline.map_or(retry, |d| d.min(retry)));
        }
        deadline
    }

    fn stats(&self) -> PoolStats {
        let live_units = self.roster.len();
        let available = self.available.len();
        PoolStats {
            pool_size: self.config.pool_size,
            live_units,
            available,
            busy: live_units - available,
            queued: self.queue.len(),
            in_flight: self.outstanding.len(),
            submitted_tasks: self.counters.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks,
            failed_tasks: self.failed_tasks,
            crashed_units: self.crashed_units,
            timed_out_tasks: self.timed_out_tasks,
        }
    }

    fn publish(&self) {
        *self.snapshot.write() = self.stats();
    }

    /// Stop every unit and clear all state.
    ///
    /// Queued and in-flight tasks are dropped without a result; their handles
    /// observe `PoolError::PoolShutdown`.
    fn shutdown_units(&mut self) {
        info!(
            live_units = self.roster.len(),
            queued = self.queue.len(),
            in_flight = self.outstanding.len(),
            "Terminating worker pool"
        );

        self.available.clear();
        let grace = self.config.shutdown_grace();
        let units: Vec<(UnitId, UnitSlot<P>)> = self.roster.drain().collect();

        // Close every channel first so idle units exit in parallel.
        let joins: Vec<(UnitId, JoinHandle<()>)> = units
            .into_iter()
            .map(|(id, slot)| {
                drop(slot.tx);
                (id, slot.join)
            })
            .collect();

        // One grace window for the whole roster, not one per unit.
        let deadline = Instant::now() + grace;
        let unit_count = joins.len();
        for (id, join) in joins {
            join_by(id, join, deadline);
        }

        self.queue.clear();
        self.outstanding.clear();
        self.deficit = 0;
        self.counters.queued_tasks.store(0, Ordering::Release);
        self.publish();

        info!(unit_count, "Worker pool terminated");
    }
}

/// Join a unit thread, detaching it if it has not exited by `deadline`.
fn join_by(id: UnitId, join: JoinHandle<()>, deadline: Instant) {
    if join.is_finished() {
        if join.join().is_err() {
            warn!(unit_id = id.0, "Unit thread panicked during shutdown");
        }
        return;
    }

    let (tx, rx) = crossbeam_channel::bounded(1);
    let waiter = thread::spawn(move || {
        let _ = tx.send(join.join().is_ok());
    });

    match rx.recv_deadline(deadline) {
        Ok(true) => debug!(unit_id = id.0, "Unit joined"),
        Ok(false) => warn!(unit_id = id.0, "Unit thread panicked during shutdown"),
        Err(_) => {
            warn!(unit_id = id.0, "Unit did not exit within grace period - detaching");
            return;
        }
    }
    let _ = waiter.join();
}
