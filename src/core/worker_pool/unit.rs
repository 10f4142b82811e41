//! Execution unit: one OS thread running the processing routine.
//!
//! A unit blocks on its private dispatch channel, runs one task at a time on a
//! single-threaded tokio runtime, and reports each outcome to the coordinator
//! as an [`Event`]. A panic inside the routine kills the unit: it reports the
//! crash and its thread exits, leaving replacement to the coordinator.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, warn};

use crate::core::executor::WorkerExecutor;
use crate::core::{TaskId, TaskMetadata, UnitId};

use super::coordinator::Event;

/// Work handed from the coordinator to a single unit.
pub(crate) struct Dispatch<P> {
    pub meta: TaskMetadata,
    pub payload: P,
}

/// Coordinator-side handle on a live unit.
pub(crate) struct UnitHandle<P> {
    pub id: UnitId,
    pub tx: Sender<Dispatch<P>>,
    pub join: JoinHandle<()>,
}

/// Reports a crash if the unit thread unwinds outside the guarded routine.
struct ExitGuard<P, R> {
    unit: UnitId,
    current: Option<TaskId>,
    events: Sender<Event<P, R>>,
}

impl<P, R> Drop for ExitGuard<P, R> {
    fn drop(&mut self) {
        if thread::panicking() {
            let _ = self.events.send(Event::Crashed {
                unit: self.unit,
                task_id: self.current,
                reason: "unit thread panicked".into(),
            });
        }
    }
}

/// Spawn a unit thread.
///
/// The unit's runtime is built here, before the thread starts, so a runtime
/// failure surfaces as a spawn failure and goes through the respawn backoff.
///
/// # Errors
///
/// Returns the I/O error from the OS if the runtime or thread cannot be created.
pub(crate) fn spawn_unit<P, R, E>(
    id: UnitId,
    executor: E,
    events: Sender<Event<P, R>>,
    name_prefix: &str,
    stack_size: usize,
) -> std::io::Result<UnitHandle<P>>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    let rt = Builder::new_current_thread().enable_all().build()?;
    let (tx, rx) = bounded::<Dispatch<P>>(1);

    let join = thread::Builder::new()
        .name(format!("{name_prefix}-{}", id.0))
        .stack_size(stack_size)
        .spawn(move || run_unit(id, &executor, &rt, &rx, events))?;

    Ok(UnitHandle { id, tx, join })
}

fn run_unit<P, R, E>(
    id: UnitId,
    executor: &E,
    rt: &Runtime,
    rx: &Receiver<Dispatch<P>>,
    events: Sender<Event<P, R>>,
) where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    let mut guard = ExitGuard {
        unit: id,
        current: None,
        events,
    };

    debug!(unit_id = id.0, "Execution unit started");

    // Channel closes when the coordinator retires this unit or terminates.
    while let Ok(Dispatch { meta, payload }) = rx.recv() {
        let task_id = meta.id;
        guard.current = Some(task_id);
        debug!(unit_id = id.0, task_id, "Unit processing task");

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            rt.block_on(executor.process(payload, meta))
        }));

        match outcome {
            Ok(outcome) => {
                guard.current = None;
                if guard
                    .events
                    .send(Event::Finished {
                        unit: id,
                        task_id,
                        outcome,
                    })
                    .is_err()
                {
                    break;
                }
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(unit_id = id.0, task_id, reason = %reason, "Unit crashed while processing");
                let _ = guard.events.send(Event::Crashed {
                    unit: id,
                    task_id: Some(task_id),
                    reason,
                });
                // The routine's state can't be trusted after a panic.
                return;
            }
        }
    }

    debug!(unit_id = id.0, "Execution unit exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
