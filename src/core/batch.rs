//! # Bounded batch scheduler.
//!
//! [`run_batch`] executes a list of short tasks with at most `max_parallel`
//! in flight and returns one result per task **in submission order**, however
//! the completions interleave.
//!
//! ```text
//! tasks[0..N] ──► for each (index, task):
//!                   while in_flight.len() == max_parallel:
//!                       join_next_with_id() ──► index_of[id] ──► slots[index] = result
//!                   spawn run_with_retry(task) ──► index_of[id] = index
//!                 drain in_flight the same way
//!                 slots ──► BatchReport { results, succeeded, failed }
//! ```
//!
//! ## Rules
//! - `results.len() == tasks.len()` and `results[i]` belongs to `tasks[i]`.
//! - Every slot is written exactly once; [`ExecutionSlots`] refuses a second write.
//! - A failing task fills its slot with a failure and never aborts the batch.
//! - After cancellation, tasks not yet admitted fill their slots with
//!   [`ExecError::Canceled`]; admitted ones see it through their token.
//! - Continuous kinds are never admitted; their slot gets an [`ExecError::Fatal`].

use std::collections::HashMap;
use std::time::Duration;

use tokio::select;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::core::retry::run_with_retry;
use crate::error::ExecError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::RetryPolicy;
use crate::tasks::{HandlerRegistry, Task, TaskId, TaskResult};

/// Pre-sized, index-stable result cells of one batch call.
#[derive(Debug)]
pub struct ExecutionSlots<V> {
    ids: Vec<TaskId>,
    cells: Vec<Option<TaskResult<V>>>,
}

impl<V> ExecutionSlots<V> {
    /// One empty cell per task id, in submission order.
    pub fn new(ids: Vec<TaskId>) -> Self {
        let cells = ids.iter().map(|_| None).collect();
        Self { ids, cells }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// `true` for an empty batch.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of cells already written.
    pub fn filled(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// `true` once every cell is written.
    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Task id owning cell `index`.
    pub fn id(&self, index: usize) -> Option<&TaskId> {
        self.ids.get(index)
    }

    /// Writes cell `index`.
    ///
    /// A cell is written at most once: a second write, or an out of range
    /// index, hands the result back untouched.
    pub fn fill(&mut self, index: usize, result: TaskResult<V>) -> Result<(), TaskResult<V>> {
        match self.cells.get_mut(index) {
            Some(cell @ None) => {
                *cell = Some(result);
                Ok(())
            }
            _ => Err(result),
        }
    }

    /// Consumes the slots in submission order.
    ///
    /// A cell left empty becomes a [`ExecError::Canceled`] failure with zero attempts.
    pub fn into_results(self) -> Vec<TaskResult<V>> {
        self.ids
            .into_iter()
            .zip(self.cells)
            .map(|(id, cell)| cell.unwrap_or_else(|| TaskResult::failure(id, ExecError::Canceled, 0)))
            .collect()
    }
}

/// Ordered outcome of one batch call.
#[derive(Debug)]
pub struct BatchReport<V> {
    /// One result per submitted task, `results[i]` for `tasks[i]`.
    pub results: Vec<TaskResult<V>>,
    /// Number of successful results.
    pub succeeded: usize,
    /// Number of failed results.
    pub failed: usize,
}

impl<V> BatchReport<V> {
    /// Builds the report and its counts from ordered results.
    pub fn from_results(results: Vec<TaskResult<V>>) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - succeeded;
        Self {
            results,
            succeeded,
            failed,
        }
    }

    /// Number of results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// `true` for an empty batch.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// `true` when no task failed.
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Everything a batch call needs besides its tasks.
pub(crate) struct BatchEnv<'a, P, V> {
    pub registry: &'a HandlerRegistry<P, V>,
    pub retry: RetryPolicy,
    pub timeout: Option<Duration>,
    pub bus: &'a Bus,
    pub token: &'a CancellationToken,
}

/// Per-call admission and collection state.
struct InFlight<V> {
    set: JoinSet<TaskResult<V>>,
    index_of: HashMap<Id, usize>,
}

/// Runs `tasks` with at most `max_parallel` in flight (clamped to at least 1).
pub(crate) async fn run_batch<P, V>(
    tasks: Vec<Task<P>>,
    max_parallel: usize,
    env: BatchEnv<'_, P, V>,
) -> BatchReport<V>
where
    P: Clone + Send + 'static,
    V: Send + 'static,
{
    let total = tasks.len();
    let max_parallel = max_parallel.max(1);
    let bus = env.bus;
    let mut slots = ExecutionSlots::new(tasks.iter().map(|t| t.id().clone()).collect());
    let mut in_flight = InFlight {
        set: JoinSet::new(),
        index_of: HashMap::with_capacity(max_parallel.min(total)),
    };

    bus.publish(
        Event::new(EventKind::BatchStarted)
            .with_total(total)
            .with_max_parallel(max_parallel),
    );

    for (index, task) in tasks.into_iter().enumerate() {
        while in_flight.set.len() >= max_parallel && !env.token.is_cancelled() {
            bus.publish(
                Event::new(EventKind::AdmissionWaiting)
                    .with_index(index)
                    .with_max_parallel(max_parallel),
            );
            select! {
                biased;
                _ = env.token.cancelled() => {}
                joined = in_flight.set.join_next_with_id() => {
                    if let Some(joined) = joined {
                        collect(joined, &mut in_flight, &mut slots, bus);
                    }
                }
            }
        }

        if env.token.is_cancelled() {
            let result = TaskResult::failure(task.id().clone(), ExecError::Canceled, 0);
            write_slot(&mut slots, index, result, bus);
            continue;
        }

        if task.kind().is_continuous() {
            let error = ExecError::fatal(format!("{} runs continuously, not in a batch", task.kind()));
            write_slot(&mut slots, index, TaskResult::failure(task.id().clone(), error, 0), bus);
            continue;
        }

        let handler = match env.registry.resolve(task.kind()) {
            Ok(handler) => handler,
            Err(err) => {
                let result = TaskResult::failure(task.id().clone(), ExecError::fatal(err.to_string()), 0);
                write_slot(&mut slots, index, result, bus);
                continue;
            }
        };

        let admitted = Event::new(EventKind::TaskAdmitted)
            .with_task(task.id())
            .with_task_kind(task.kind())
            .with_index(index)
            .with_total(total);
        let handle = in_flight.set.spawn(run_with_retry(
            task,
            handler,
            env.retry,
            env.timeout,
            bus.clone(),
            env.token.clone(),
        ));
        in_flight.index_of.insert(handle.id(), index);
        bus.publish(admitted);
    }

    while let Some(joined) = in_flight.set.join_next_with_id().await {
        collect(joined, &mut in_flight, &mut slots, bus);
    }

    debug_assert!(slots.is_complete());
    let report = BatchReport::from_results(slots.into_results());
    bus.publish(
        Event::new(EventKind::BatchFinished)
            .with_total(total)
            .with_counts(report.succeeded, report.failed),
    );
    report
}

/// Routes one completion to the slot of the task that produced it.
fn collect<V>(
    joined: Result<(Id, TaskResult<V>), JoinError>,
    in_flight: &mut InFlight<V>,
    slots: &mut ExecutionSlots<V>,
    bus: &Bus,
) {
    let (id, outcome) = match joined {
        Ok((id, result)) => (id, Ok(result)),
        Err(join_err) => (join_err.id(), Err(join_err)),
    };
    let Some(index) = in_flight.index_of.remove(&id) else {
        return;
    };

    let result = match outcome {
        Ok(result) => result,
        Err(join_err) => {
            let task_id = slots
                .id(index)
                .cloned()
                .unwrap_or_else(|| TaskId::from(format!("slot-{index}")));
            let error = if join_err.is_panic() {
                ExecError::Panicked {
                    info: crate::core::unit::panic_message(join_err.into_panic().as_ref()),
                }
            } else {
                ExecError::Canceled
            };
            TaskResult::failure(task_id, error, 0)
        }
    };
    write_slot(slots, index, result, bus);
}

fn write_slot<V>(slots: &mut ExecutionSlots<V>, index: usize, result: TaskResult<V>, bus: &Bus) {
    let mut ev = Event::new(EventKind::SlotFilled)
        .with_task(result.task_id())
        .with_index(index)
        .with_total(slots.len());
    if let Some(err) = result.error() {
        ev = ev.with_reason(err.as_message());
    }
    if slots.fill(index, result).is_ok() {
        bus.publish(ev);
    }
}
