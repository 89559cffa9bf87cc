//! # Continuous supervisor: restart state machine for long-running tasks.
//!
//! A continuous task (one identity's polling loop) is expected to run for a
//! long time. When it crashes it is restarted after a linearly growing,
//! capped delay, until the restart ceiling is reached.
//!
//! ## State machine
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!        STARTING ──► RUNNING ──┬─► NORMAL_EXIT (terminal)  │
//!                               │                           │
//!                               └─► ABNORMAL_EXIT ──┬─► RESTARTING
//!                                                   │   sleep(min(base + n·inc, max))
//!                                                   │   n += 1
//!                                                   │
//!                                                   └─► TERMINATED (terminal)
//!                                                       n == max_restarts, or fatal error
//! ```
//!
//! ## Rules
//! - A task failing `m < max_restarts` times then returning `Ok` is restarted exactly `m` times.
//! - A task failing forever is restarted exactly `max_restarts` times, then terminated.
//! - `ExecError::Fatal` terminates immediately; `ExecError::Canceled` and engine
//!   cancellation stop supervision with [`RuntimeError::Canceled`].
//! - The restart counter never resets.

use std::time::Duration;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::core::unit::{AttemptMeta, run_attempt};
use crate::error::{ExecError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::policies::RestartPolicy;
use crate::tasks::{HandlerRef, Task, TaskId};

/// Phase of a supervised task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    /// About to launch a fresh execution unit.
    Starting,
    /// Execution unit in flight.
    Running,
    /// Task returned on its own (terminal).
    NormalExit,
    /// Task failed or its unit faulted.
    AbnormalExit,
    /// Waiting out the restart delay.
    Restarting,
    /// Restart ceiling reached or fatal error (terminal).
    Terminated,
}

impl SupervisorPhase {
    /// `true` for phases supervision never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SupervisorPhase::NormalExit | SupervisorPhase::Terminated)
    }
}

/// Restart bookkeeping of one supervised task.
///
/// Created when the task launches; `restart_count` only grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisionState {
    phase: SupervisorPhase,
    restart_count: u32,
    max_restarts: u32,
}

impl SupervisionState {
    /// Fresh state in [`SupervisorPhase::Starting`].
    pub fn new(max_restarts: u32) -> Self {
        Self {
            phase: SupervisorPhase::Starting,
            restart_count: 0,
            max_restarts,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SupervisorPhase {
        self.phase
    }

    /// Restarts performed so far.
    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    /// Restart ceiling.
    pub fn max_restarts(&self) -> u32 {
        self.max_restarts
    }

    /// `Starting → Running`.
    pub fn start(&mut self) {
        debug_assert_eq!(self.phase, SupervisorPhase::Starting);
        self.phase = SupervisorPhase::Running;
    }

    /// `Running → NormalExit`.
    pub fn exit_normally(&mut self) {
        debug_assert_eq!(self.phase, SupervisorPhase::Running);
        self.phase = SupervisorPhase::NormalExit;
    }

    /// `Running → AbnormalExit`.
    pub fn exit_abnormally(&mut self) {
        debug_assert_eq!(self.phase, SupervisorPhase::Running);
        self.phase = SupervisorPhase::AbnormalExit;
    }

    /// `AbnormalExit → Restarting` while `err` is retryable and restarts remain,
    /// `AbnormalExit → Terminated` otherwise.
    ///
    /// Returns the new phase.
    pub fn resolve_exit(&mut self, err: &ExecError) -> SupervisorPhase {
        debug_assert_eq!(self.phase, SupervisorPhase::AbnormalExit);
        self.phase = if err.is_retryable() && self.restart_count < self.max_restarts {
            SupervisorPhase::Restarting
        } else {
            SupervisorPhase::Terminated
        };
        self.phase
    }

    /// `Restarting → Starting`, counting the restart.
    pub fn restart(&mut self) {
        debug_assert_eq!(self.phase, SupervisorPhase::Restarting);
        self.restart_count = self.restart_count.saturating_add(1);
        self.phase = SupervisorPhase::Starting;
    }
}

/// Value returned by a continuous task that exited normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisionReport<V> {
    /// Id of the supervised task.
    pub task_id: TaskId,
    /// Restarts performed before the normal exit.
    pub restarts: u32,
    /// Value the task returned.
    pub value: V,
}

/// Supervises `task` until it exits normally, terminates or is cancelled.
pub(crate) async fn supervise<P, V>(
    task: Task<P>,
    handler: HandlerRef<P, V>,
    policy: RestartPolicy,
    timeout: Option<Duration>,
    bus: Bus,
    token: CancellationToken,
) -> Result<SupervisionReport<V>, RuntimeError>
where
    P: Clone + Send + 'static,
    V: Send + 'static,
{
    let id = task.id().clone();
    let kind = task.kind();
    let mut state = SupervisionState::new(policy.max_restarts);
    let event = |ev: EventKind, state: &SupervisionState| {
        Event::new(ev)
            .with_task(&id)
            .with_task_kind(kind)
            .with_restarts(state.restart_count())
    };

    loop {
        if token.is_cancelled() {
            return Err(canceled(&bus, event(EventKind::SupervisorCanceled, &state), &id));
        }
        bus.publish(event(EventKind::SupervisorStarting, &state));
        state.start();

        let meta = AttemptMeta {
            task: &id,
            kind,
            attempt: state.restart_count().saturating_add(1),
        };
        let payload = task.payload().clone();
        let res = run_attempt(
            handler.clone(),
            payload,
            &token,
            timeout,
            meta,
            &bus,
        )
        .await;

        let err = match res {
            Ok(value) => {
                state.exit_normally();
                bus.publish(event(EventKind::NormalExit, &state));
                return Ok(SupervisionReport {
                    task_id: id.clone(),
                    restarts: state.restart_count(),
                    value,
                });
            }
            Err(ExecError::Canceled) => {
                return Err(canceled(&bus, event(EventKind::SupervisorCanceled, &state), &id));
            }
            Err(err) => err,
        };

        state.exit_abnormally();
        bus.publish(event(EventKind::AbnormalExit, &state).with_reason(err.as_message()));
        if state.resolve_exit(&err) == SupervisorPhase::Terminated {
            bus.publish(
                event(EventKind::SupervisorTerminated, &state).with_reason(err.as_message()),
            );
            return Err(terminal_error(&id, &state, err));
        }

        let delay = policy.delay(state.restart_count());
        bus.publish(
            event(EventKind::RestartScheduled, &state)
                .with_delay(delay)
                .with_reason(err.as_message()),
        );

        let sleep = time::sleep(delay);
        tokio::pin!(sleep);
        select! {
            _ = &mut sleep => {}
            _ = token.cancelled() => {
                return Err(canceled(&bus, event(EventKind::SupervisorCanceled, &state), &id));
            }
        }
        state.restart();
    }
}

fn canceled(bus: &Bus, ev: Event, id: &TaskId) -> RuntimeError {
    bus.publish(ev);
    RuntimeError::Canceled {
        task: id.to_string(),
    }
}

fn terminal_error(id: &TaskId, state: &SupervisionState, err: ExecError) -> RuntimeError {
    if err.is_retryable() {
        RuntimeError::RestartsExhausted {
            task: id.to_string(),
            restarts: state.restart_count(),
            last_error: err,
        }
    } else {
        RuntimeError::Fatal {
            task: id.to_string(),
            restarts: state.restart_count(),
            error: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{HandlerFn, TaskKind};
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(max_restarts: u32) -> RestartPolicy {
        RestartPolicy::default().with_max_restarts(max_restarts)
    }

    fn crashing(
        failures: u32,
        calls: Arc<AtomicU32>,
        starts: Arc<Mutex<Vec<Instant>>>,
    ) -> HandlerRef<(), &'static str> {
        HandlerFn::arc("poll", move |_p: (), _ctx: CancellationToken| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut starts) = starts.lock() {
                starts.push(Instant::now());
            }
            async move {
                if n < failures {
                    Err(ExecError::fail("connection reset"))
                } else {
                    Ok("done")
                }
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn m_failures_then_success_restarts_m_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let starts = Arc::new(Mutex::new(Vec::new()));
        let handler = crashing(3, calls.clone(), starts.clone());

        let report = supervise(
            Task::new(TaskKind::PollLoop, ()),
            handler,
            policy(10),
            None,
            Bus::new(64),
            CancellationToken::new(),
        )
        .await
        .expect("normal exit");

        assert_eq!(report.restarts, 3);
        assert_eq!(report.value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let starts = starts.lock().expect("lock").clone();
        let gaps: Vec<Duration> = starts.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(30),
                Duration::from_secs(35),
                Duration::from_secs(40),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_failure_terminates_after_max_restarts() {
        let calls = Arc::new(AtomicU32::new(0));
        let starts = Arc::new(Mutex::new(Vec::new()));
        let handler = crashing(u32::MAX, calls.clone(), starts);
        let bus = Bus::new(256);
        let mut rx = bus.subscribe();

        let err = supervise(
            Task::with_id(TaskKind::PollLoop, (), "wallet-3"),
            handler,
            policy(4),
            None,
            bus,
            CancellationToken::new(),
        )
        .await
        .expect_err("terminated");

        assert!(matches!(
            err,
            RuntimeError::RestartsExhausted { restarts: 4, ref task, .. } if task == "wallet-3"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        let mut restarts_scheduled = 0;
        let mut terminated = 0;
        while let Ok(ev) = rx.try_recv() {
            match ev.kind {
                EventKind::RestartScheduled => restarts_scheduled += 1,
                EventKind::SupervisorTerminated => terminated += 1,
                _ => {}
            }
        }
        assert_eq!(restarts_scheduled, 4);
        assert_eq!(terminated, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_terminates_without_restart() {
        let handler: HandlerRef<(), ()> =
            HandlerFn::arc("bad-key", |_p: (), _ctx: CancellationToken| async move {
                Err::<(), _>(ExecError::fatal("invalid private key"))
            });

        let err = supervise(
            Task::new(TaskKind::PollLoop, ()),
            handler,
            policy(100),
            None,
            Bus::new(64),
            CancellationToken::new(),
        )
        .await
        .expect_err("fatal");

        assert!(matches!(err, RuntimeError::Fatal { restarts: 0, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn panics_are_restarted() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let handler: HandlerRef<(), u32> =
            HandlerFn::arc("panicky", move |_p: (), _ctx: CancellationToken| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        panic!("nonce underflow");
                    }
                    Ok::<_, ExecError>(n)
                }
            });

        let report = supervise(
            Task::new(TaskKind::PollLoop, ()),
            handler,
            policy(5),
            None,
            Bus::new(64),
            CancellationToken::new(),
        )
        .await
        .expect("recovered");

        assert_eq!(report.restarts, 1);
        assert_eq!(report.value, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_restart_delay_stops_supervision() {
        let calls = Arc::new(AtomicU32::new(0));
        let starts = Arc::new(Mutex::new(Vec::new()));
        let handler = crashing(u32::MAX, calls.clone(), starts);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(45)).await;
            canceller.cancel();
        });

        let err = supervise(
            Task::new(TaskKind::PollLoop, ()),
            handler,
            policy(100),
            None,
            Bus::new(64),
            token,
        )
        .await
        .expect_err("cancelled");

        assert!(matches!(err, RuntimeError::Canceled { .. }));
        // Attempts at t=0 and t=30s; the second delay (35s) is interrupted.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn state_machine_transitions() {
        let mut state = SupervisionState::new(1);
        assert_eq!(state.phase(), SupervisorPhase::Starting);
        state.start();
        state.exit_abnormally();
        assert_eq!(state.phase(), SupervisorPhase::AbnormalExit);
        assert!(!state.phase().is_terminal());
        assert_eq!(
            state.resolve_exit(&ExecError::fail("x")),
            SupervisorPhase::Restarting
        );
        state.restart();
        assert_eq!(state.restart_count(), 1);
        state.start();
        state.exit_abnormally();
        assert_eq!(
            state.resolve_exit(&ExecError::fail("x")),
            SupervisorPhase::Terminated
        );
        assert!(state.phase().is_terminal());

        let mut state = SupervisionState::new(5);
        state.start();
        state.exit_abnormally();
        assert_eq!(
            state.resolve_exit(&ExecError::fatal("bad key")),
            SupervisorPhase::Terminated
        );
        assert_eq!(state.restart_count(), 0);

        let mut state = SupervisionState::new(5);
        state.start();
        state.exit_normally();
        assert_eq!(state.phase(), SupervisorPhase::NormalExit);
        assert_eq!(state.max_restarts(), 5);
    }
}
