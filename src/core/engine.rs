//! # Engine: the facade over batch execution and continuous supervision.
//!
//! The [`Engine`] owns the event bus, the validated handler registry, the
//! runtime cancellation token and the set of background continuous tasks.
//!
//! ## Entry points
//! - [`Engine::execute_batch`]: ordered, bounded-concurrency batch of short tasks
//! - [`Engine::execute_continuous`]: supervise one long-running task and await it
//! - [`Engine::launch_continuous`] / [`Engine::launch_staggered`]: supervise in
//!   the background, tracked for shutdown
//! - [`Engine::shutdown`] / [`Engine::run_until_signal`]: graceful stop
//!
//! ## Architecture
//! ```text
//! execute_batch(tasks) ──► run_batch ──► JoinSet (≤ max_parallel)
//!                                          └─► run_with_retry ──► run_attempt ──► unit
//!
//! execute_continuous(task) ──► supervise ──► run_attempt ──► unit
//! launch_continuous(task)  ──► launched: JoinSet<()> ──► supervise ...
//!
//! every layer ── publish(Event) ──► Bus ──► listener ──► AliveTracker
//!                                                   └──► SubscriberSet ──► LogWriter, ...
//!
//! shutdown():
//!   publish ShutdownRequested ──► runtime_token.cancel() (children see it)
//!   wait launched up to cfg.grace
//!     ├─ all joined  ──► publish AllStoppedWithin ──► Ok(())
//!     └─ timeout     ──► publish GraceExceeded    ──► Err(GraceExceeded { stuck })
//! ```
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use fleetvisor::{Engine, EngineConfig, ExecError, HandlerFn, HandlerRegistry, Task, TaskKind};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let echo = HandlerFn::arc("echo", |wallet: String, _ctx: CancellationToken| async move {
//!         Ok::<_, ExecError>(wallet.len())
//!     });
//!     let registry = HandlerRegistry::<String, usize>::builder()
//!         .register_each(TaskKind::ALL, echo)
//!         .build()?;
//!
//!     let engine = Engine::builder(EngineConfig::default(), registry).build();
//!     let report = engine
//!         .execute_batch(
//!             vec![
//!                 Task::new(TaskKind::BalanceQuery, "0xabc".to_string()),
//!                 Task::new(TaskKind::BalanceQuery, "0xdeadbeef".to_string()),
//!             ],
//!             Some(2),
//!         )
//!         .await;
//!
//!     assert_eq!(report.succeeded, 2);
//!     assert_eq!(report.results[1].value(), Some(&10));
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tokio::task::{Id, JoinSet};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info};

use crate::core::alive::AliveTracker;
use crate::core::batch::{BatchEnv, BatchReport, run_batch};
use crate::core::builder::EngineBuilder;
use crate::core::config::EngineConfig;
use crate::core::continuous::{SupervisionReport, supervise};
use crate::core::shutdown;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::{RestartPolicy, StaggerPolicy};
use crate::tasks::{HandlerRegistry, Task, TaskId};

/// Background supervisors and the task ids they own.
#[derive(Default)]
struct Launched {
    set: JoinSet<()>,
    ids: HashMap<Id, TaskId>,
}

impl Launched {
    /// Forgets supervisors that already finished.
    fn reap(&mut self) {
        while let Some(joined) = self.set.try_join_next_with_id() {
            let id = match joined {
                Ok((id, ())) => id,
                Err(join_err) => join_err.id(),
            };
            self.ids.remove(&id);
        }
    }

    fn contains(&self, task: &TaskId) -> bool {
        self.ids.values().any(|id| id == task)
    }
}

/// Concurrent task execution engine.
pub struct Engine<P, V> {
    cfg: EngineConfig,
    registry: HandlerRegistry<P, V>,
    bus: Bus,
    alive: Arc<AliveTracker>,
    runtime_token: CancellationToken,
    listener_token: CancellationToken,
    launched: Mutex<Launched>,
}

impl<P, V> Engine<P, V>
where
    P: Clone + Send + 'static,
    V: Send + 'static,
{
    /// Starts building an engine over a validated registry.
    pub fn builder(cfg: EngineConfig, registry: HandlerRegistry<P, V>) -> EngineBuilder<P, V> {
        EngineBuilder::new(cfg, registry)
    }

    pub(crate) fn new_internal(
        cfg: EngineConfig,
        registry: HandlerRegistry<P, V>,
        bus: Bus,
        alive: Arc<AliveTracker>,
        listener_token: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            registry,
            bus,
            alive,
            runtime_token: CancellationToken::new(),
            listener_token,
            launched: Mutex::new(Launched::default()),
        }
    }

    /// Runs `tasks` with at most `max_parallel` in flight and returns one
    /// result per task, `results[i]` for `tasks[i]`.
    ///
    /// `None` uses [`EngineConfig::max_parallel`]. Failures are reported per
    /// slot; the call itself never fails.
    pub async fn execute_batch(
        &self,
        tasks: Vec<Task<P>>,
        max_parallel: Option<usize>,
    ) -> BatchReport<V> {
        let token = self.runtime_token.child_token();
        run_batch(
            tasks,
            self.cfg.resolve_parallel(max_parallel),
            BatchEnv {
                registry: &self.registry,
                retry: self.cfg.retry,
                timeout: self.cfg.unit_timeout(),
                bus: &self.bus,
                token: &token,
            },
        )
        .await
    }

    /// Supervises `task` until it exits normally, exhausts its restarts,
    /// fails fatally or the engine shuts down.
    ///
    /// `None` uses [`EngineConfig::restart`]. Only continuous kinds are accepted.
    pub async fn execute_continuous(
        &self,
        task: Task<P>,
        restart: Option<RestartPolicy>,
    ) -> Result<SupervisionReport<V>, RuntimeError> {
        ensure_continuous(&task)?;
        let handler = self.registry.resolve(task.kind())?;
        supervise(
            task,
            handler,
            restart.unwrap_or(self.cfg.restart),
            None,
            self.bus.clone(),
            self.runtime_token.child_token(),
        )
        .await
    }

    /// Supervises `task` in the background and returns its id at once.
    ///
    /// The outcome is reported through events only; [`Engine::shutdown`]
    /// waits for these tasks. Fails with [`RuntimeError::Canceled`] once
    /// shutdown has started and with [`RuntimeError::DuplicateTask`] while a
    /// background task with the same id is still running.
    pub async fn launch_continuous(
        &self,
        task: Task<P>,
        restart: Option<RestartPolicy>,
    ) -> Result<TaskId, RuntimeError> {
        let id = task.id().clone();
        if self.runtime_token.is_cancelled() {
            return Err(RuntimeError::Canceled {
                task: id.to_string(),
            });
        }
        ensure_continuous(&task)?;
        let handler = self.registry.resolve(task.kind())?;

        let mut launched = self.launched.lock().await;
        // Shutdown may have taken the set while we waited for the lock.
        if self.runtime_token.is_cancelled() {
            return Err(RuntimeError::Canceled {
                task: id.to_string(),
            });
        }
        launched.reap();
        if launched.contains(&id) {
            return Err(RuntimeError::DuplicateTask {
                task: id.to_string(),
            });
        }

        let supervision = supervise(
            task,
            handler,
            restart.unwrap_or(self.cfg.restart),
            None,
            self.bus.clone(),
            self.runtime_token.child_token(),
        );
        let name = id.clone();
        let handle = launched.set.spawn(async move {
            log_background_exit(&name, &supervision.await);
        });
        launched.ids.insert(handle.id(), id.clone());
        Ok(id)
    }

    /// Launches `tasks` one after another with a sampled pause in between.
    ///
    /// Stops launching (returning the ids launched so far) once the engine
    /// shuts down.
    pub async fn launch_staggered(
        &self,
        tasks: Vec<Task<P>>,
        stagger: StaggerPolicy,
        restart: Option<RestartPolicy>,
    ) -> Result<Vec<TaskId>, RuntimeError> {
        let mut ids = Vec::with_capacity(tasks.len());
        for (i, task) in tasks.into_iter().enumerate() {
            if i > 0 {
                let pause = stagger.sample();
                select! {
                    _ = time::sleep(pause) => {}
                    _ = self.runtime_token.cancelled() => break,
                }
            }
            if self.runtime_token.is_cancelled() {
                break;
            }
            ids.push(self.launch_continuous(task, restart).await?);
        }
        Ok(ids)
    }

    /// Cancels everything and waits up to [`EngineConfig::grace`] for the
    /// background continuous tasks.
    ///
    /// Returns [`RuntimeError::GraceExceeded`] naming the tasks still alive when
    /// the grace period ran out; those are aborted.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.runtime_token.cancel();
        self.wait_all_with_grace().await
    }

    /// Waits for SIGINT/SIGTERM/SIGQUIT (or Ctrl-C), then shuts down.
    ///
    /// Returns early with `Ok(())` if [`Engine::shutdown`] is called elsewhere.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        select! {
            res = shutdown::shutdown_signal() => {
                let signal = res?;
                info!(signal, "termination signal received");
                self.shutdown().await
            }
            _ = self.runtime_token.cancelled() => Ok(()),
        }
    }

    /// Subscribes to the engine's event stream.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// `true` once shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.runtime_token.is_cancelled()
    }

    /// Sorted ids of the continuous tasks currently alive.
    ///
    /// Eventually consistent: it lags the event stream slightly.
    pub async fn alive_tasks(&self) -> Vec<String> {
        self.alive.snapshot().await
    }

    /// `true` if the continuous task `id` is currently alive.
    pub async fn is_running(&self, id: &TaskId) -> bool {
        self.alive.is_alive(id.as_str()).await
    }

    async fn wait_all_with_grace(&self) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace;
        let mut launched = std::mem::take(&mut *self.launched.lock().await);
        let done = async { while launched.set.join_next().await.is_some() {} };

        if time::timeout(grace, done).await.is_ok() {
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
            return Ok(());
        }

        let stuck = self.alive.snapshot().await;
        self.bus
            .publish(Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")));
        launched.set.abort_all();
        while launched.set.join_next().await.is_some() {}
        Err(RuntimeError::GraceExceeded { grace, stuck })
    }
}

/// Logs how a background supervisor ended and returns the level used.
///
/// Terminal failures go out at `error`; normal exits and cancellation at `debug`.
fn log_background_exit<V>(task: &TaskId, res: &Result<SupervisionReport<V>, RuntimeError>) -> Level {
    match res {
        Ok(report) => {
            debug!(task = %task, restarts = report.restarts, "continuous task finished");
            Level::DEBUG
        }
        Err(err) if err.is_terminal_supervision() => {
            error!(task = %task, label = err.as_label(), "{}", err.as_message());
            Level::ERROR
        }
        Err(err) => {
            debug!(task = %task, label = err.as_label(), "{}", err.as_message());
            Level::DEBUG
        }
    }
}

fn ensure_continuous<P>(task: &Task<P>) -> Result<(), RuntimeError> {
    if task.kind().is_continuous() {
        return Ok(());
    }
    Err(RuntimeError::NotContinuous {
        task: task.id().to_string(),
        kind: task.kind(),
    })
}

impl<P, V> Drop for Engine<P, V> {
    fn drop(&mut self) {
        self.runtime_token.cancel();
        self.listener_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecError;
    use crate::tasks::{HandlerFn, TaskKind};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Clone, Copy, Debug)]
    enum Mode {
        Succeed,
        Fail,
        /// Loops until cancelled.
        Cooperative,
        /// Ignores cancellation.
        Stubborn,
    }

    /// (label, latency in ms, behaviour)
    type Job = (&'static str, u64, Mode);

    type Starts = Arc<StdMutex<Vec<(&'static str, Instant)>>>;

    fn engine(cfg: EngineConfig, starts: Starts) -> Arc<Engine<Job, &'static str>> {
        let handler = HandlerFn::arc("job", move |job: Job, ctx: CancellationToken| {
            if let Ok(mut starts) = starts.lock() {
                starts.push((job.0, Instant::now()));
            }
            async move {
                let (label, latency, mode) = job;
                match mode {
                    Mode::Succeed => {
                        time::sleep(Duration::from_millis(latency)).await;
                        Ok(label)
                    }
                    Mode::Fail => {
                        time::sleep(Duration::from_millis(latency)).await;
                        Err(ExecError::fatal(format!("{label}: insufficient funds")))
                    }
                    Mode::Cooperative => {
                        ctx.cancelled().await;
                        Err(ExecError::Canceled)
                    }
                    Mode::Stubborn => {
                        time::sleep(Duration::from_secs(24 * 3600)).await;
                        Ok(label)
                    }
                }
            }
        });
        let registry = HandlerRegistry::builder()
            .register_each(TaskKind::ALL, handler)
            .build()
            .expect("complete registry");
        Engine::builder(cfg, registry).build()
    }

    fn cfg() -> EngineConfig {
        EngineConfig {
            max_parallel: 4,
            grace: Duration::from_secs(5),
            ..EngineConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn batch_example_reports_four_of_five() {
        let engine = engine(cfg(), Arc::default());
        let mut events = engine.events();
        let tasks = vec![
            Task::new(TaskKind::Authenticate, ("A", 30, Mode::Succeed)),
            Task::new(TaskKind::Transfer, ("B", 10, Mode::Succeed)),
            Task::new(TaskKind::Transfer, ("C", 20, Mode::Fail)),
            Task::new(TaskKind::BalanceQuery, ("D", 5, Mode::Succeed)),
            Task::new(TaskKind::BalanceQuery, ("E", 15, Mode::Succeed)),
        ];

        let report = engine.execute_batch(tasks, Some(2)).await;

        assert_eq!(report.succeeded, 4);
        assert_eq!(report.failed, 1);
        assert!(report.results[2].error().is_some());
        assert_eq!(report.results[4].value(), Some(&"E"));

        let mut finished = None;
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::BatchFinished {
                finished = Some(ev);
            }
        }
        let finished = finished.expect("batch finished event");
        assert_eq!(finished.succeeded, Some(4));
        assert_eq!(finished.failed, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_task_reports_restarts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let flaky = HandlerFn::arc("flaky-loop", move |_job: Job, _ctx: CancellationToken| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ExecError::fail("session expired"))
                } else {
                    Ok("stopped")
                }
            }
        });
        let registry = HandlerRegistry::builder()
            .register_each(TaskKind::ALL, flaky)
            .build()
            .expect("complete registry");
        let flaky_engine = Engine::builder(cfg(), registry).build();

        let report = flaky_engine
            .execute_continuous(Task::new(TaskKind::PollLoop, ("loop", 0, Mode::Succeed)), None)
            .await
            .expect("normal exit");
        assert_eq!(report.restarts, 2);
        assert_eq!(report.value, "stopped");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_cooperative_tasks_within_grace() {
        let engine = engine(cfg(), Arc::default());
        let mut ids = Vec::new();
        for label in ["w1", "w2"] {
            let task = Task::new(TaskKind::PollLoop, (label, 0, Mode::Cooperative));
            ids.push(engine.launch_continuous(task, None).await.expect("launched"));
        }
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(engine.alive_tasks().await.len(), 2);
        assert!(engine.is_running(&ids[0]).await);

        engine.shutdown().await.expect("graceful");
        assert!(engine.is_shutting_down());
        time::sleep(Duration::from_millis(10)).await;
        assert!(!engine.is_running(&ids[1]).await);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_names_stuck_tasks() {
        let engine = engine(cfg(), Arc::default());
        let cooperative = Task::new(TaskKind::PollLoop, ("ok", 0, Mode::Cooperative));
        let stubborn = Task::with_id(TaskKind::PollLoop, ("stuck", 0, Mode::Stubborn), "wallet-stuck");
        engine.launch_continuous(cooperative, None).await.expect("launched");
        engine.launch_continuous(stubborn, None).await.expect("launched");
        time::sleep(Duration::from_millis(10)).await;

        let started = Instant::now();
        let err = engine.shutdown().await.expect_err("grace exceeded");
        assert_eq!(Instant::now() - started, Duration::from_secs(5));
        match err {
            RuntimeError::GraceExceeded { stuck, grace } => {
                assert_eq!(grace, Duration::from_secs(5));
                assert_eq!(stuck, vec!["wallet-stuck".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn staggered_launch_spaces_out_starts() {
        let starts = Arc::new(StdMutex::new(Vec::new()));
        let engine = engine(cfg(), starts.clone());
        let tasks = ["w1", "w2", "w3"]
            .into_iter()
            .map(|label| Task::new(TaskKind::PollLoop, (label, 0, Mode::Cooperative)))
            .collect();

        let ids = engine
            .launch_staggered(tasks, StaggerPolicy::fixed(Duration::from_secs(10)), None)
            .await
            .expect("launched");
        assert_eq!(ids.len(), 3);
        time::sleep(Duration::from_millis(1)).await;

        let starts = starts.lock().expect("lock").clone();
        let labels: Vec<&str> = starts.iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, vec!["w1", "w2", "w3"]);
        let gaps: Vec<Duration> = starts.windows(2).map(|w| w[1].1 - w[0].1).collect();
        assert_eq!(gaps, vec![Duration::from_secs(10), Duration::from_secs(10)]);

        engine.shutdown().await.expect("graceful");
    }

    #[tokio::test(start_paused = true)]
    async fn batch_after_shutdown_is_cancelled() {
        let engine = engine(cfg(), Arc::default());
        engine.shutdown().await.expect("nothing launched");

        let report = engine
            .execute_batch(vec![Task::new(TaskKind::Transfer, ("late", 1, Mode::Succeed))], None)
            .await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.results[0].error(), Some(&ExecError::Canceled));
    }

    #[tokio::test(start_paused = true)]
    async fn launch_during_shutdown_is_refused_at_once() {
        let engine = engine(
            EngineConfig {
                grace: Duration::from_secs(30),
                ..cfg()
            },
            Arc::default(),
        );
        let stubborn = Task::new(TaskKind::PollLoop, ("stuck", 0, Mode::Stubborn));
        engine.launch_continuous(stubborn, None).await.expect("launched");
        time::sleep(Duration::from_millis(10)).await;

        let started = Instant::now();
        let late = async {
            time::sleep(Duration::from_secs(1)).await;
            let task = Task::new(TaskKind::PollLoop, ("late", 0, Mode::Cooperative));
            let res = engine.launch_continuous(task, None).await;
            (res, Instant::now() - started)
        };
        let (stopped, (late, waited)) = tokio::join!(engine.shutdown(), late);

        assert!(matches!(stopped, Err(RuntimeError::GraceExceeded { .. })));
        assert!(matches!(late, Err(RuntimeError::Canceled { .. })));
        assert_eq!(waited, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn staggered_launch_stops_when_shutdown_starts() {
        let starts = Arc::new(StdMutex::new(Vec::new()));
        let engine = engine(cfg(), starts.clone());
        let tasks = ["w1", "w2", "w3"]
            .into_iter()
            .map(|label| Task::new(TaskKind::PollLoop, (label, 0, Mode::Cooperative)))
            .collect();

        let stop = async {
            time::sleep(Duration::from_secs(5)).await;
            engine.shutdown().await
        };
        let (ids, stopped) = tokio::join!(
            engine.launch_staggered(tasks, StaggerPolicy::fixed(Duration::from_secs(10)), None),
            stop
        );

        assert_eq!(ids.expect("no launch errors").len(), 1);
        stopped.expect("graceful");
        time::sleep(Duration::from_secs(30)).await;
        let labels: Vec<&str> = starts.lock().expect("lock").iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, vec!["w1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn running_id_cannot_be_launched_twice() {
        let engine = engine(cfg(), Arc::default());
        let first = Task::with_id(TaskKind::PollLoop, ("a", 50, Mode::Succeed), "wallet-1");
        let second = Task::with_id(TaskKind::PollLoop, ("b", 50, Mode::Succeed), "wallet-1");
        let third = Task::with_id(TaskKind::PollLoop, ("c", 50, Mode::Succeed), "wallet-1");

        engine.launch_continuous(first, None).await.expect("launched");
        let err = engine.launch_continuous(second, None).await.expect_err("duplicate");
        assert!(matches!(err, RuntimeError::DuplicateTask { ref task } if task == "wallet-1"));

        // The id is free again once the first loop exits.
        time::sleep(Duration::from_millis(100)).await;
        engine.launch_continuous(third, None).await.expect("relaunched");
        engine.shutdown().await.expect("graceful");
    }

    #[tokio::test(start_paused = true)]
    async fn short_kinds_are_not_supervised() {
        let engine = engine(cfg(), Arc::default());
        let transfer = Task::with_id(TaskKind::Transfer, ("t", 0, Mode::Succeed), "tx-1");
        let err = engine.launch_continuous(transfer.clone(), None).await.expect_err("rejected");
        assert!(matches!(
            err,
            RuntimeError::NotContinuous { ref task, kind: TaskKind::Transfer } if task == "tx-1"
        ));

        let err = engine.execute_continuous(transfer, None).await.expect_err("rejected");
        assert_eq!(err.as_label(), "runtime_not_continuous");
        assert!(engine.alive_tasks().await.is_empty());
    }

    #[test]
    fn background_exits_are_logged_by_severity() {
        let id = TaskId::from("wallet-9");
        let fatal: Result<SupervisionReport<()>, _> = Err(RuntimeError::Fatal {
            task: "wallet-9".into(),
            restarts: 0,
            error: ExecError::fatal("invalid private key"),
        });
        assert_eq!(log_background_exit(&id, &fatal), Level::ERROR);

        let exhausted: Result<SupervisionReport<()>, _> = Err(RuntimeError::RestartsExhausted {
            task: "wallet-9".into(),
            restarts: 3,
            last_error: ExecError::fail("connection reset"),
        });
        assert_eq!(log_background_exit(&id, &exhausted), Level::ERROR);

        let canceled: Result<SupervisionReport<()>, _> = Err(RuntimeError::Canceled {
            task: "wallet-9".into(),
        });
        assert_eq!(log_background_exit(&id, &canceled), Level::DEBUG);
    }
}
