//! # Demo: fleet
//!
//! Runs a simulated wallet fleet through [`fleetvisor::Engine`]:
//!
//! 1. A batch of logins, balance queries and transfers over 6 wallets with at
//!    most 3 in flight. Flaky calls are retried; one wallet has a bad key and
//!    fails fatally without retries.
//! 2. One polling loop per wallet, launched with a stagger and supervised with
//!    restarts, until Ctrl-C (or 20 seconds).
//!
//! ## Flow
//! ```text
//! execute_batch(18 tasks, max_parallel = 3)
//!   ├─► slot[i] ◄── run_with_retry(task[i])   (≤ 3 at a time)
//!   └─► BatchReport { results in input order, succeeded, failed }
//!
//! launch_staggered(poll loop per valid wallet, 200..500ms apart)
//!   └─► supervise(loop) ── AbnormalExit ──► RestartScheduled ──► ...
//!
//! Ctrl-C / timer ──► shutdown() ──► AllStoppedWithin | GraceExceeded
//! ```
//!
//! ## Run
//! ```bash
//! FLEETVISOR_LOG=info cargo run --example fleet
//! ```

use std::time::Duration;

use fleetvisor::{
    Engine, EngineConfig, ExecError, HandlerFn, HandlerRegistry, LoggerConfig, RestartPolicy,
    RetryPolicy, StaggerPolicy, Task, TaskKind, logger_init,
};
use rand::Rng;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
struct Wallet {
    address: String,
    key_valid: bool,
}

/// Simulated remote call: random latency, fails with probability `flaky`.
async fn remote_call(flaky: f64) -> Result<(), ExecError> {
    let (latency, failed) = {
        let mut rng = rand::rng();
        (rng.random_range(20..200), rng.random_bool(flaky))
    };
    tokio::time::sleep(Duration::from_millis(latency)).await;
    if failed {
        return Err(ExecError::fail("503 service unavailable"));
    }
    Ok(())
}

fn registry() -> Result<HandlerRegistry<Wallet, String>, fleetvisor::RuntimeError> {
    let authenticate = HandlerFn::arc("authenticate", |w: Wallet, _ctx: CancellationToken| async move {
        if !w.key_valid {
            return Err(ExecError::fatal(format!("{}: invalid private key", w.address)));
        }
        remote_call(0.3).await?;
        Ok(format!("{}: session opened", w.address))
    });

    let balance = HandlerFn::arc("balance", |w: Wallet, _ctx: CancellationToken| async move {
        remote_call(0.2).await?;
        let cents = rand::rng().random_range(0..100_000u32);
        Ok(format!("{}: {}.{:02} USDC", w.address, cents / 100, cents % 100))
    });

    let transfer = HandlerFn::arc("transfer", |w: Wallet, _ctx: CancellationToken| async move {
        remote_call(0.4).await?;
        Ok(format!("{}: transfer confirmed", w.address))
    });

    let poll = HandlerFn::arc("poll", |w: Wallet, ctx: CancellationToken| async move {
        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Err::<String, _>(ExecError::Canceled),
                _ = tokio::time::sleep(Duration::from_millis(500)) => {}
            }
            // Occasional dropped connection; the supervisor restarts the loop.
            remote_call(0.1).await?;
            tracing::debug!(wallet = %w.address, "poll tick");
        }
    });

    HandlerRegistry::builder()
        .register(TaskKind::Authenticate, authenticate)
        .register(TaskKind::BalanceQuery, balance)
        .register(TaskKind::Transfer, transfer)
        .register(TaskKind::PollLoop, poll)
        .build()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger_init(&LoggerConfig::from_env()?)?;

    let cfg = EngineConfig {
        max_parallel: 3,
        retry: RetryPolicy::exponential(3, Duration::from_millis(100)),
        restart: RestartPolicy {
            base_delay: Duration::from_millis(300),
            increment: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            ..RestartPolicy::default()
        },
        unit_timeout: Duration::from_secs(2),
        grace: Duration::from_secs(3),
        ..EngineConfig::default()
    };
    let engine = Engine::builder(cfg, registry()?).build();

    let wallets: Vec<Wallet> = (0..6)
        .map(|i| Wallet {
            address: format!("0x{:04x}", 0xa11ce + i),
            key_valid: i != 4,
        })
        .collect();

    // 1. Batch.
    let tasks: Vec<Task<Wallet>> = wallets
        .iter()
        .flat_map(|w| {
            [TaskKind::Authenticate, TaskKind::BalanceQuery, TaskKind::Transfer]
                .map(|kind| Task::new(kind, w.clone()))
        })
        .collect();
    let report = engine.execute_batch(tasks, None).await;

    for res in &report.results {
        match res.outcome() {
            Ok(line) => println!("{:<28} ok   {line}", res.task_id()),
            Err(err) => println!("{:<28} FAIL {} (attempts {})", res.task_id(), err, res.attempts()),
        }
    }
    println!("batch: {} succeeded, {} failed", report.succeeded, report.failed);

    // 2. Continuous polling loops.
    let loops = wallets
        .iter()
        .filter(|w| w.key_valid)
        .map(|w| Task::new(TaskKind::PollLoop, w.clone()))
        .collect();
    let stagger = StaggerPolicy {
        min: Duration::from_millis(200),
        max: Duration::from_millis(500),
    };
    let ids = engine.launch_staggered(loops, stagger, None).await?;
    println!("launched {} polling loops", ids.len());

    tokio::select! {
        res = engine.run_until_signal() => res?,
        _ = tokio::time::sleep(Duration::from_secs(20)) => engine.shutdown().await?,
    }
    Ok(())
}
