//! # Retrying task runner.
//!
//! [`run_with_retry`] drives one short task to a terminal [`TaskResult`]:
//!
//! ```text
//! state = RetryState::new(policy.max_attempts)
//! loop {
//!   ├─► run_attempt(attempt = state.attempt + 1)
//!   │       ├─ Ok(v)  ──► (RecoveredAfterRetry if attempt > 0) ──► success
//!   │       └─ Err(e) ──► retryable && state.can_retry()?
//!   │                        ├─ no  ──► RetriesExhausted ──► failure(e)
//!   │                        └─ yes ──► RetryScheduled{ delay = policy.delay(attempt) }
//!   │                                   sleep(delay) (cancellable)
//!   │                                   state.advance()
//! }
//! ```
//!
//! ## Rules
//! - Bounded loop: at most `max_attempts + 1` attempts, never recursion.
//! - Attempts run **sequentially**; the payload is cloned per attempt.
//! - Cancellation during backoff ends the task with [`ExecError::Canceled`].

use std::time::Duration;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::core::unit::{AttemptMeta, run_attempt};
use crate::error::ExecError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::RetryPolicy;
use crate::tasks::{HandlerRef, Task, TaskResult};

/// Attempt counter of one retrying run.
///
/// Created at runner entry, advanced on each retryable failure, discarded on
/// success or exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    max_attempts: u32,
}

impl RetryState {
    /// Fresh state for a policy allowing `max_attempts` retries.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
        }
    }

    /// 0-based index of the current attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Retries allowed after the first attempt.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempts made so far, counting the current one.
    pub fn attempts_made(&self) -> u32 {
        self.attempt.saturating_add(1)
    }

    /// `true` while another attempt is allowed.
    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Moves to the next attempt.
    pub fn advance(&mut self) {
        self.attempt = self.attempt.saturating_add(1);
    }
}

/// Runs `task` through `handler` until it succeeds or retrying is pointless.
pub(crate) async fn run_with_retry<P, V>(
    task: Task<P>,
    handler: HandlerRef<P, V>,
    policy: RetryPolicy,
    timeout: Option<Duration>,
    bus: Bus,
    token: CancellationToken,
) -> TaskResult<V>
where
    P: Clone + Send + 'static,
    V: Send + 'static,
{
    let id = task.id().clone();
    let kind = task.kind();
    let mut state = RetryState::new(policy.max_attempts);

    loop {
        let meta = AttemptMeta {
            task: &id,
            kind,
            attempt: state.attempts_made(),
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
                if state.attempt() > 0 {
                    bus.publish(
                        Event::new(EventKind::RecoveredAfterRetry)
                            .with_task(&id)
                            .with_task_kind(kind)
                            .with_attempt(state.attempts_made()),
                    );
                }
                return TaskResult::success(id, value, state.attempts_made());
            }
            Err(err) => err,
        };

        if !err.is_retryable() || !state.can_retry() || token.is_cancelled() {
            bus.publish(
                Event::new(EventKind::RetriesExhausted)
                    .with_task(&id)
                    .with_task_kind(kind)
                    .with_attempt(state.attempts_made())
                    .with_reason(err.as_message()),
            );
            return TaskResult::failure(id, err, state.attempts_made());
        }

        let delay = policy.delay(state.attempt());
        bus.publish(
            Event::new(EventKind::RetryScheduled)
                .with_task(&id)
                .with_task_kind(kind)
                .with_attempt(state.attempts_made())
                .with_delay(delay)
                .with_reason(err.as_message()),
        );

        let sleep = time::sleep(delay);
        tokio::pin!(sleep);
        select! {
            _ = &mut sleep => {}
            _ = token.cancelled() => {
                return TaskResult::failure(id, ExecError::Canceled, state.attempts_made());
            }
        }
        state.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{HandlerFn, TaskKind};
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Handler failing its first `failures` attempts, recording attempt start times.
    fn flaky(
        failures: u32,
        calls: Arc<AtomicU32>,
        starts: Arc<Mutex<Vec<Instant>>>,
    ) -> HandlerRef<(), u32> {
        HandlerFn::arc("flaky", move |_p: (), _ctx: CancellationToken| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut starts) = starts.lock() {
                starts.push(Instant::now());
            }
            async move {
                if n < failures {
                    Err(ExecError::fail(format!("503 on attempt {n}")))
                } else {
                    Ok(n)
                }
            }
        })
    }

    fn task() -> Task<()> {
        Task::new(TaskKind::BalanceQuery, ())
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_task_runs_max_attempts_plus_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let starts = Arc::new(Mutex::new(Vec::new()));
        let handler = flaky(u32::MAX, calls.clone(), starts);
        let policy = RetryPolicy::exponential(3, Duration::from_secs(1));

        let res = run_with_retry(
            task(),
            handler,
            policy,
            None,
            Bus::new(64),
            CancellationToken::new(),
        )
        .await;

        assert!(!res.is_success());
        assert_eq!(res.attempts(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(res.error(), Some(&ExecError::fail("503 on attempt 3")));
    }

    #[tokio::test(start_paused = true)]
    async fn late_success_runs_i_plus_one_times_with_doubling_delays() {
        let calls = Arc::new(AtomicU32::new(0));
        let starts = Arc::new(Mutex::new(Vec::new()));
        let handler = flaky(3, calls.clone(), starts.clone());
        let policy = RetryPolicy::exponential(5, Duration::from_millis(500));

        let res = run_with_retry(
            task(),
            handler,
            policy,
            None,
            Bus::new(64),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(res.value(), Some(&3));
        assert_eq!(res.attempts(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let starts = starts.lock().expect("lock").clone();
        let gaps: Vec<Duration> = starts.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let handler: HandlerRef<(), u32> =
            HandlerFn::arc("bad-key", move |_p: (), _ctx: CancellationToken| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err::<u32, _>(ExecError::fatal("invalid private key")) }
            });

        let res = run_with_retry(
            task(),
            handler,
            RetryPolicy::default(),
            None,
            Bus::new(64),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(res.attempts(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(res.error(), Some(&ExecError::fatal("invalid private key")));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let starts = Arc::new(Mutex::new(Vec::new()));
        let handler = flaky(u32::MAX, calls.clone(), starts);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let begun = Instant::now();
        let res = run_with_retry(
            task(),
            handler,
            RetryPolicy::exponential(10, Duration::from_secs(60)),
            None,
            Bus::new(64),
            token,
        )
        .await;

        assert_eq!(res.error(), Some(&ExecError::Canceled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(Instant::now() - begun, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_count_as_retryable_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let handler: HandlerRef<(), u32> =
            HandlerFn::arc("hang-once", move |_p: (), _ctx: CancellationToken| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        time::sleep(Duration::from_secs(3600)).await;
                    }
                    Ok(n)
                }
            });

        let res = run_with_retry(
            task(),
            handler,
            RetryPolicy::exponential(2, Duration::from_secs(1)),
            Some(Duration::from_secs(10)),
            Bus::new(64),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(res.value(), Some(&1));
        assert_eq!(res.attempts(), 2);
    }

    #[test]
    fn state_bounds_attempts() {
        let mut state = RetryState::new(2);
        assert!(state.can_retry());
        state.advance();
        state.advance();
        assert!(!state.can_retry());
        assert_eq!(state.attempts_made(), 3);
        assert_eq!(state.max_attempts(), 2);
    }
}
