use std::sync::Arc;

use tokio::select;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    core::{EngineConfig, alive::AliveTracker, engine::Engine},
    events::Bus,
    subscribers::{LogWriter, Subscribe, SubscriberSet},
    tasks::HandlerRegistry,
};

/// Builder for an [`Engine`] with its event plumbing.
pub struct EngineBuilder<P, V> {
    cfg: EngineConfig,
    registry: HandlerRegistry<P, V>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    log_writer: bool,
}

impl<P, V> EngineBuilder<P, V>
where
    P: Clone + Send + 'static,
    V: Send + 'static,
{
    /// Creates a builder; a [`LogWriter`] is attached unless disabled.
    pub fn new(cfg: EngineConfig, registry: HandlerRegistry<P, V>) -> Self {
        Self {
            cfg,
            registry,
            subscribers: Vec::new(),
            log_writer: true,
        }
    }

    /// Sets event subscribers.
    ///
    /// Each one gets a dedicated worker with a bounded queue; a slow or
    /// panicking subscriber never blocks task execution.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Does not attach the default [`LogWriter`].
    pub fn without_log_writer(mut self) -> Self {
        self.log_writer = false;
        self
    }

    /// Builds the engine and starts its event listener.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(mut self) -> Arc<Engine<P, V>> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        if self.log_writer {
            self.subscribers.push(Arc::new(LogWriter::new()));
        }
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let alive = Arc::new(AliveTracker::new());
        let listener_token = CancellationToken::new();

        spawn_listener(&bus, subs, Arc::clone(&alive), listener_token.clone());

        Arc::new(Engine::new_internal(
            self.cfg,
            self.registry,
            bus,
            alive,
            listener_token,
        ))
    }
}

/// Forwards bus events to the alive tracker and the subscriber set until the
/// engine is dropped.
fn spawn_listener(bus: &Bus, subs: SubscriberSet, alive: Arc<AliveTracker>, stop: CancellationToken) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            select! {
                biased;
                recv = rx.recv() => match recv {
                    Ok(ev) => {
                        alive.update(&ev).await;
                        subs.emit_arc(Arc::new(ev));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event listener lagged; events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = stop.cancelled() => break,
            }
        }
        subs.shutdown().await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecError;
    use crate::events::{Event, EventKind};
    use crate::tasks::{HandlerFn, Task, TaskKind};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Kinds(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Kinds {
        async fn on_event(&self, ev: &Event) {
            if let Ok(mut kinds) = self.0.lock() {
                kinds.push(ev.kind);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_batch_events() {
        let kinds = Arc::new(Kinds::default());
        let handler = HandlerFn::arc("ok", |n: u32, _ctx: CancellationToken| async move {
            Ok::<_, ExecError>(n + 1)
        });
        let registry = HandlerRegistry::builder()
            .register_each(TaskKind::ALL, handler)
            .build()
            .expect("complete registry");

        let engine = EngineBuilder::new(EngineConfig::default(), registry)
            .without_log_writer()
            .with_subscriber(kinds.clone())
            .build();

        let report = engine
            .execute_batch(vec![Task::new(TaskKind::BalanceQuery, 1)], Some(1))
            .await;
        assert_eq!(report.results[0].value(), Some(&2));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let seen = kinds.0.lock().expect("lock").clone();
        assert_eq!(seen.first(), Some(&EventKind::BatchStarted));
        assert_eq!(seen.last(), Some(&EventKind::BatchFinished));
        assert!(seen.contains(&EventKind::AttemptSucceeded));
    }
}
