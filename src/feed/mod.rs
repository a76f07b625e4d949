// Dashboard feed: lifecycle state machine, shared engine state and fan-out to subscribers.
// Engine state sits behind a std mutex that is never held across an await or a callback.

mod engine;
mod subscribers;
mod worker;

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::instrument;

pub use engine::MonitorEngine;
pub use subscribers::{FeedCallback, SubscriptionHandle};

use crate::clock::{Clock, SystemClock};
use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::models::{
    FeedSnapshot, FeedState, FeedUpdate, PathUpdate, RawConnectionEvent, ThreatEvent,
    TrafficSample,
};
use crate::source::SampleSource;
use subscribers::SubscriberRegistry;
use worker::{WorkerConfig, WorkerDeps, bounded};

/// Takes the guard even if a previous holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// State shared between the public facade and the worker task.
struct Shared {
    state: Mutex<FeedState>,
    engine: Mutex<MonitorEngine>,
    subscribers: SubscriberRegistry,
    updates_tx: broadcast::Sender<FeedUpdate>,
    clock: Arc<dyn Clock>,
}

impl Shared {
    fn state(&self) -> FeedState {
        *lock(&self.state)
    }

    fn set_state(&self, state: FeedState) {
        let previous = std::mem::replace(&mut *lock(&self.state), state);
        tracing::debug!(from = %previous, to = %state, "feed state changed");
    }

    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Callbacks first, then async receivers. No receivers is not an error.
    fn publish(&self, update: FeedUpdate) {
        self.subscribers.publish(&update);
        let _ = self.updates_tx.send(update);
    }

    fn snapshot(&self) -> FeedSnapshot {
        let state = self.state();
        let now = self.now_ms();
        lock(&self.engine).snapshot(state, now)
    }

    fn publish_snapshot(&self) {
        let snapshot = self.snapshot();
        self.publish(FeedUpdate::Snapshot(Box::new(snapshot)));
    }

    fn publish_error(&self, error: &FeedError) {
        let event = error.to_event(self.now_ms());
        self.publish(FeedUpdate::Error(event));
    }

    fn publish_threats(&self, threats: Vec<ThreatEvent>) {
        for threat in threats {
            tracing::info!(
                threat_type = %threat.threat_type(),
                severity = threat.severity(),
                description = threat.description(),
                "threat detected"
            );
            self.publish(FeedUpdate::Threat(threat));
        }
    }

    /// Runs one traffic tick and publishes its outcome. Invalid samples are dropped.
    fn ingest(&self, sample: TrafficSample) {
        let result = lock(&self.engine).ingest(sample);
        match result {
            Ok(threats) => {
                self.publish_threats(threats);
                self.publish_snapshot();
            }
            Err(e) => self.publish_error(&e),
        }
    }

    /// A source call failed or timed out while running.
    fn degrade(&self, error: FeedError) {
        tracing::warn!(error = %error, "sample source degraded; reporting disconnected");
        lock(&self.engine).mark_disconnected();
        self.publish_error(&error);
        self.publish_snapshot();
    }

    fn observe_connections(&self, events: Vec<RawConnectionEvent>) {
        if events.is_empty() {
            return;
        }
        let now = self.now_ms();
        let deltas = lock(&self.engine).observe_connections(events, now);
        tracing::debug!(events = deltas.len(), "connection events applied");
    }

    fn apply_path(&self, update: &PathUpdate) {
        let changed = {
            let mut engine = lock(&self.engine);
            let before = engine.network().clone();
            engine.apply_path(update);
            *engine.network() != before
        };
        if changed {
            tracing::info!(
                status = ?update.status,
                interfaces = update.interfaces.len(),
                "network path changed"
            );
            self.publish_snapshot();
        }
    }

    fn log_stats(&self) {
        let (ticks, threats_total, connections) = {
            let engine = lock(&self.engine);
            (
                engine.ticks(),
                engine.threats_total(),
                engine.connection_count(),
            )
        };
        tracing::info!(
            ticks,
            threats_total,
            connections,
            subscribers = self.subscribers.len(),
            async_receivers = self.updates_tx.receiver_count(),
            "feed stats"
        );
    }

    fn reset_engine(&self, config: &FeedConfig) {
        *lock(&self.engine) = MonitorEngine::new(config);
    }
}

struct RunningWorker {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    source_timeout: Duration,
}

/// Public entry point: owns the sample source, runs the worker, fans out updates.
pub struct DashboardFeed {
    source: Arc<dyn SampleSource>,
    shared: Arc<Shared>,
    /// Serializes start/stop; `Some` exactly while a worker exists.
    control: tokio::sync::Mutex<Option<RunningWorker>>,
}

impl DashboardFeed {
    pub fn new(source: Arc<dyn SampleSource>, broadcast_capacity: usize) -> Self {
        Self::with_clock(source, broadcast_capacity, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(
        source: Arc<dyn SampleSource>,
        broadcast_capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (updates_tx, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            source,
            shared: Arc::new(Shared {
                state: Mutex::new(FeedState::Stopped),
                engine: Mutex::new(MonitorEngine::new(&FeedConfig::default())),
                subscribers: SubscriberRegistry::default(),
                updates_tx,
                clock,
            }),
            control: tokio::sync::Mutex::new(None),
        }
    }

    /// Registers with the source, pulls the first sample and spawns the worker.
    #[instrument(skip(self, config))]
    pub async fn start(&self, config: &FeedConfig) -> Result<(), FeedError> {
        config.validate()?;
        let mut control = self.control.lock().await;
        let state = self.shared.state();
        if state != FeedState::Stopped {
            return Err(FeedError::InvalidState { state });
        }

        self.shared.set_state(FeedState::Starting);
        self.shared.reset_engine(config);
        let source_timeout = Duration::from_millis(config.source_timeout_ms);

        let first = async {
            bounded(self.source.register(), source_timeout, "register").await?;
            let path = match bounded(self.source.path_status(), source_timeout, "path_status").await
            {
                Ok(update) => Some(update),
                Err(e) => {
                    tracing::warn!(error = %e, "initial path status unavailable");
                    None
                }
            };
            let delta =
                bounded(self.source.traffic_delta(), source_timeout, "traffic_delta").await?;
            Ok::<_, FeedError>((path, delta))
        }
        .await;

        let (path, delta) = match first {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "feed failed to start");
                if let Err(de) =
                    bounded(self.source.deregister(), source_timeout, "deregister").await
                {
                    tracing::debug!(error = %de, "deregister after failed start");
                }
                lock(&self.shared.engine).mark_disconnected();
                self.shared.set_state(FeedState::Stopped);
                self.shared.publish_error(&e);
                self.shared.publish_snapshot();
                return Err(e);
            }
        };

        let sample = TrafficSample::new(self.shared.now_ms(), delta.bytes_received, delta.bytes_sent);
        let first_tick = {
            let mut engine = lock(&self.shared.engine);
            if let Some(update) = &path {
                engine.apply_path(update);
            }
            engine.ingest(sample)
        };
        match first_tick {
            Ok(threats) => self.shared.publish_threats(threats),
            Err(e) => self.shared.publish_error(&e),
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = worker::spawn(
            WorkerDeps {
                source: self.source.clone(),
                shared: self.shared.clone(),
                shutdown_rx,
            },
            WorkerConfig::from(config),
        );
        *control = Some(RunningWorker {
            shutdown_tx,
            handle,
            source_timeout,
        });
        self.shared.set_state(FeedState::Running);
        tracing::info!(
            traffic_poll_interval_ms = config.traffic_poll_interval_ms,
            detector_poll_interval_ms = config.detector_poll_interval_ms,
            history_capacity = config.history_capacity,
            "feed started"
        );
        self.shared.publish_snapshot();
        Ok(())
    }

    /// Stops the worker and deregisters from the source. No-op when already stopped.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;
        let Some(running) = control.take() else {
            return;
        };
        self.shared.set_state(FeedState::Stopping);
        let _ = running.shutdown_tx.send(true);
        if let Err(e) = running.handle.await {
            tracing::warn!(error = %e, "feed worker task failed");
        }
        if let Err(e) = bounded(
            self.source.deregister(),
            running.source_timeout,
            "deregister",
        )
        .await
        {
            tracing::warn!(error = %e, "deregister failed");
        }
        self.shared.set_state(FeedState::Stopped);
        tracing::info!("feed stopped");
        self.shared.publish_snapshot();
    }

    /// Callbacks run on the worker task with no feed lock held.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&FeedUpdate) + Send + Sync + 'static,
    {
        self.shared.subscribers.subscribe(Arc::new(callback))
    }

    /// Returns false if the handle was not subscribed.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.shared.subscribers.unsubscribe(handle)
    }

    /// Async stream of every published update. Slow receivers lag and skip.
    pub fn updates(&self) -> broadcast::Receiver<FeedUpdate> {
        self.shared.updates_tx.subscribe()
    }

    pub fn current_snapshot(&self) -> FeedSnapshot {
        self.shared.snapshot()
    }

    pub fn state(&self) -> FeedState {
        self.shared.state()
    }
}

impl Drop for DashboardFeed {
    fn drop(&mut self) {
        if let Some(running) = self.control.get_mut().take() {
            tracing::debug!("feed dropped while running; aborting worker");
            running.handle.abort();
        }
    }
}
