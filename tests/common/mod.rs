// Shared test helpers: a scripted sample source and config builders
#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use netsentry::config::FeedConfig;
use netsentry::models::{InterfaceKind, PathStatus, PathUpdate, RawConnectionEvent};
use netsentry::source::{SampleSource, TrafficDelta};
use tokio::sync::watch;
use tokio::time::Duration;

pub const MIB: i64 = 1024 * 1024;

/// Sample source driven by the test: queued deltas and events, optional delays, call counters.
pub struct ScriptedSource {
    pub register_calls: AtomicUsize,
    pub path_calls: AtomicUsize,
    pub deregister_calls: AtomicUsize,
    pub traffic_calls: AtomicUsize,
    pub event_calls: AtomicUsize,
    deltas: Mutex<VecDeque<TrafficDelta>>,
    default_delta: TrafficDelta,
    events: Mutex<VecDeque<Vec<RawConnectionEvent>>>,
    path: Mutex<PathUpdate>,
    pushed_paths: Mutex<Option<watch::Receiver<PathUpdate>>>,
    register_delay: Mutex<Option<Duration>>,
    traffic_delay: Mutex<Option<Duration>>,
    fail_traffic: AtomicBool,
}

impl ScriptedSource {
    /// Every traffic call returns `default_delta` once the queue is empty.
    pub fn new(default_delta: TrafficDelta) -> Self {
        Self {
            register_calls: AtomicUsize::new(0),
            path_calls: AtomicUsize::new(0),
            deregister_calls: AtomicUsize::new(0),
            traffic_calls: AtomicUsize::new(0),
            event_calls: AtomicUsize::new(0),
            deltas: Mutex::new(VecDeque::new()),
            default_delta,
            events: Mutex::new(VecDeque::new()),
            path: Mutex::new(wifi_path()),
            pushed_paths: Mutex::new(None),
            register_delay: Mutex::new(None),
            traffic_delay: Mutex::new(None),
            fail_traffic: AtomicBool::new(false),
        }
    }

    pub fn idle() -> Self {
        Self::new(TrafficDelta::default())
    }

    pub fn push_delta(&self, bytes_received: i64, bytes_sent: i64) {
        self.deltas.lock().unwrap().push_back(TrafficDelta {
            bytes_received,
            bytes_sent,
        });
    }

    pub fn push_events(&self, events: Vec<RawConnectionEvent>) {
        self.events.lock().unwrap().push_back(events);
    }

    pub fn set_path(&self, update: PathUpdate) {
        *self.path.lock().unwrap() = update;
    }

    /// Offers a push channel seeded with the current path. Dropping the sender closes it.
    pub fn push_paths(&self) -> watch::Sender<PathUpdate> {
        let (tx, rx) = watch::channel(self.path.lock().unwrap().clone());
        *self.pushed_paths.lock().unwrap() = Some(rx);
        tx
    }

    pub fn path_polls(&self) -> usize {
        self.path_calls.load(Ordering::SeqCst)
    }

    pub fn set_register_delay(&self, delay: Option<Duration>) {
        *self.register_delay.lock().unwrap() = delay;
    }

    pub fn set_traffic_delay(&self, delay: Option<Duration>) {
        *self.traffic_delay.lock().unwrap() = delay;
    }

    pub fn set_fail_traffic(&self, fail: bool) {
        self.fail_traffic.store(fail, Ordering::SeqCst);
    }

    pub fn registers(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn deregisters(&self) -> usize {
        self.deregister_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SampleSource for ScriptedSource {
    async fn register(&self) -> anyhow::Result<()> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.register_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn deregister(&self) -> anyhow::Result<()> {
        self.deregister_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn path_status(&self) -> anyhow::Result<PathUpdate> {
        self.path_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.path.lock().unwrap().clone())
    }

    fn path_updates(&self) -> Option<watch::Receiver<PathUpdate>> {
        self.pushed_paths.lock().unwrap().clone()
    }

    async fn traffic_delta(&self) -> anyhow::Result<TrafficDelta> {
        self.traffic_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.traffic_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        anyhow::ensure!(
            !self.fail_traffic.load(Ordering::SeqCst),
            "scripted traffic failure"
        );
        let next = self.deltas.lock().unwrap().pop_front();
        Ok(next.unwrap_or(self.default_delta))
    }

    async fn connection_events(&self) -> anyhow::Result<Vec<RawConnectionEvent>> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.events.lock().unwrap().pop_front().unwrap_or_default())
    }
}

pub fn wifi_path() -> PathUpdate {
    PathUpdate {
        status: PathStatus::Satisfied,
        interfaces: BTreeSet::from([InterfaceKind::WiFi]),
    }
}

/// Defaults with a short timeout and a quiet stats log.
pub fn test_feed_config() -> FeedConfig {
    FeedConfig {
        source_timeout_ms: 2000,
        stats_log_interval_secs: 3600,
        ..FeedConfig::default()
    }
}

pub fn opened(id: &str, host: &str, port: u16) -> RawConnectionEvent {
    RawConnectionEvent::Opened {
        id: id.into(),
        destination_host: host.into(),
        port,
        protocol: "tcp".into(),
    }
}
