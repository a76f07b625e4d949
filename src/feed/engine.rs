// Synchronous engine state owned by the feed: aggregator, tracker, detector, threat log, path status.
// Every mutation happens under the feed's engine mutex, one tick at a time.

use crate::aggregator::TrafficAggregator;
use crate::config::FeedConfig;
use crate::detector::{DetectorConfig, ThreatDetector};
use crate::error::FeedError;
use crate::models::{
    Connection, ConnectionDelta, FeedSnapshot, FeedState, NetworkStatusSnapshot, PathUpdate,
    RawConnectionEvent, ThreatEvent, TrafficSample,
};
use crate::threat_log::ThreatLog;
use crate::tracker::ConnectionTracker;

pub struct MonitorEngine {
    aggregator: TrafficAggregator,
    tracker: ConnectionTracker,
    detector: ThreatDetector,
    threats: ThreatLog,
    network: NetworkStatusSnapshot,
    /// Last status reported by the source; restored once a degraded source answers again.
    last_path: NetworkStatusSnapshot,
    degraded: bool,
    /// Connections added or changed since the previous evaluation.
    pending: Vec<Connection>,
    ticks: u64,
}

impl MonitorEngine {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            aggregator: TrafficAggregator::new(
                config.history_capacity,
                config.traffic_poll_interval_ms,
            ),
            tracker: ConnectionTracker::new(
                config.connection_grace_period_ms,
                config.connection_ttl_secs.saturating_mul(1000),
            ),
            detector: ThreatDetector::new(DetectorConfig::from(config)),
            threats: ThreatLog::new(config.threat_log_capacity, config.threat_max_age_secs),
            network: NetworkStatusSnapshot::default(),
            last_path: NetworkStatusSnapshot::default(),
            degraded: false,
            pending: Vec::new(),
            ticks: 0,
        }
    }

    /// One traffic tick: ingest, evaluate on the post-ingest history, log. Returns new threats.
    pub fn ingest(&mut self, sample: TrafficSample) -> Result<Vec<ThreatEvent>, FeedError> {
        self.aggregator.ingest(sample)?;
        self.restore_if_degraded();
        let threats = self
            .detector
            .evaluate(self.aggregator.history(), &self.pending);
        self.pending.clear();
        self.threats.append(threats.iter().cloned(), sample.timestamp);
        self.ticks += 1;
        Ok(threats)
    }

    /// Applies source connection events, queues added/changed connections for the
    /// next evaluation, then prunes expired entries.
    pub fn observe_connections(
        &mut self,
        events: Vec<RawConnectionEvent>,
        now: u64,
    ) -> Vec<ConnectionDelta> {
        self.restore_if_degraded();
        let deltas: Vec<ConnectionDelta> = events
            .into_iter()
            .map(|e| self.tracker.observe(e, now))
            .collect();
        for conn in deltas.iter().filter_map(ConnectionDelta::evaluable) {
            self.pending.retain(|p| p.id != conn.id);
            self.pending.push(conn.clone());
        }
        self.tracker.prune(now);
        deltas
    }

    pub fn apply_path(&mut self, update: &PathUpdate) {
        let snapshot = NetworkStatusSnapshot::from(update);
        self.last_path = snapshot.clone();
        self.network = snapshot;
        self.degraded = false;
    }

    /// Source timed out or failed: report Disconnected until it answers again.
    pub fn mark_disconnected(&mut self) {
        self.network = NetworkStatusSnapshot::disconnected();
        self.degraded = true;
    }

    fn restore_if_degraded(&mut self) {
        if self.degraded {
            self.network = self.last_path.clone();
            self.degraded = false;
        }
    }

    pub fn network(&self) -> &NetworkStatusSnapshot {
        &self.network
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn threats_total(&self) -> u64 {
        self.threats.appended_total()
    }

    pub fn connection_count(&self) -> usize {
        self.tracker.len()
    }

    pub fn snapshot(&self, state: FeedState, now: u64) -> FeedSnapshot {
        let history = self.aggregator.history();
        FeedSnapshot {
            timestamp: now,
            state,
            network: self.network.clone(),
            latest: history.latest().copied(),
            history: history.to_vec(),
            totals: self.aggregator.totals(),
            connections: self.tracker.current_connections(),
            threats: self.threats.recent(),
        }
    }
}
