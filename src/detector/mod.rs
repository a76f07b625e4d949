// Threat detection rules. Pure: output depends only on (history, connections, config).
// The current point is the newest point in the history, evaluated after that tick's ingest and eviction.

mod patterns;
mod stats;

use crate::aggregator::TrafficHistory;
use crate::config::FeedConfig;
use crate::models::{Connection, MAX_SEVERITY, RatePoint, ThreatEvent, ThreatType};
use patterns::{HostPattern, host_ip};
use stats::{mean_f64, stddev_f64};

const SUSPICIOUS_CONNECTION_SEVERITY: u8 = 4;
const SUSPICIOUS_PORT_SEVERITY: u8 = 4;
const DATA_LEAKAGE_SEVERITY: u8 = 3;

/// True if `raw` parses as a deny pattern: host, `*.domain`, IP address or CIDR range.
pub(crate) fn is_valid_host_pattern(raw: &str) -> bool {
    HostPattern::parse(raw).is_some()
}

/// Records the destination address only when the host is an IP literal.
fn with_destination(threat: ThreatEvent, conn: &Connection) -> ThreatEvent {
    match host_ip(&conn.destination_host) {
        Some(ip) => threat.with_destination_ip(ip.to_string()),
        None => threat,
    }
}

/// Rule parameters, taken from [`FeedConfig`].
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub spike_stddev_threshold: f64,
    pub spike_min_mbps: f64,
    pub min_window_for_spike: usize,
    pub leak_ratio_threshold: f64,
    pub leak_sustained_ticks: usize,
    pub leak_min_upload_mbps: f64,
    pub deny_list: Vec<String>,
    pub suspicious_ports: Vec<u16>,
}

impl From<&FeedConfig> for DetectorConfig {
    fn from(c: &FeedConfig) -> Self {
        Self {
            spike_stddev_threshold: c.spike_stddev_threshold,
            spike_min_mbps: c.spike_min_mbps,
            min_window_for_spike: c.min_window_for_spike,
            leak_ratio_threshold: c.leak_ratio_threshold,
            leak_sustained_ticks: c.leak_sustained_ticks,
            leak_min_upload_mbps: c.leak_min_upload_mbps,
            deny_list: c.deny_list.clone(),
            suspicious_ports: c.suspicious_ports.clone(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::from(&FeedConfig::default())
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Download,
    Upload,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Download => "download",
            Direction::Upload => "upload",
        }
    }

    fn rate(self, p: &RatePoint) -> f64 {
        match self {
            Direction::Download => p.download_mbps,
            Direction::Upload => p.upload_mbps,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThreatDetector {
    config: DetectorConfig,
    deny_patterns: Vec<HostPattern>,
}

impl ThreatDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let deny_patterns = config
            .deny_list
            .iter()
            .filter_map(|raw| {
                let parsed = HostPattern::parse(raw);
                if parsed.is_none() {
                    tracing::warn!(pattern = %raw, "ignoring malformed deny_list entry");
                }
                parsed
            })
            .collect();
        Self {
            config,
            deny_patterns,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Runs every rule; all may fire in the same call.
    pub fn evaluate(&self, history: &TrafficHistory, connections: &[Connection]) -> Vec<ThreatEvent> {
        let mut threats = self.evaluate_traffic(history);
        if let Some(latest) = history.latest() {
            threats.extend(self.evaluate_connections(connections, latest.timestamp));
        }
        threats
    }

    /// Spike and leak rules over the rate history.
    pub fn evaluate_traffic(&self, history: &TrafficHistory) -> Vec<ThreatEvent> {
        let mut threats = Vec::new();
        for direction in [Direction::Download, Direction::Upload] {
            if let Some(t) = self.spike_rule(history, direction) {
                threats.push(t);
            }
        }
        if let Some(t) = self.leak_rule(history) {
            threats.push(t);
        }
        threats
    }

    /// Destination and port rules over connections; `timestamp` stamps the threats.
    pub fn evaluate_connections(&self, connections: &[Connection], timestamp: u64) -> Vec<ThreatEvent> {
        let mut threats = Vec::new();
        for conn in connections {
            if self
                .deny_patterns
                .iter()
                .any(|p| p.matches(&conn.destination_host))
            {
                threats.push(with_destination(
                    ThreatEvent::new(
                        ThreatType::SuspiciousConnection,
                        SUSPICIOUS_CONNECTION_SEVERITY,
                        format!(
                            "Connection to deny-listed destination {}:{} ({})",
                            conn.destination_host, conn.port, conn.protocol
                        ),
                        timestamp,
                    ),
                    conn,
                ));
            }
            if self.config.suspicious_ports.contains(&conn.port) {
                threats.push(with_destination(
                    ThreatEvent::new(
                        ThreatType::PotentialMalware,
                        SUSPICIOUS_PORT_SEVERITY,
                        format!(
                            "Connection to {} on port {} commonly used by malware",
                            conn.destination_host, conn.port
                        ),
                        timestamp,
                    ),
                    conn,
                ));
            }
        }
        threats
    }

    /// Fires iff current > mean + k * stddev over at least `min_window_for_spike` prior points
    /// and the current rate is at least `spike_min_mbps`.
    fn spike_rule(&self, history: &TrafficHistory, direction: Direction) -> Option<ThreatEvent> {
        let current = history.latest()?;
        if direction.rate(current) < self.config.spike_min_mbps {
            return None;
        }
        let baseline: Vec<f64> = history
            .iter()
            .take(history.len() - 1)
            .map(|p| direction.rate(p))
            .collect();
        if baseline.len() < self.config.min_window_for_spike {
            return None;
        }

        let rate = direction.rate(current);
        let mean = mean_f64(&baseline);
        let stddev = stddev_f64(&baseline, mean);
        let k = self.config.spike_stddev_threshold;
        if rate <= mean + k * stddev {
            return None;
        }

        let severity = if stddev > 0.0 {
            let sigmas = (rate - mean) / stddev;
            ((sigmas - k).floor() + 1.0).clamp(1.0, MAX_SEVERITY as f64) as u8
        } else {
            MAX_SEVERITY
        };
        Some(ThreatEvent::new(
            ThreatType::UnusualTraffic,
            severity,
            format!(
                "Unusual {} spike: {:.2} MB/s against a mean of {:.2} MB/s over {} points",
                direction.label(),
                rate,
                mean,
                baseline.len()
            ),
            current.timestamp,
        ))
    }

    /// Fires once per episode, when the trailing run of leak-like points reaches the configured length.
    fn leak_rule(&self, history: &TrafficHistory) -> Option<ThreatEvent> {
        let current = history.latest()?;
        let ratio = self.config.leak_ratio_threshold;
        let min_upload = self.config.leak_min_upload_mbps;
        let run = history
            .iter()
            .rev()
            .take_while(|p| p.upload_mbps >= min_upload && p.upload_mbps > p.download_mbps * ratio)
            .count();
        if run != self.config.leak_sustained_ticks {
            return None;
        }
        Some(ThreatEvent::new(
            ThreatType::DataLeakage,
            DATA_LEAKAGE_SEVERITY,
            format!(
                "Upload exceeded {:.1}x download for {} consecutive intervals ({:.2} MB/s up, {:.2} MB/s down)",
                ratio, run, current.upload_mbps, current.download_mbps
            ),
            current.timestamp,
        ))
    }
}
