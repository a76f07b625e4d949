use serde::Deserialize;

use crate::error::FeedError;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub publishing: PublishingConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishingConfig {
    /// Max number of feed updates buffered per async subscriber (slow WebSocket clients may lag).
    pub broadcast_capacity: usize,
}

/// Options passed to `DashboardFeed::start`. Every field has a default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Rate points kept in the rolling history.
    pub history_capacity: usize,
    /// Traffic cadence; also the elapsed time assumed for the first sample.
    pub traffic_poll_interval_ms: u64,
    /// Connection/path polling cadence feeding the detector.
    pub detector_poll_interval_ms: u64,
    /// Upper bound on any single sample source call.
    pub source_timeout_ms: u64,
    pub spike_stddev_threshold: f64,
    /// Rates below this (MB/s) never count as a spike. Keeps an idle link with a flat
    /// zero baseline from reporting a severity-5 spike on its first few bytes.
    pub spike_min_mbps: f64,
    pub min_window_for_spike: usize,
    /// Upload must exceed download by this factor to count toward a leak.
    pub leak_ratio_threshold: f64,
    pub leak_sustained_ticks: usize,
    /// Uploads below this rate (MB/s) never count toward a leak.
    pub leak_min_upload_mbps: f64,
    pub connection_grace_period_ms: u64,
    /// Connections with no update for this long are dropped.
    pub connection_ttl_secs: u64,
    /// Exact host names, `*.domain` wildcards, IP addresses or CIDR ranges.
    /// The built-in source reports peer IPs, so host-name entries only match
    /// sources that supply names.
    pub deny_list: Vec<String>,
    pub suspicious_ports: Vec<u16>,
    pub threat_log_capacity: usize,
    pub threat_max_age_secs: Option<u64>,
    /// How often to log feed stats at INFO level.
    pub stats_log_interval_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            history_capacity: 60,
            traffic_poll_interval_ms: 1000,
            detector_poll_interval_ms: 5000,
            source_timeout_ms: 2000,
            spike_stddev_threshold: 3.0,
            spike_min_mbps: 0.1,
            min_window_for_spike: 10,
            leak_ratio_threshold: 4.0,
            leak_sustained_ticks: 5,
            leak_min_upload_mbps: 0.5,
            connection_grace_period_ms: 0,
            connection_ttl_secs: 300,
            deny_list: Vec::new(),
            suspicious_ports: vec![4444, 6667, 31337],
            threat_log_capacity: 500,
            threat_max_age_secs: None,
            stats_log_interval_secs: 60,
        }
    }
}

macro_rules! ensure_config {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err(FeedError::config(format!($($arg)+)));
        }
    };
}

impl FeedConfig {
    pub fn validate(&self) -> Result<(), FeedError> {
        ensure_config!(
            self.history_capacity >= 2,
            "feed.history_capacity must be >= 2, got {}",
            self.history_capacity
        );
        ensure_config!(
            self.traffic_poll_interval_ms > 0,
            "feed.traffic_poll_interval_ms must be > 0, got {}",
            self.traffic_poll_interval_ms
        );
        ensure_config!(
            self.detector_poll_interval_ms > 0,
            "feed.detector_poll_interval_ms must be > 0, got {}",
            self.detector_poll_interval_ms
        );
        ensure_config!(
            self.source_timeout_ms > 0,
            "feed.source_timeout_ms must be > 0, got {}",
            self.source_timeout_ms
        );
        ensure_config!(
            self.spike_stddev_threshold.is_finite() && self.spike_stddev_threshold > 0.0,
            "feed.spike_stddev_threshold must be a positive number, got {}",
            self.spike_stddev_threshold
        );
        ensure_config!(
            self.spike_min_mbps.is_finite() && self.spike_min_mbps >= 0.0,
            "feed.spike_min_mbps must be >= 0, got {}",
            self.spike_min_mbps
        );
        ensure_config!(
            self.min_window_for_spike >= 2 && self.min_window_for_spike < self.history_capacity,
            "feed.min_window_for_spike must be between 2 and history_capacity - 1, got {}",
            self.min_window_for_spike
        );
        ensure_config!(
            self.leak_ratio_threshold.is_finite() && self.leak_ratio_threshold >= 1.0,
            "feed.leak_ratio_threshold must be >= 1.0, got {}",
            self.leak_ratio_threshold
        );
        ensure_config!(
            self.leak_sustained_ticks > 0 && self.leak_sustained_ticks < self.history_capacity,
            "feed.leak_sustained_ticks must be between 1 and history_capacity - 1, got {}",
            self.leak_sustained_ticks
        );
        ensure_config!(
            self.leak_min_upload_mbps.is_finite() && self.leak_min_upload_mbps >= 0.0,
            "feed.leak_min_upload_mbps must be >= 0, got {}",
            self.leak_min_upload_mbps
        );
        ensure_config!(
            self.connection_ttl_secs > 0,
            "feed.connection_ttl_secs must be > 0, got {}",
            self.connection_ttl_secs
        );
        for pattern in &self.deny_list {
            ensure_config!(
                crate::detector::is_valid_host_pattern(pattern),
                "feed.deny_list entry {:?} must be a host name, *.domain, IP address or CIDR range",
                pattern
            );
        }
        ensure_config!(
            self.threat_log_capacity > 0,
            "feed.threat_log_capacity must be > 0, got {}",
            self.threat_log_capacity
        );
        ensure_config!(
            self.threat_max_age_secs != Some(0),
            "feed.threat_max_age_secs must be > 0 when set"
        );
        ensure_config!(
            self.stats_log_interval_secs > 0,
            "feed.stats_log_interval_secs must be > 0, got {}",
            self.stats_log_interval_secs
        );
        Ok(())
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(!self.server.host.is_empty(), "server.host must be non-empty");
        anyhow::ensure!(
            self.publishing.broadcast_capacity > 0,
            "publishing.broadcast_capacity must be > 0, got {}",
            self.publishing.broadcast_capacity
        );
        self.feed.validate()?;
        Ok(())
    }
}
