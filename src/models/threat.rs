// Threat records produced by the detector

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lowest and highest severity a threat can carry.
pub const MIN_SEVERITY: u8 = 1;
pub const MAX_SEVERITY: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThreatType {
    SuspiciousConnection,
    UnusualTraffic,
    PotentialMalware,
    DataLeakage,
}

impl ThreatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::SuspiciousConnection => "suspicious_connection",
            ThreatType::UnusualTraffic => "unusual_traffic",
            ThreatType::PotentialMalware => "potential_malware",
            ThreatType::DataLeakage => "data_leakage",
        }
    }
}

impl std::fmt::Display for ThreatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable threat record. Fields are private; build with [`ThreatEvent::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatEvent {
    id: Uuid,
    threat_type: ThreatType,
    severity: u8,
    description: String,
    timestamp: u64,
    source_ip: Option<String>,
    destination_ip: Option<String>,
}

impl ThreatEvent {
    /// Creates a threat with a fresh id; severity is clamped to 1..=5.
    pub fn new(
        threat_type: ThreatType,
        severity: u8,
        description: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            threat_type,
            severity: severity.clamp(MIN_SEVERITY, MAX_SEVERITY),
            description: description.into(),
            timestamp,
            source_ip: None,
            destination_ip: None,
        }
    }

    pub fn with_source_ip(mut self, ip: impl Into<String>) -> Self {
        self.source_ip = Some(ip.into());
        self
    }

    pub fn with_destination_ip(mut self, ip: impl Into<String>) -> Self {
        self.destination_ip = Some(ip.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn threat_type(&self) -> ThreatType {
        self.threat_type
    }

    pub fn severity(&self) -> u8 {
        self.severity
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn source_ip(&self) -> Option<&str> {
        self.source_ip.as_deref()
    }

    pub fn destination_ip(&self) -> Option<&str> {
        self.destination_ip.as_deref()
    }
}
