// Network path status models

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Interface kind; serializes to camelCase JSON (e.g. "wifi").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InterfaceKind {
    #[serde(rename = "wifi")]
    WiFi,
    Cellular,
    Ethernet,
}

impl InterfaceKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            InterfaceKind::WiFi => "Wi-Fi",
            InterfaceKind::Cellular => "Cellular",
            InterfaceKind::Ethernet => "Ethernet",
        }
    }
}

/// Path reachability as reported by a sample source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PathStatus {
    Satisfied,
    Unsatisfied,
    RequiresConnection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathUpdate {
    pub status: PathStatus,
    pub interfaces: BTreeSet<InterfaceKind>,
}

/// Dashboard-facing connectivity status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkStatus {
    #[default]
    Unknown,
    Connected,
    Disconnected,
    Connecting,
}

impl From<PathStatus> for NetworkStatus {
    fn from(status: PathStatus) -> Self {
        match status {
            PathStatus::Satisfied => NetworkStatus::Connected,
            PathStatus::Unsatisfied => NetworkStatus::Disconnected,
            PathStatus::RequiresConnection => NetworkStatus::Connecting,
        }
    }
}

/// Replaced wholesale on every path change; never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatusSnapshot {
    pub status: NetworkStatus,
    pub active_interfaces: BTreeSet<InterfaceKind>,
}

impl NetworkStatusSnapshot {
    pub fn disconnected() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            active_interfaces: BTreeSet::new(),
        }
    }
}

impl From<&PathUpdate> for NetworkStatusSnapshot {
    fn from(update: &PathUpdate) -> Self {
        Self {
            status: update.status.into(),
            active_interfaces: update.interfaces.clone(),
        }
    }
}
