// Tracked connections and the raw events a source reports about them

use serde::{Deserialize, Serialize};

/// Connection status; serializes to lowercase JSON (e.g. "active").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Active,
    Idle,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub destination_host: String,
    pub port: u16,
    pub protocol: String,
    pub status: ConnectionStatus,
    pub first_seen: u64,
    pub last_seen: u64,
    #[serde(default)]
    pub closed_at: Option<u64>,
}

/// Event reported by a sample source, keyed by the source's connection id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RawConnectionEvent {
    #[serde(rename_all = "camelCase")]
    Opened {
        id: String,
        destination_host: String,
        port: u16,
        protocol: String,
    },
    Updated {
        id: String,
        status: ConnectionStatus,
    },
    Closed {
        id: String,
    },
}

impl RawConnectionEvent {
    pub fn id(&self) -> &str {
        match self {
            RawConnectionEvent::Opened { id, .. }
            | RawConnectionEvent::Updated { id, .. }
            | RawConnectionEvent::Closed { id } => id,
        }
    }
}

/// Effect of one observed event on the tracked set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "connection", rename_all = "camelCase")]
pub enum ConnectionDelta {
    Added(Connection),
    Changed(Connection),
    /// Still reported by the source with the same status; only `last_seen` moved.
    Refreshed(Connection),
    /// Marked closed; still listed until the grace period passes.
    Closing(Connection),
    /// Removed from the tracked set; carries the final state.
    Removed(Connection),
    /// Event referenced an unknown id and was dropped.
    Ignored(String),
}

impl ConnectionDelta {
    /// The connection a detector should look at, if this delta added or changed one.
    pub fn evaluable(&self) -> Option<&Connection> {
        match self {
            ConnectionDelta::Added(c) | ConnectionDelta::Changed(c) => Some(c),
            _ => None,
        }
    }
}
