// Feed lifecycle state, consumer snapshots and the subscription stream items

use serde::{Deserialize, Serialize};

use super::{
    Connection, NetworkStatusSnapshot, RatePoint, ThreatEvent, TrafficTotals,
};
use crate::error::ErrorEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for FeedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FeedState::Stopped => "stopped",
            FeedState::Starting => "starting",
            FeedState::Running => "running",
            FeedState::Stopping => "stopping",
        };
        write!(f, "{}", s)
    }
}

/// Everything a consumer sees of the engine at one instant, by value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub timestamp: u64,
    pub state: FeedState,
    pub network: NetworkStatusSnapshot,
    pub latest: Option<RatePoint>,
    pub history: Vec<RatePoint>,
    pub totals: TrafficTotals,
    pub connections: Vec<Connection>,
    pub threats: Vec<ThreatEvent>,
}

/// One item on the subscription stream; JSON is tagged by "type".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum FeedUpdate {
    Snapshot(Box<FeedSnapshot>),
    Threat(ThreatEvent),
    Error(ErrorEvent),
}
