// Sample source capability: where traffic counters, connection events and path status come from.

mod linux;
mod system;

pub use system::SysinfoSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::models::{PathUpdate, RawConnectionEvent};

/// Bytes moved since the previous `traffic_delta` call. Negative on counter regression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficDelta {
    pub bytes_received: i64,
    pub bytes_sent: i64,
}

/// Implemented by anything that can feed the engine. Every call is bounded by the
/// feed's source timeout and may be cancelled by `stop()` mid-flight.
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Called once by `start` before the first sample.
    async fn register(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once by `stop` after the worker has exited.
    async fn deregister(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn path_status(&self) -> anyhow::Result<PathUpdate>;

    /// Push channel for path changes; `None` means path status is polled only.
    fn path_updates(&self) -> Option<watch::Receiver<PathUpdate>> {
        None
    }

    async fn traffic_delta(&self) -> anyhow::Result<TrafficDelta>;

    /// Connection events since the previous call.
    async fn connection_events(&self) -> anyhow::Result<Vec<RawConnectionEvent>>;
}
