// Traffic samples, derived rate points and cumulative counters

use serde::{Deserialize, Serialize};

/// Bytes per megabyte used for all rate figures (MiB base).
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Raw byte deltas for one traffic interval. Signed so a source can report a
/// counter regression; the aggregator rejects negative values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSample {
    pub timestamp: u64,
    pub download_bytes: i64,
    pub upload_bytes: i64,
}

impl TrafficSample {
    pub fn new(timestamp: u64, download_bytes: i64, upload_bytes: i64) -> Self {
        Self {
            timestamp,
            download_bytes,
            upload_bytes,
        }
    }
}

/// One point of the rate history, in MB/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatePoint {
    pub timestamp: u64,
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

/// Cumulative byte counters since start (or the last aggregator reset).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficTotals {
    pub bytes_received: u64,
    pub bytes_sent: u64,
}
