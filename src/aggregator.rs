// Traffic aggregation: byte deltas -> MB/s rate points in a bounded rolling history.

use std::collections::VecDeque;

use crate::error::FeedError;
use crate::models::{BYTES_PER_MB, RatePoint, TrafficSample, TrafficTotals};

/// Bounded FIFO of rate points; oldest evicted first. Timestamps strictly increase.
#[derive(Debug, Clone)]
pub struct TrafficHistory {
    points: VecDeque<RatePoint>,
    capacity: usize,
}

impl TrafficHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Builds a history from existing points, keeping the newest `capacity`.
    pub fn from_points(capacity: usize, points: impl IntoIterator<Item = RatePoint>) -> Self {
        let mut history = Self::new(capacity);
        for p in points {
            history.push(p);
        }
        history
    }

    fn push(&mut self, point: RatePoint) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&RatePoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &RatePoint> + ExactSizeIterator {
        self.points.iter()
    }

    pub fn to_vec(&self) -> Vec<RatePoint> {
        self.points.iter().copied().collect()
    }

    fn clear(&mut self) {
        self.points.clear();
    }
}

#[derive(Debug, Clone)]
pub struct TrafficAggregator {
    history: TrafficHistory,
    totals: TrafficTotals,
    last_timestamp: Option<u64>,
    default_interval_ms: u64,
}

impl TrafficAggregator {
    /// `default_interval_ms` is the elapsed time assumed for the first sample.
    pub fn new(capacity: usize, default_interval_ms: u64) -> Self {
        Self {
            history: TrafficHistory::new(capacity),
            totals: TrafficTotals::default(),
            last_timestamp: None,
            default_interval_ms: default_interval_ms.max(1),
        }
    }

    /// Converts a sample into a rate point and appends it to the history.
    /// Rejected samples leave every counter untouched.
    pub fn ingest(&mut self, sample: TrafficSample) -> Result<RatePoint, FeedError> {
        if sample.download_bytes < 0 || sample.upload_bytes < 0 {
            let err = FeedError::invalid_sample(format!(
                "negative byte count (download {}, upload {})",
                sample.download_bytes, sample.upload_bytes
            ));
            tracing::warn!(error = %err, operation = "ingest", "sample rejected");
            return Err(err);
        }

        let elapsed_ms = match self.last_timestamp {
            Some(prev) if sample.timestamp <= prev => {
                let err = FeedError::invalid_sample(format!(
                    "timestamp {} is not after previous sample at {}",
                    sample.timestamp, prev
                ));
                tracing::warn!(error = %err, operation = "ingest", "sample rejected");
                return Err(err);
            }
            Some(prev) => sample.timestamp - prev,
            None => self.default_interval_ms,
        };
        let elapsed_secs = elapsed_ms as f64 / 1000.0;

        let point = RatePoint {
            timestamp: sample.timestamp,
            download_mbps: sample.download_bytes as f64 / elapsed_secs / BYTES_PER_MB,
            upload_mbps: sample.upload_bytes as f64 / elapsed_secs / BYTES_PER_MB,
        };

        self.totals.bytes_received = self
            .totals
            .bytes_received
            .saturating_add(sample.download_bytes as u64);
        self.totals.bytes_sent = self
            .totals
            .bytes_sent
            .saturating_add(sample.upload_bytes as u64);
        self.last_timestamp = Some(sample.timestamp);
        self.history.push(point);

        tracing::trace!(
            operation = "ingest",
            download_mbps = point.download_mbps,
            upload_mbps = point.upload_mbps,
            elapsed_ms,
            "rate point"
        );
        Ok(point)
    }

    pub fn history(&self) -> &TrafficHistory {
        &self.history
    }

    pub fn totals(&self) -> TrafficTotals {
        self.totals
    }

    /// Clears history and counters; the next sample is treated as the first.
    pub fn reset(&mut self) {
        self.history.clear();
        self.totals = TrafficTotals::default();
        self.last_timestamp = None;
    }
}
