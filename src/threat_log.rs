// Append-only threat log with count and age retention.

use std::collections::VecDeque;

use crate::models::ThreatEvent;

#[derive(Debug, Clone)]
pub struct ThreatLog {
    events: VecDeque<ThreatEvent>,
    capacity: usize,
    max_age_ms: Option<u64>,
    appended_total: u64,
}

impl ThreatLog {
    pub fn new(capacity: usize, max_age_secs: Option<u64>) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
            max_age_ms: max_age_secs.map(|s| s.saturating_mul(1000)),
            appended_total: 0,
        }
    }

    /// Appends in order, then applies retention relative to `now`.
    pub fn append(&mut self, threats: impl IntoIterator<Item = ThreatEvent>, now: u64) {
        for t in threats {
            self.events.push_back(t);
            self.appended_total += 1;
        }
        self.prune(now);
    }

    /// Drops events older than the age limit and the oldest events beyond capacity.
    pub fn prune(&mut self, now: u64) {
        if let Some(max_age) = self.max_age_ms {
            let cutoff = now.saturating_sub(max_age);
            self.events.retain(|t| t.timestamp() >= cutoff);
        }
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
    }

    pub fn recent(&self) -> Vec<ThreatEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Threats ever appended, including those since dropped by retention.
    pub fn appended_total(&self) -> u64 {
        self.appended_total
    }
}
