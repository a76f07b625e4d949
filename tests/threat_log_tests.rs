// Threat log retention tests

use netsentry::models::{ThreatEvent, ThreatType};
use netsentry::threat_log::ThreatLog;

fn threat(timestamp: u64) -> ThreatEvent {
    ThreatEvent::new(ThreatType::UnusualTraffic, 2, "spike", timestamp)
}

#[test]
fn test_capacity_drops_oldest_first() {
    let mut log = ThreatLog::new(3, None);
    log.append((1..=5).map(threat), 5);
    let ts: Vec<u64> = log.recent().iter().map(|t| t.timestamp()).collect();
    assert_eq!(ts, vec![3, 4, 5]);
    assert_eq!(log.appended_total(), 5);
}

#[test]
fn test_age_limit_drops_expired_events() {
    let mut log = ThreatLog::new(100, Some(10));
    log.append([threat(1_000), threat(5_000)], 5_000);
    assert_eq!(log.len(), 2);
    log.prune(12_000);
    assert_eq!(log.len(), 1);
    assert_eq!(log.recent()[0].timestamp(), 5_000);
    log.prune(15_001);
    assert!(log.is_empty());
    assert_eq!(log.appended_total(), 2);
}

#[test]
fn test_recent_is_a_copy() {
    let mut log = ThreatLog::new(10, None);
    log.append([threat(1)], 1);
    let mut copy = log.recent();
    copy.clear();
    assert_eq!(log.len(), 1);
}
