// Dashboard feed lifecycle tests on paused tokio time

mod common;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::{MIB, ScriptedSource, opened, test_feed_config};
use netsentry::clock::ManualClock;
use netsentry::config::FeedConfig;
use netsentry::error::{ErrorKind, FeedError};
use netsentry::feed::{DashboardFeed, SubscriptionHandle};
use netsentry::models::{
    FeedState, FeedUpdate, NetworkStatus, PathStatus, PathUpdate, ThreatType,
};
use netsentry::source::TrafficDelta;
use tokio::time::{Duration, Instant, sleep};

fn feed_with(source: Arc<ScriptedSource>) -> DashboardFeed {
    DashboardFeed::new(source, 64)
}

/// Collects every update delivered to a callback.
fn record(feed: &DashboardFeed) -> Arc<Mutex<Vec<FeedUpdate>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    feed.subscribe(move |u| sink.lock().unwrap().push(u.clone()));
    seen
}

#[tokio::test(start_paused = true)]
async fn test_start_then_stop_is_idempotent() {
    let source = Arc::new(ScriptedSource::idle());
    let feed = feed_with(source.clone());

    feed.start(&test_feed_config()).await.expect("start");
    assert_eq!(feed.state(), FeedState::Running);
    assert_eq!(source.registers(), 1);

    feed.stop().await;
    feed.stop().await;
    assert_eq!(feed.state(), FeedState::Stopped);
    assert_eq!(source.deregisters(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_start_is_a_no_op() {
    let source = Arc::new(ScriptedSource::idle());
    let feed = feed_with(source.clone());
    feed.stop().await;
    assert_eq!(feed.state(), FeedState::Stopped);
    assert_eq!(source.deregisters(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_while_running_is_invalid_state() {
    let source = Arc::new(ScriptedSource::idle());
    let feed = feed_with(source.clone());
    feed.start(&test_feed_config()).await.unwrap();
    let err = feed.start(&test_feed_config()).await.unwrap_err();
    assert_eq!(
        err,
        FeedError::InvalidState {
            state: FeedState::Running
        }
    );
    assert_eq!(source.registers(), 1);
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_fails_before_touching_source() {
    let source = Arc::new(ScriptedSource::idle());
    let feed = feed_with(source.clone());
    let config = FeedConfig {
        history_capacity: 0,
        ..test_feed_config()
    };
    let err = feed.start(&config).await.unwrap_err();
    assert!(matches!(err, FeedError::Config { .. }));
    assert_eq!(feed.state(), FeedState::Stopped);
    assert_eq!(source.registers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_startup_timeout_reports_disconnected_and_stays_stopped() {
    let source = Arc::new(ScriptedSource::idle());
    source.set_register_delay(Some(Duration::from_secs(30)));
    let feed = feed_with(source.clone());
    let seen = record(&feed);

    let err = feed.start(&test_feed_config()).await.unwrap_err();
    assert!(matches!(err, FeedError::SourceUnavailable { .. }));
    assert_eq!(feed.state(), FeedState::Stopped);
    assert_eq!(
        feed.current_snapshot().network.status,
        NetworkStatus::Disconnected
    );

    let seen = seen.lock().unwrap();
    assert!(seen.iter().any(|u| matches!(
        u,
        FeedUpdate::Error(e) if e.kind == ErrorKind::SourceUnavailable
    )));
    drop(seen);

    // A later start can still succeed once the source answers.
    source.set_register_delay(None);
    feed.start(&test_feed_config()).await.expect("restart");
    assert_eq!(
        feed.current_snapshot().network.status,
        NetworkStatus::Connected
    );
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_first_sample_is_ingested_on_start() {
    let source = Arc::new(ScriptedSource::new(TrafficDelta {
        bytes_received: 2 * MIB,
        bytes_sent: MIB,
    }));
    let feed = feed_with(source.clone());
    feed.start(&test_feed_config()).await.unwrap();

    let snapshot = feed.current_snapshot();
    assert_eq!(snapshot.state, FeedState::Running);
    assert_eq!(snapshot.history.len(), 1);
    let latest = snapshot.latest.expect("latest point");
    assert_eq!(latest.download_mbps, 2.0);
    assert_eq!(latest.upload_mbps, 1.0);
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_traffic_ticks_publish_snapshots() {
    let source = Arc::new(ScriptedSource::new(TrafficDelta {
        bytes_received: MIB,
        bytes_sent: 0,
    }));
    let feed = feed_with(source.clone());
    let mut rx = feed.updates();
    feed.start(&test_feed_config()).await.unwrap();

    sleep(Duration::from_millis(3_500)).await;
    let snapshot = feed.current_snapshot();
    assert_eq!(snapshot.history.len(), 4);
    assert_eq!(snapshot.totals.bytes_received, 4 * MIB as u64);
    let ts: Vec<u64> = snapshot.history.iter().map(|p| p.timestamp).collect();
    assert!(ts.windows(2).all(|w| w[1] - w[0] == 1_000));

    let mut snapshots = 0;
    while let Ok(update) = rx.try_recv() {
        if matches!(update, FeedUpdate::Snapshot(_)) {
            snapshots += 1;
        }
    }
    assert!(snapshots >= 4, "got {} snapshots", snapshots);
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_burst_after_flat_baseline_publishes_threat() {
    let source = Arc::new(ScriptedSource::idle());
    for _ in 0..10 {
        source.push_delta(10 * MIB, 0);
    }
    source.push_delta(100 * MIB, 0);
    let feed = feed_with(source.clone());
    let seen = record(&feed);
    feed.start(&test_feed_config()).await.unwrap();

    sleep(Duration::from_millis(10_500)).await;
    let threats: Vec<ThreatType> = seen
        .lock()
        .unwrap()
        .iter()
        .filter_map(|u| match u {
            FeedUpdate::Threat(t) => Some(t.threat_type()),
            _ => None,
        })
        .collect();
    assert_eq!(threats, vec![ThreatType::UnusualTraffic]);
    assert_eq!(feed.current_snapshot().threats.len(), 1);
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_deny_listed_connection_is_reported_on_next_traffic_tick() {
    let source = Arc::new(ScriptedSource::idle());
    source.push_events(vec![
        opened("c1", "beacon.tracker.example", 443),
        opened("c2", "docs.example", 443),
    ]);
    let feed = feed_with(source.clone());
    let config = FeedConfig {
        deny_list: vec!["*.tracker.example".into()],
        ..test_feed_config()
    };
    feed.start(&config).await.unwrap();

    sleep(Duration::from_millis(1_500)).await;
    let snapshot = feed.current_snapshot();
    assert_eq!(snapshot.connections.len(), 2);
    assert_eq!(snapshot.threats.len(), 1);
    assert_eq!(
        snapshot.threats[0].threat_type(),
        ThreatType::SuspiciousConnection
    );

    // Already evaluated connections are not reported again.
    sleep(Duration::from_millis(2_000)).await;
    assert_eq!(feed.current_snapshot().threats.len(), 1);
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_peer_address_in_denied_range_is_reported() {
    let source = Arc::new(ScriptedSource::idle());
    source.push_events(vec![
        opened("c1", "142.250.80.98", 443),
        opened("c2", "198.51.100.7", 443),
    ]);
    let feed = feed_with(source.clone());
    let config = FeedConfig {
        deny_list: vec!["*.doubleclick.net".into(), "142.250.0.0/16".into()],
        ..test_feed_config()
    };
    feed.start(&config).await.unwrap();

    sleep(Duration::from_millis(1_500)).await;
    let snapshot = feed.current_snapshot();
    assert_eq!(snapshot.connections.len(), 2);
    assert_eq!(snapshot.threats.len(), 1);
    assert_eq!(
        snapshot.threats[0].threat_type(),
        ThreatType::SuspiciousConnection
    );
    assert_eq!(snapshot.threats[0].destination_ip(), Some("142.250.80.98"));
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_pushed_path_updates_then_polling_after_channel_closes() {
    let source = Arc::new(ScriptedSource::idle());
    let path_tx = source.push_paths();
    let feed = feed_with(source.clone());
    let seen = record(&feed);
    feed.start(&test_feed_config()).await.unwrap();
    assert_eq!(source.path_polls(), 1);

    // While the channel is open the detector tick does not poll.
    sleep(Duration::from_millis(5_500)).await;
    assert_eq!(source.path_polls(), 1);

    path_tx
        .send(PathUpdate {
            status: PathStatus::Unsatisfied,
            interfaces: BTreeSet::new(),
        })
        .unwrap();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(
        feed.current_snapshot().network.status,
        NetworkStatus::Disconnected
    );
    let published_disconnected = seen.lock().unwrap().iter().any(|u| {
        matches!(u, FeedUpdate::Snapshot(s) if s.network.status == NetworkStatus::Disconnected)
    });
    assert!(published_disconnected);

    // Closed channel: path status is polled again, on the detector cadence.
    drop(path_tx);
    sleep(Duration::from_millis(3_400)).await;
    assert_eq!(source.path_polls(), 1);
    assert_eq!(
        feed.current_snapshot().network.status,
        NetworkStatus::Disconnected
    );

    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(source.path_polls(), 2);
    assert_eq!(
        feed.current_snapshot().network.status,
        NetworkStatus::Connected
    );
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_runtime_timeout_degrades_then_recovers() {
    let source = Arc::new(ScriptedSource::idle());
    let feed = feed_with(source.clone());
    let mut rx = feed.updates();
    feed.start(&test_feed_config()).await.unwrap();
    assert_eq!(
        feed.current_snapshot().network.status,
        NetworkStatus::Connected
    );

    // Tick at 1s hangs and times out at 3s.
    source.set_traffic_delay(Some(Duration::from_secs(30)));
    sleep(Duration::from_millis(3_500)).await;
    assert_eq!(
        feed.current_snapshot().network.status,
        NetworkStatus::Disconnected
    );
    assert_eq!(feed.state(), FeedState::Running);

    let mut saw_error = false;
    while let Ok(update) = rx.try_recv() {
        if let FeedUpdate::Error(e) = update {
            assert_eq!(e.kind, ErrorKind::SourceUnavailable);
            saw_error = true;
        }
    }
    assert!(saw_error);

    // The missed tick fired at 3s and times out at 5s; the tick after it answers
    // and restores the last known path.
    source.set_traffic_delay(None);
    sleep(Duration::from_millis(2_500)).await;
    assert_eq!(
        feed.current_snapshot().network.status,
        NetworkStatus::Connected
    );
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_tick_is_skipped_not_retried() {
    let source = Arc::new(ScriptedSource::idle());
    let feed = feed_with(source.clone());
    feed.start(&test_feed_config()).await.unwrap();
    source.set_fail_traffic(true);
    sleep(Duration::from_millis(2_500)).await;
    // One call at start plus one per tick.
    assert_eq!(source.traffic_calls.load(Ordering::SeqCst), 3);
    assert_eq!(feed.current_snapshot().history.len(), 1);
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_in_flight_source_call() {
    let source = Arc::new(ScriptedSource::idle());
    let feed = feed_with(source.clone());
    let config = FeedConfig {
        source_timeout_ms: 60_000,
        ..test_feed_config()
    };
    feed.start(&config).await.unwrap();
    source.set_traffic_delay(Some(Duration::from_secs(600)));
    sleep(Duration::from_millis(1_500)).await;

    let before = Instant::now();
    feed.stop().await;
    assert!(before.elapsed() < Duration::from_secs(1));
    assert_eq!(feed.state(), FeedState::Stopped);
    assert_eq!(source.deregisters(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_inside_callback_stops_delivery() {
    let source = Arc::new(ScriptedSource::idle());
    let feed = Arc::new(feed_with(source.clone()));

    let calls = Arc::new(AtomicUsize::new(0));
    let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
    let h = {
        let calls = calls.clone();
        let slot = slot.clone();
        let weak = Arc::downgrade(&feed);
        feed.subscribe(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            let handle = *slot.lock().unwrap();
            if let (Some(feed), Some(handle)) = (weak.upgrade(), handle) {
                feed.unsubscribe(handle);
            }
        })
    };
    *slot.lock().unwrap() = Some(h);

    let others = Arc::new(AtomicUsize::new(0));
    let counter = others.clone();
    feed.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    feed.start(&test_feed_config()).await.unwrap();
    sleep(Duration::from_millis(3_500)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(others.load(Ordering::SeqCst) > 1);
    assert!(!feed.unsubscribe(h));
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_panicking_callback_does_not_stop_the_feed() {
    let source = Arc::new(ScriptedSource::idle());
    let feed = feed_with(source.clone());
    feed.subscribe(|_| panic!("subscriber bug"));
    let seen = record(&feed);

    feed.start(&test_feed_config()).await.unwrap();
    sleep(Duration::from_millis(2_500)).await;
    assert_eq!(feed.state(), FeedState::Running);
    assert!(seen.lock().unwrap().len() >= 3);
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_restart_begins_with_fresh_state() {
    let source = Arc::new(ScriptedSource::new(TrafficDelta {
        bytes_received: MIB,
        bytes_sent: 0,
    }));
    let feed = feed_with(source.clone());
    feed.start(&test_feed_config()).await.unwrap();
    sleep(Duration::from_millis(2_500)).await;
    feed.stop().await;
    assert_eq!(feed.current_snapshot().history.len(), 3);

    feed.start(&test_feed_config()).await.unwrap();
    let snapshot = feed.current_snapshot();
    assert_eq!(snapshot.history.len(), 1);
    assert_eq!(snapshot.totals.bytes_received, MIB as u64);
    assert_eq!(source.registers(), 2);
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_is_an_independent_copy() {
    let source = Arc::new(ScriptedSource::idle());
    let feed = feed_with(source.clone());
    feed.start(&test_feed_config()).await.unwrap();
    let mut snapshot = feed.current_snapshot();
    snapshot.history.clear();
    assert_eq!(feed.current_snapshot().history.len(), 1);
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stalled_clock_samples_are_rejected_as_invalid() {
    let source = Arc::new(ScriptedSource::idle());
    let clock = ManualClock::new(1_000);
    let feed = DashboardFeed::with_clock(source, 64, Arc::new(clock.clone()));
    let seen = record(&feed);
    feed.start(&test_feed_config()).await.unwrap();

    sleep(Duration::from_millis(1_500)).await;
    assert!(seen.lock().unwrap().iter().any(|u| matches!(
        u,
        FeedUpdate::Error(e) if e.kind == ErrorKind::InvalidSample
    )));
    assert_eq!(feed.current_snapshot().history.len(), 1);

    clock.advance(5_000);
    sleep(Duration::from_millis(1_000)).await;
    let snapshot = feed.current_snapshot();
    assert_eq!(snapshot.history.len(), 2);
    assert_eq!(snapshot.latest.map(|p| p.timestamp), Some(6_000));
    feed.stop().await;
}
