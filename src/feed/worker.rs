// Background feed worker: one select loop owns every cadence, so ticks never overlap.
// Source calls are bounded by the source timeout and raced against shutdown.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Duration, Instant, interval, interval_at};
use tracing::Instrument;

use super::Shared;
use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::models::{PathUpdate, TrafficSample};
use crate::source::SampleSource;

/// Source, shared state and shutdown signal for the worker.
pub(super) struct WorkerDeps {
    pub source: Arc<dyn SampleSource>,
    pub shared: Arc<Shared>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Named cadences plus the per-call source timeout.
pub(super) struct WorkerConfig {
    pub traffic_interval: Duration,
    pub detector_interval: Duration,
    pub stats_log_interval: Duration,
    pub source_timeout: Duration,
}

impl From<&FeedConfig> for WorkerConfig {
    fn from(c: &FeedConfig) -> Self {
        Self {
            traffic_interval: Duration::from_millis(c.traffic_poll_interval_ms),
            detector_interval: Duration::from_millis(c.detector_poll_interval_ms),
            stats_log_interval: Duration::from_secs(c.stats_log_interval_secs),
            source_timeout: Duration::from_millis(c.source_timeout_ms),
        }
    }
}

pub(super) enum SourceCall<T> {
    Done(T),
    Failed(FeedError),
    Cancelled,
}

/// Awaits a source call for at most `limit`; failures and timeouts become `SourceUnavailable`.
pub(super) async fn bounded<T, F>(call: F, limit: Duration, operation: &str) -> Result<T, FeedError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(FeedError::source_unavailable(format!("{}: {}", operation, e))),
        Err(_) => Err(FeedError::source_unavailable(format!(
            "{}: timed out after {} ms",
            operation,
            limit.as_millis()
        ))),
    }
}

/// Like [`bounded`], but gives up as soon as shutdown is signalled.
async fn cancellable<T, F>(
    call: F,
    limit: Duration,
    operation: &str,
    cancel_rx: &mut watch::Receiver<bool>,
) -> SourceCall<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel_rx.changed() => SourceCall::Cancelled,
        result = bounded(call, limit, operation) => match result {
            Ok(v) => SourceCall::Done(v),
            Err(e) => SourceCall::Failed(e),
        },
    }
}

/// Resolves on the next pushed path change; `None` once the source drops its sender.
async fn next_path(rx: Option<&mut watch::Receiver<PathUpdate>>) -> Option<PathUpdate> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

pub(super) fn spawn(deps: WorkerDeps, config: WorkerConfig) -> tokio::task::JoinHandle<()> {
    let WorkerDeps {
        source,
        shared,
        mut shutdown_rx,
    } = deps;
    let WorkerConfig {
        traffic_interval,
        detector_interval,
        stats_log_interval,
        source_timeout,
    } = config;

    let worker_span = tracing::span!(
        tracing::Level::DEBUG,
        "feed_worker",
        traffic_interval_ms = traffic_interval.as_millis() as u64,
        detector_interval_ms = detector_interval.as_millis() as u64
    );

    let worker = async move {
        let mut cancel_rx = shutdown_rx.clone();
        // start() already pulled the first sample; the next traffic tick is one interval out.
        let mut traffic_tick = interval_at(Instant::now() + traffic_interval, traffic_interval);
        traffic_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut detector_tick = interval(detector_interval);
        detector_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick =
            interval_at(Instant::now() + stats_log_interval, stats_log_interval);
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut path_rx = source.path_updates();
        let mut path_open = path_rx.is_some();

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    tracing::debug!("Feed worker shutting down");
                    break;
                }
                _ = traffic_tick.tick() => {
                    match cancellable(source.traffic_delta(), source_timeout, "traffic_delta", &mut cancel_rx).await {
                        SourceCall::Cancelled => break,
                        SourceCall::Failed(e) => shared.degrade(e),
                        SourceCall::Done(delta) => {
                            let sample = TrafficSample::new(
                                shared.now_ms(),
                                delta.bytes_received,
                                delta.bytes_sent,
                            );
                            shared.ingest(sample);
                        }
                    }
                }
                _ = detector_tick.tick() => {
                    match cancellable(source.connection_events(), source_timeout, "connection_events", &mut cancel_rx).await {
                        SourceCall::Cancelled => break,
                        SourceCall::Failed(e) => {
                            shared.degrade(e);
                            continue;
                        }
                        SourceCall::Done(events) => shared.observe_connections(events),
                    }
                    if !path_open {
                        match cancellable(source.path_status(), source_timeout, "path_status", &mut cancel_rx).await {
                            SourceCall::Cancelled => break,
                            SourceCall::Failed(e) => shared.degrade(e),
                            SourceCall::Done(update) => shared.apply_path(&update),
                        }
                    }
                }
                update = next_path(path_rx.as_mut()), if path_open => {
                    match update {
                        Some(update) => shared.apply_path(&update),
                        None => {
                            tracing::debug!("path update channel closed; polling path status");
                            path_open = false;
                        }
                    }
                }
                _ = stats_log_tick.tick() => {
                    shared.log_stats();
                }
            }
        }
    };
    tokio::spawn(worker.instrument(worker_span))
}
