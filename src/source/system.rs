// Host sample source via sysinfo (interface counters, path status) and /proc (TCP connections)

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sysinfo::Networks;
use tracing::instrument;

use super::linux::{self, TcpEntry};
use super::{SampleSource, TrafficDelta};
use crate::models::{ConnectionStatus, PathStatus, PathUpdate, RawConnectionEvent};

pub struct SysinfoSource {
    networks: Arc<Mutex<Networks>>,
    /// Cumulative (received, sent) at the previous traffic_delta call.
    last_totals: Arc<Mutex<Option<(u64, u64)>>>,
    known_connections: Arc<Mutex<HashMap<String, TcpEntry>>>,
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSource {
    pub fn new() -> Self {
        Self {
            networks: Arc::new(Mutex::new(Networks::new_with_refreshed_list())),
            last_totals: Arc::new(Mutex::new(None)),
            known_connections: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sums cumulative counters over non-loopback interfaces.
    fn read_totals(networks: &Mutex<Networks>) -> anyhow::Result<(u64, u64)> {
        let mut guard = networks
            .lock()
            .map_err(|e| anyhow::anyhow!("sysinfo networks lock poisoned: {}", e))?;
        guard.refresh(true);
        Ok(guard
            .list()
            .iter()
            .filter(|(name, _)| name.as_str() != "lo")
            .fold((0u64, 0u64), |(rx, tx), (_, data)| {
                (
                    rx.saturating_add(data.total_received()),
                    tx.saturating_add(data.total_transmitted()),
                )
            }))
    }
}

#[async_trait]
impl SampleSource for SysinfoSource {
    /// Establishes the counter baseline so the first delta covers one interval only.
    #[instrument(skip(self), fields(source = "sysinfo", operation = "register"))]
    async fn register(&self) -> anyhow::Result<()> {
        let networks = self.networks.clone();
        let last_totals = self.last_totals.clone();
        tokio::task::spawn_blocking(move || {
            let totals = Self::read_totals(&networks)?;
            let mut guard = last_totals
                .lock()
                .map_err(|e| anyhow::anyhow!("totals lock poisoned: {}", e))?;
            *guard = Some(totals);
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip(self), fields(source = "sysinfo", operation = "deregister"))]
    async fn deregister(&self) -> anyhow::Result<()> {
        if let Ok(mut guard) = self.last_totals.lock() {
            *guard = None;
        }
        if let Ok(mut guard) = self.known_connections.lock() {
            guard.clear();
        }
        Ok(())
    }

    #[instrument(skip(self), fields(source = "sysinfo", operation = "path_status"))]
    async fn path_status(&self) -> anyhow::Result<PathUpdate> {
        let networks = self.networks.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = networks
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo networks lock poisoned: {}", e))?;
            guard.refresh(true);
            let mut interfaces = BTreeSet::new();
            let mut any_addressed = false;
            for (name, data) in guard.list() {
                if name == "lo" || linux::is_interface_up(name) == Some(false) {
                    continue;
                }
                let has_address = data
                    .ip_networks()
                    .iter()
                    .any(|n| !n.addr.is_loopback() && !n.addr.is_unspecified());
                if !has_address {
                    continue;
                }
                any_addressed = true;
                if let Some(kind) = linux::interface_kind(name) {
                    interfaces.insert(kind);
                }
            }
            let status = if any_addressed {
                PathStatus::Satisfied
            } else {
                PathStatus::Unsatisfied
            };
            Ok(PathUpdate { status, interfaces })
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip(self), fields(source = "sysinfo", operation = "traffic_delta"))]
    async fn traffic_delta(&self) -> anyhow::Result<TrafficDelta> {
        let networks = self.networks.clone();
        let last_totals = self.last_totals.clone();
        tokio::task::spawn_blocking(move || {
            let (rx, tx) = Self::read_totals(&networks)?;
            let mut guard = last_totals
                .lock()
                .map_err(|e| anyhow::anyhow!("totals lock poisoned: {}", e))?;
            let delta = match *guard {
                Some((prev_rx, prev_tx)) => TrafficDelta {
                    bytes_received: rx as i64 - prev_rx as i64,
                    bytes_sent: tx as i64 - prev_tx as i64,
                },
                None => TrafficDelta::default(),
            };
            *guard = Some((rx, tx));
            Ok(delta)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    /// Diffs established TCP connections against the previous call.
    #[instrument(skip(self), fields(source = "sysinfo", operation = "connection_events"))]
    async fn connection_events(&self) -> anyhow::Result<Vec<RawConnectionEvent>> {
        let known = self.known_connections.clone();
        tokio::task::spawn_blocking(move || {
            let current: HashMap<String, TcpEntry> = linux::read_tcp_connections()
                .into_iter()
                .map(|e| (e.id(), e))
                .collect();
            let mut known = known
                .lock()
                .map_err(|e| anyhow::anyhow!("connections lock poisoned: {}", e))?;

            Ok(diff_connections(&mut known, current))
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}

/// Events turning `known` into `current`: Closed for vanished sockets, Opened for new
/// ones and an Active refresh for sockets still established, so the tracker TTL only
/// expires connections the source stopped reporting.
fn diff_connections(
    known: &mut HashMap<String, TcpEntry>,
    current: HashMap<String, TcpEntry>,
) -> Vec<RawConnectionEvent> {
    let mut events: Vec<RawConnectionEvent> = known
        .keys()
        .filter(|id| !current.contains_key(*id))
        .map(|id| RawConnectionEvent::Closed { id: id.clone() })
        .collect();
    for (id, entry) in &current {
        if known.contains_key(id) {
            events.push(RawConnectionEvent::Updated {
                id: id.clone(),
                status: ConnectionStatus::Active,
            });
        } else {
            events.push(opened_event(id, entry.remote));
        }
    }
    *known = current;
    events
}

fn opened_event(id: &str, remote: SocketAddr) -> RawConnectionEvent {
    RawConnectionEvent::Opened {
        id: id.to_string(),
        destination_host: remote.ip().to_string(),
        port: remote.port(),
        protocol: linux::protocol_label(remote.port()).to_string(),
    }
}
