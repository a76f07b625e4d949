// Connection tracking: applies raw source events to the current connection set.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::models::{Connection, ConnectionDelta, ConnectionStatus, RawConnectionEvent};

#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    connections: HashMap<String, Connection>,
    grace_period_ms: u64,
    ttl_ms: u64,
}

impl ConnectionTracker {
    pub fn new(grace_period_ms: u64, ttl_ms: u64) -> Self {
        Self {
            connections: HashMap::new(),
            grace_period_ms,
            ttl_ms,
        }
    }

    /// Applies one event. Unknown ids on Updated/Closed are logged and ignored.
    pub fn observe(&mut self, event: RawConnectionEvent, now: u64) -> ConnectionDelta {
        match event {
            RawConnectionEvent::Opened {
                id,
                destination_host,
                port,
                protocol,
            } => {
                if let Some(existing) = self.connections.get_mut(&id) {
                    debug!(connection_id = %id, "Opened for tracked connection; refreshing");
                    existing.destination_host = destination_host;
                    existing.port = port;
                    existing.protocol = protocol;
                    existing.status = ConnectionStatus::Active;
                    existing.last_seen = now;
                    existing.closed_at = None;
                    return ConnectionDelta::Changed(existing.clone());
                }
                let conn = Connection {
                    id: id.clone(),
                    destination_host,
                    port,
                    protocol,
                    status: ConnectionStatus::Active,
                    first_seen: now,
                    last_seen: now,
                    closed_at: None,
                };
                self.connections.insert(id, conn.clone());
                ConnectionDelta::Added(conn)
            }
            RawConnectionEvent::Updated {
                id,
                status: ConnectionStatus::Closed,
            }
            | RawConnectionEvent::Closed { id } => self.close(id, now),
            RawConnectionEvent::Updated { id, status } => {
                let Some(existing) = self.connections.get_mut(&id) else {
                    warn!(connection_id = %id, operation = "observe", "update for unknown connection");
                    return ConnectionDelta::Ignored(id);
                };
                existing.last_seen = now;
                if existing.status == status && existing.closed_at.is_none() {
                    return ConnectionDelta::Refreshed(existing.clone());
                }
                existing.status = status;
                existing.closed_at = None;
                ConnectionDelta::Changed(existing.clone())
            }
        }
    }

    fn close(&mut self, id: String, now: u64) -> ConnectionDelta {
        if self.grace_period_ms == 0 {
            return match self.connections.remove(&id) {
                Some(mut conn) => {
                    conn.status = ConnectionStatus::Closed;
                    conn.last_seen = now;
                    conn.closed_at = Some(now);
                    ConnectionDelta::Removed(conn)
                }
                None => {
                    warn!(connection_id = %id, operation = "observe", "close for unknown connection");
                    ConnectionDelta::Ignored(id)
                }
            };
        }
        let Some(existing) = self.connections.get_mut(&id) else {
            warn!(connection_id = %id, operation = "observe", "close for unknown connection");
            return ConnectionDelta::Ignored(id);
        };
        existing.status = ConnectionStatus::Closed;
        existing.last_seen = now;
        existing.closed_at.get_or_insert(now);
        ConnectionDelta::Closing(existing.clone())
    }

    /// Drops closed connections past the grace period and connections idle past the TTL.
    pub fn prune(&mut self, now: u64) -> Vec<Connection> {
        let grace = self.grace_period_ms;
        let ttl = self.ttl_ms;
        let expired: Vec<String> = self
            .connections
            .values()
            .filter(|c| match c.closed_at {
                Some(closed_at) => now.saturating_sub(closed_at) >= grace,
                None => now.saturating_sub(c.last_seen) >= ttl,
            })
            .map(|c| c.id.clone())
            .collect();

        let mut removed: Vec<Connection> = expired
            .iter()
            .filter_map(|id| self.connections.remove(id))
            .collect();
        removed.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then_with(|| a.id.cmp(&b.id)));
        if !removed.is_empty() {
            debug!(operation = "prune", removed = removed.len(), "connections pruned");
        }
        removed
    }

    /// Copy of the tracked set, ordered by first_seen then id.
    pub fn current_connections(&self) -> Vec<Connection> {
        let mut out: Vec<Connection> = self.connections.values().cloned().collect();
        out.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
