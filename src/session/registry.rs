//! Connection registry: the single source of truth for which real-time
//! connections are currently live.
//!
//! The registry owns each connection's outbound transport handle; everything
//! else sees connections through snapshots and `send_to`.

use crate::error::{ParleyError, Result};
use crate::protocol::ServerMessage;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Opaque identifier assigned to each admitted transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Liveness probe state, reset before each probe round and restored only by
/// a pong. A connection still `AwaitingPong` at the next round is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    AwaitingPong,
}

struct Connection {
    sender: mpsc::Sender<ServerMessage>,
    meeting_id: Option<String>,
    display_name: Option<String>,
    liveness: Liveness,
    last_activity: Instant,
}

/// Read-only snapshot of a connection's metadata.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub meeting_id: Option<String>,
    pub display_name: Option<String>,
    pub liveness: Liveness,
    pub last_activity: Instant,
}

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
        })
    }

    /// Admit a transport and assign it a fresh connection id.
    pub async fn admit(&self, sender: mpsc::Sender<ServerMessage>) -> ConnectionId {
        let id = ConnectionId::new();
        let connection = Connection {
            sender,
            meeting_id: None,
            display_name: None,
            liveness: Liveness::Alive,
            last_activity: Instant::now(),
        };

        let mut connections = self.connections.write().await;
        connections.insert(id, connection);
        info!("Connection {} admitted ({} live)", id, connections.len());

        id
    }

    /// Remove a connection, dropping its transport handle. Idempotent:
    /// removing an already-absent id is a no-op, which guards against
    /// double-eviction races between close events and liveness eviction.
    pub async fn remove(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(&id).map(|c| ConnectionInfo {
            id,
            meeting_id: c.meeting_id,
            display_name: c.display_name,
            liveness: c.liveness,
            last_activity: c.last_activity,
        });

        if removed.is_some() {
            info!("Connection {} removed ({} live)", id, connections.len());
        }

        removed
    }

    pub async fn lookup(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        let connections = self.connections.read().await;
        connections.get(&id).map(|c| ConnectionInfo {
            id,
            meeting_id: c.meeting_id.clone(),
            display_name: c.display_name.clone(),
            liveness: c.liveness,
            last_activity: c.last_activity,
        })
    }

    /// Update last observed activity.
    pub async fn touch(&self, id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&id) {
            connection.last_activity = Instant::now();
        }
    }

    /// Deliver a message to one connection. Failure means the transport is
    /// gone or wedged; callers treat it as a transport failure.
    pub async fn send_to(&self, id: ConnectionId, message: ServerMessage) -> Result<()> {
        let connections = self.connections.read().await;
        let connection = connections
            .get(&id)
            .ok_or_else(|| ParleyError::NotConnected { id: id.to_string() })?;

        connection
            .sender
            .try_send(message)
            .map_err(|e| ParleyError::Transport {
                message: format!("connection {}: {}", id, e),
            })
    }

    pub async fn set_meeting(&self, id: ConnectionId, meeting_id: Option<String>) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&id) {
            connection.meeting_id = meeting_id;
        }
    }

    pub async fn set_display_name(&self, id: ConnectionId, display_name: Option<String>) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&id) {
            connection.display_name = display_name;
        }
    }

    /// Begin a probe round for one connection: returns its previous liveness
    /// state and resets it to `AwaitingPong` in the same lock acquisition,
    /// so the probe/evict decision is atomic with respect to removal.
    pub async fn begin_probe(&self, id: ConnectionId) -> Option<Liveness> {
        let mut connections = self.connections.write().await;
        connections.get_mut(&id).map(|connection| {
            let previous = connection.liveness;
            connection.liveness = Liveness::AwaitingPong;
            previous
        })
    }

    /// Record a pong: the connection answered this round's probe.
    pub async fn mark_alive(&self, id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&id) {
            connection.liveness = Liveness::Alive;
            connection.last_activity = Instant::now();
            debug!("Connection {} answered liveness probe", id);
        }
    }

    pub async fn connection_ids(&self) -> Vec<ConnectionId> {
        let connections = self.connections.read().await;
        connections.keys().copied().collect()
    }

    pub async fn count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Drop every connection, closing all transports. Used by shutdown after
    /// the drain notice has gone out.
    pub async fn clear(&self) -> usize {
        let mut connections = self.connections.write().await;
        let count = connections.len();
        connections.clear();
        count
    }
}
