//! Room router: groups connections by meeting id and fans messages out.
//!
//! A room exists implicitly once any connection joins it and is dropped when
//! its last member leaves or is evicted. Membership always reflects registry
//! state: the coordinator's teardown path leaves the room before removing
//! the registry entry.

use super::registry::{ConnectionId, ConnectionRegistry};
use crate::protocol::ServerMessage;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Outcome of leaving a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeftRoom {
    pub meeting_id: String,
    /// True when the leaving connection was the room's last member
    pub now_empty: bool,
}

pub struct RoomRouter {
    registry: Arc<ConnectionRegistry>,
    rooms: RwLock<HashMap<String, HashSet<ConnectionId>>>,
}

impl RoomRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            rooms: RwLock::new(HashMap::new()),
        })
    }

    /// Join a meeting room, leaving any room currently occupied first so a
    /// connection is a member of at most one room at any instant.
    ///
    /// Only registered connections may occupy a room. The membership is
    /// re-checked against the registry after insertion: whichever of a
    /// racing join/disconnect pair runs second undoes the membership, so a
    /// removed connection never lingers in a room.
    pub async fn join(&self, id: ConnectionId, meeting_id: &str) -> Option<LeftRoom> {
        if self.registry.lookup(id).await.is_none() {
            warn!("Join to {} refused: connection {} is not registered", meeting_id, id);
            return None;
        }

        let left = {
            let mut rooms = self.rooms.write().await;
            let left = remove_member(&mut rooms, id);

            rooms
                .entry(meeting_id.to_string())
                .or_default()
                .insert(id);
            left
        };

        self.registry
            .set_meeting(id, Some(meeting_id.to_string()))
            .await;

        if self.registry.lookup(id).await.is_none() {
            let mut rooms = self.rooms.write().await;
            remove_member(&mut rooms, id);
            return left;
        }

        info!("Connection {} joined room {}", id, meeting_id);
        left
    }

    /// Leave whatever room the connection occupies, if any.
    pub async fn leave(&self, id: ConnectionId) -> Option<LeftRoom> {
        let left = {
            let mut rooms = self.rooms.write().await;
            remove_member(&mut rooms, id)
        };

        if let Some(left) = &left {
            self.registry.set_meeting(id, None).await;
            info!("Connection {} left room {}", id, left.meeting_id);
        }

        left
    }

    pub async fn members(&self, meeting_id: &str) -> Vec<ConnectionId> {
        let rooms = self.rooms.read().await;
        rooms
            .get(meeting_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn member_count(&self, meeting_id: &str) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(meeting_id).map(HashSet::len).unwrap_or(0)
    }

    /// Deliver a directed message to one connection.
    pub async fn send_to(&self, id: ConnectionId, message: ServerMessage) -> crate::error::Result<()> {
        self.registry.send_to(id, message).await
    }

    /// Deliver to every current member of the room except the optionally
    /// excluded sender. A member whose transport is already gone is logged
    /// and skipped; partial delivery is expected under churn.
    pub async fn broadcast_room(
        &self,
        meeting_id: &str,
        message: ServerMessage,
        exclude: Option<ConnectionId>,
    ) {
        let members = self.members(meeting_id).await;

        for member in members {
            if Some(member) == exclude {
                continue;
            }
            if let Err(e) = self.send_to(member, message.clone()).await {
                warn!("Broadcast to {} in room {} failed: {}", member, meeting_id, e);
            }
        }
    }

    /// Deliver to every registered connection, roomed or not.
    pub async fn broadcast_all(&self, message: ServerMessage) {
        for id in self.registry.connection_ids().await {
            if let Err(e) = self.registry.send_to(id, message.clone()).await {
                debug!("Broadcast to {} failed: {}", id, e);
            }
        }
    }
}

/// Remove a connection from whatever room holds it, dropping the room when
/// it empties. Caller holds the write lock.
fn remove_member(
    rooms: &mut HashMap<String, HashSet<ConnectionId>>,
    id: ConnectionId,
) -> Option<LeftRoom> {
    let meeting_id = rooms
        .iter()
        .find(|(_, members)| members.contains(&id))
        .map(|(meeting, _)| meeting.clone())?;

    let members = rooms.get_mut(&meeting_id)?;
    members.remove(&id);

    let now_empty = members.is_empty();
    if now_empty {
        rooms.remove(&meeting_id);
        debug!("Room {} emptied and dropped", meeting_id);
    }

    Some(LeftRoom {
        meeting_id,
        now_empty,
    })
}
