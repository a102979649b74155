use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use shared::{
    domain::{ConversationId, UserId},
    protocol::{PresencePayload, ServerEvent},
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

pub type ConnectionId = u64;

struct Connection {
    user_id: UserId,
    outbound: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashSet<ConversationId>,
}

#[derive(Default)]
struct HubState {
    next_id: ConnectionId,
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<ConversationId, HashSet<ConnectionId>>,
}

impl HubState {
    fn connections_of(&self, user_id: &UserId) -> impl Iterator<Item = &Connection> + '_ {
        let user_id = user_id.clone();
        self.connections
            .values()
            .filter(move |connection| connection.user_id == user_id)
    }

    fn broadcast_except(&self, skip: ConnectionId, event: &ServerEvent) {
        for (id, connection) in &self.connections {
            if *id != skip {
                let _ = connection.outbound.send(event.clone());
            }
        }
    }
}

/// Live websocket connections, their rooms and per-user presence.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<Mutex<HubState>>,
}

impl Hub {
    /// Announces `user-online` to everyone else when this is the user's first connection.
    pub async fn register(
        &self,
        user_id: UserId,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) -> ConnectionId {
        let mut state = self.inner.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        let first = state.connections_of(&user_id).next().is_none();
        state.connections.insert(
            id,
            Connection {
                user_id: user_id.clone(),
                outbound,
                rooms: HashSet::new(),
            },
        );
        if first {
            info!(user_id = %user_id, "hub: user online");
            state.broadcast_except(id, &ServerEvent::UserOnline(PresencePayload { user_id }));
        }
        id
    }

    /// Announces `user-offline` when the user's last connection goes away.
    pub async fn unregister(&self, id: ConnectionId) {
        let mut state = self.inner.lock().await;
        let Some(connection) = state.connections.remove(&id) else {
            return;
        };
        for room in &connection.rooms {
            if let Some(members) = state.rooms.get_mut(room) {
                members.remove(&id);
                if members.is_empty() {
                    state.rooms.remove(room);
                }
            }
        }
        if state.connections_of(&connection.user_id).next().is_none() {
            info!(user_id = %connection.user_id, "hub: user offline");
            state.broadcast_except(
                id,
                &ServerEvent::UserOffline(PresencePayload {
                    user_id: connection.user_id,
                }),
            );
        }
    }

    pub async fn join(&self, id: ConnectionId, conversation_id: ConversationId) {
        let mut state = self.inner.lock().await;
        let Some(connection) = state.connections.get_mut(&id) else {
            return;
        };
        connection.rooms.insert(conversation_id.clone());
        debug!(connection = id, conversation_id = %conversation_id, "hub: joined room");
        state.rooms.entry(conversation_id).or_default().insert(id);
    }

    pub async fn leave(&self, id: ConnectionId, conversation_id: &ConversationId) {
        let mut state = self.inner.lock().await;
        if let Some(connection) = state.connections.get_mut(&id) {
            connection.rooms.remove(conversation_id);
        }
        if let Some(members) = state.rooms.get_mut(conversation_id) {
            members.remove(&id);
            if members.is_empty() {
                state.rooms.remove(conversation_id);
            }
        }
    }

    pub async fn send_to_room(&self, conversation_id: &ConversationId, event: &ServerEvent) {
        let state = self.inner.lock().await;
        let Some(members) = state.rooms.get(conversation_id) else {
            return;
        };
        for member in members {
            if let Some(connection) = state.connections.get(member) {
                let _ = connection.outbound.send(event.clone());
            }
        }
    }

    pub async fn send_to_user(&self, user_id: &UserId, event: &ServerEvent) {
        let state = self.inner.lock().await;
        for connection in state.connections_of(user_id) {
            let _ = connection.outbound.send(event.clone());
        }
    }

    pub async fn send_to_connection(&self, id: ConnectionId, event: ServerEvent) {
        let state = self.inner.lock().await;
        if let Some(connection) = state.connections.get(&id) {
            let _ = connection.outbound.send(event);
        }
    }

    /// True when any of the user's connections has joined the room.
    pub async fn user_in_room(&self, user_id: &UserId, conversation_id: &ConversationId) -> bool {
        let state = self.inner.lock().await;
        let in_room = state
            .connections_of(user_id)
            .any(|connection| connection.rooms.contains(conversation_id));
        in_room
    }
}

#[cfg(test)]
#[path = "tests/hub_tests.rs"]
mod tests;
