use std::collections::BTreeSet;

use shared::{domain::ConversationId, protocol::ClientDirective};
use tracing::{debug, info};

use crate::connection::ConnectionState;

/// Which conversation rooms this client asked the server for.
#[derive(Debug, Default)]
pub struct RoomTracker {
    joined: BTreeSet<ConversationId>,
    active: Option<ConversationId>,
}

impl RoomTracker {
    /// Yields the join directive to emit, or `None` when the connection cannot carry it.
    /// Skipped joins are not queued; the caller rejoins once connected.
    pub fn join(
        &mut self,
        conversation_id: ConversationId,
        state: ConnectionState,
    ) -> Option<ClientDirective> {
        if state != ConnectionState::Connected {
            info!(
                conversation_id = %conversation_id,
                ?state,
                "rooms: skipping join while not connected"
            );
            return None;
        }
        debug!(conversation_id = %conversation_id, "rooms: joining");
        self.joined.insert(conversation_id.clone());
        self.active = Some(conversation_id.clone());
        Some(ClientDirective::JoinConversation(conversation_id))
    }

    pub fn leave(&mut self, conversation_id: ConversationId) -> ClientDirective {
        debug!(conversation_id = %conversation_id, "rooms: leaving");
        self.joined.remove(&conversation_id);
        if self.active.as_ref() == Some(&conversation_id) {
            self.active = None;
        }
        ClientDirective::LeaveConversation(conversation_id)
    }

    pub fn clear(&mut self) {
        self.joined.clear();
        self.active = None;
    }

    pub fn rejoin_directives(&self) -> Vec<ClientDirective> {
        self.joined
            .iter()
            .cloned()
            .map(ClientDirective::JoinConversation)
            .collect()
    }

    pub fn is_joined(&self, conversation_id: &ConversationId) -> bool {
        self.joined.contains(conversation_id)
    }

    pub fn joined(&self) -> impl Iterator<Item = &ConversationId> {
        self.joined.iter()
    }

    pub fn active(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }
}
