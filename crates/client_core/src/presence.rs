use std::collections::{BTreeSet, HashMap};

use shared::domain::{ConversationId, UserId};
use tracing::debug;

/// Online users and per-conversation typing state, derived only from inbound events.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    online: BTreeSet<UserId>,
    typing: HashMap<ConversationId, UserId>,
}

impl PresenceTracker {
    pub fn user_online(&mut self, user_id: UserId) {
        if user_id.is_blank() {
            debug!("presence: ignoring online event without user id");
            return;
        }
        self.online.insert(user_id);
    }

    pub fn user_offline(&mut self, user_id: &UserId) {
        self.online.remove(user_id);
    }

    /// Overwrites whoever was typing in the conversation before.
    pub fn typing_started(&mut self, conversation_id: ConversationId, user_id: UserId) {
        if conversation_id.is_blank() || user_id.is_blank() {
            debug!("presence: ignoring typing event with blank ids");
            return;
        }
        self.typing.insert(conversation_id, user_id);
    }

    pub fn typing_stopped(&mut self, conversation_id: &ConversationId) -> Option<UserId> {
        self.typing.remove(conversation_id)
    }

    /// A message ends any typing indicator in its conversation.
    pub fn message_arrived(&mut self, conversation_id: &ConversationId) -> Option<UserId> {
        self.typing.remove(conversation_id)
    }

    pub fn reset(&mut self) {
        self.online.clear();
        self.typing.clear();
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.online.contains(user_id)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.online.iter().cloned().collect()
    }

    pub fn typing_in(&self, conversation_id: &ConversationId) -> Option<&UserId> {
        self.typing.get(conversation_id)
    }
}

#[cfg(test)]
#[path = "tests/presence_tests.rs"]
mod tests;
