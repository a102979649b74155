use std::collections::HashSet;

use shared::{
    domain::{Conversation, ConversationId, Message, MessageId, UserId},
    protocol::MessageNotification,
};
use tracing::{debug, warn};

/// What [`ConversationStore::apply_incoming_message`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Appended to the open conversation (summary updated too).
    Appended,
    /// Only the conversation summary changed.
    SummaryOnly,
    /// Already present in the open conversation.
    Duplicate,
    /// Malformed or unknown; nothing changed.
    Ignored,
}

#[derive(Debug)]
struct OpenConversation {
    id: ConversationId,
    messages: Vec<Message>,
    seen: HashSet<MessageId>,
}

impl OpenConversation {
    fn new(id: ConversationId) -> Self {
        Self {
            id,
            messages: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn push(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub conversations: Vec<Conversation>,
    pub open_conversation: Option<ConversationId>,
    pub messages: Vec<Message>,
}

/// In-memory projection of the conversation list and the open conversation's messages.
///
/// Reconciliation never fails: malformed input is logged and skipped so the open
/// sequence can never hold the same message id twice.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    open: Option<OpenConversation>,
    local_user: Option<UserId>,
}

impl ConversationStore {
    pub fn set_local_user(&mut self, user_id: Option<UserId>) {
        self.local_user = user_id;
    }

    pub fn set_conversations(&mut self, conversations: Vec<Conversation>) {
        let mut seen = HashSet::new();
        self.conversations = conversations
            .into_iter()
            .filter(|conversation| {
                if conversation.id.is_blank() {
                    warn!("store: dropping conversation without id");
                    return false;
                }
                seen.insert(conversation.id.clone())
            })
            .collect();
        self.sort();
    }

    pub fn upsert_conversation(&mut self, conversation: Conversation) {
        if conversation.id.is_blank() {
            warn!("store: ignoring upsert without conversation id");
            return;
        }
        match self
            .conversations
            .iter_mut()
            .find(|existing| existing.id == conversation.id)
        {
            Some(existing) => *existing = conversation,
            None => self.conversations.insert(0, conversation),
        }
        self.sort();
    }

    /// Appends to the open conversation when the id is new, and refreshes the summary either way.
    /// The summary preview only moves forward in time: a message older than `last_message_at`
    /// still counts as unread but leaves `last_message` as it was.
    pub fn apply_incoming_message(&mut self, message: Message) -> Applied {
        if message.id.is_blank() || message.conversation_id.is_blank() {
            warn!("store: ignoring message with blank ids");
            return Applied::Ignored;
        }

        let is_open = self
            .open
            .as_ref()
            .is_some_and(|open| open.id == message.conversation_id);

        if is_open {
            let conversation_id = message.conversation_id.clone();
            let body = message.body.clone();
            let created_at = message.created_at;
            let appended = self
                .open
                .as_mut()
                .is_some_and(|open| open.push(message));
            if !appended {
                debug!(conversation_id = %conversation_id, "store: duplicate message for open conversation");
                return Applied::Duplicate;
            }
            self.touch_summary(&conversation_id, &body, created_at, false);
            return Applied::Appended;
        }

        let from_peer = self.local_user.as_ref() != Some(&message.sender_id);
        if self.touch_summary(
            &message.conversation_id,
            &message.body,
            message.created_at,
            from_peer,
        ) {
            Applied::SummaryOnly
        } else {
            debug!(
                conversation_id = %message.conversation_id,
                "store: message for unknown conversation"
            );
            Applied::Ignored
        }
    }

    /// Updates a summary from a `message-notification`; returns false when nothing usable arrived.
    pub fn apply_notification(&mut self, notification: &MessageNotification) -> bool {
        let (Some(body), Some(created_at)) = (&notification.message, notification.created_at)
        else {
            return false;
        };
        if self.open_conversation_id() == Some(&notification.conversation_id) {
            return false;
        }
        let from_peer = notification
            .sender_id
            .as_ref()
            .map_or(true, |sender| self.local_user.as_ref() != Some(sender));
        self.touch_summary(&notification.conversation_id, body, created_at, from_peer)
    }

    /// Starts treating `conversation_id` as the open conversation, seeded with fetched history.
    pub fn open_conversation(&mut self, conversation_id: ConversationId, history: Vec<Message>) {
        if conversation_id.is_blank() {
            warn!("store: refusing to open conversation without id");
            return;
        }
        let mut open = OpenConversation::new(conversation_id.clone());
        for message in history {
            if message.conversation_id == conversation_id && !message.id.is_blank() {
                open.push(message);
            }
        }
        self.open = Some(open);
        self.mark_read(&conversation_id);
    }

    /// Prepends an older history page to the open conversation, skipping known ids.
    pub fn merge_history(&mut self, conversation_id: &ConversationId, page: Vec<Message>) -> usize {
        let Some(open) = self.open.as_mut().filter(|open| &open.id == conversation_id) else {
            return 0;
        };
        let mut older = Vec::with_capacity(page.len());
        for message in page {
            if &message.conversation_id != conversation_id || message.id.is_blank() {
                continue;
            }
            if open.seen.insert(message.id.clone()) {
                older.push(message);
            }
        }
        older.sort_by_key(|message| message.created_at);
        let added = older.len();
        older.append(&mut open.messages);
        open.messages = older;
        added
    }

    pub fn close_conversation(&mut self) {
        self.open = None;
    }

    pub fn mark_read(&mut self, conversation_id: &ConversationId) {
        if let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|conversation| &conversation.id == conversation_id)
        {
            conversation.unread_count = 0;
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, conversation_id: &ConversationId) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| &conversation.id == conversation_id)
    }

    pub fn open_conversation_id(&self) -> Option<&ConversationId> {
        self.open.as_ref().map(|open| &open.id)
    }

    pub fn messages(&self) -> &[Message] {
        self.open.as_ref().map_or(&[], |open| open.messages.as_slice())
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            conversations: self.conversations.clone(),
            open_conversation: self.open_conversation_id().cloned(),
            messages: self.messages().to_vec(),
        }
    }

    fn touch_summary(
        &mut self,
        conversation_id: &ConversationId,
        body: &str,
        created_at: chrono::DateTime<chrono::Utc>,
        count_unread: bool,
    ) -> bool {
        let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|conversation| &conversation.id == conversation_id)
        else {
            return false;
        };
        // A late replay must not roll the preview back to an older message.
        if conversation
            .last_message_at
            .map_or(true, |current| created_at >= current)
        {
            conversation.last_message = Some(body.to_string());
            conversation.last_message_at = Some(created_at);
        }
        if count_unread {
            conversation.unread_count = conversation.unread_count.saturating_add(1);
        }
        self.sort();
        true
    }

    /// Newest first; `sort_by` is stable so equal timestamps keep their relative order.
    fn sort(&mut self) {
        self.conversations
            .sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
