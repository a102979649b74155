use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use shared::{
    domain::{
        Conversation, ConversationId, ListingId, ListingSummary, Message, MessageId, UserId,
        UserSummary,
    },
    error::{ApiError, ErrorCode},
    protocol::{MessagePageResponse, MAX_MESSAGE_CHARS},
};
use tokio::sync::RwLock;
use uuid::Uuid;

pub const PAGE_SIZE: usize = 50;

#[derive(Debug, Clone)]
struct StoredConversation {
    id: ConversationId,
    participants: [UserId; 2],
    listing: Option<ListingId>,
    last_message: Option<String>,
    last_message_at: Option<DateTime<Utc>>,
    unread: HashMap<UserId, u32>,
}

impl StoredConversation {
    fn other(&self, user_id: &UserId) -> Option<&UserId> {
        match &self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }

    fn view_for(&self, user_id: &UserId) -> Option<Conversation> {
        let other = self.other(user_id)?;
        Some(Conversation {
            id: self.id.clone(),
            other_user: UserSummary {
                id: other.clone(),
                full_name: None,
                avatar: None,
            },
            listing: self.listing.clone().map(|id| ListingSummary {
                id,
                title: None,
                price: None,
                image: None,
            }),
            last_message: self.last_message.clone(),
            last_message_at: self.last_message_at,
            unread_count: self.unread.get(user_id).copied().unwrap_or(0),
        })
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    conversations: HashMap<ConversationId, StoredConversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
}

/// In-memory conversations and messages. Nothing survives a restart.
#[derive(Clone, Default)]
pub struct ChatDirectory {
    inner: Arc<RwLock<DirectoryState>>,
}

impl ChatDirectory {
    pub async fn is_participant(&self, user_id: &UserId, conversation_id: &ConversationId) -> bool {
        self.inner
            .read()
            .await
            .conversations
            .get(conversation_id)
            .is_some_and(|conversation| conversation.other(user_id).is_some())
    }
}

pub async fn list_conversations(
    directory: &ChatDirectory,
    user_id: &UserId,
) -> Result<Vec<Conversation>, ApiError> {
    let state = directory.inner.read().await;
    let mut conversations: Vec<Conversation> = state
        .conversations
        .values()
        .filter_map(|conversation| conversation.view_for(user_id))
        .collect();
    conversations.sort_by(|a, b| {
        b.last_message_at
            .cmp(&a.last_message_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(conversations)
}

/// Finds the conversation between the two users about `listing_id`, creating it when absent.
pub async fn get_or_create_conversation(
    directory: &ChatDirectory,
    user_id: &UserId,
    other_user_id: &UserId,
    listing_id: Option<ListingId>,
) -> Result<Conversation, ApiError> {
    if other_user_id.is_blank() {
        return Err(ApiError::validation("userId is required"));
    }
    if other_user_id == user_id {
        return Err(ApiError::validation("cannot start a conversation with yourself"));
    }

    let mut state = directory.inner.write().await;
    let existing = state.conversations.values().find(|conversation| {
        conversation.other(user_id) == Some(other_user_id) && conversation.listing == listing_id
    });
    let stored = match existing {
        Some(conversation) => conversation.clone(),
        None => {
            let conversation = StoredConversation {
                id: ConversationId::new(Uuid::new_v4().to_string()),
                participants: [user_id.clone(), other_user_id.clone()],
                listing: listing_id,
                last_message: None,
                last_message_at: None,
                unread: HashMap::new(),
            };
            state
                .conversations
                .insert(conversation.id.clone(), conversation.clone());
            conversation
        }
    };
    stored
        .view_for(user_id)
        .ok_or_else(|| ApiError::new(ErrorCode::Internal, "conversation lost its participant"))
}

/// Page 1 is the newest [`PAGE_SIZE`] messages; each page is in chronological order.
/// Fetching the first page marks the conversation read for the caller.
pub async fn list_messages(
    directory: &ChatDirectory,
    user_id: &UserId,
    conversation_id: &ConversationId,
    page: u32,
) -> Result<MessagePageResponse, ApiError> {
    let page = page.max(1);
    let mut state = directory.inner.write().await;
    let conversation = state
        .conversations
        .get_mut(conversation_id)
        .ok_or_else(|| ApiError::not_found("conversation not found"))?;
    if conversation.other(user_id).is_none() {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "not a participant of this conversation",
        ));
    }
    if page == 1 {
        conversation.unread.remove(user_id);
    }

    let all = state
        .messages
        .get(conversation_id)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let skip = PAGE_SIZE.saturating_mul(page as usize - 1);
    let end = all.len().saturating_sub(skip);
    let start = end.saturating_sub(PAGE_SIZE);
    Ok(MessagePageResponse {
        messages: all[start..end].to_vec(),
        page: Some(page),
        has_more: Some(start > 0),
    })
}

/// Stores a message from `sender_id`; the receiver must be the other participant.
pub async fn post_message(
    directory: &ChatDirectory,
    sender_id: &UserId,
    conversation_id: &ConversationId,
    receiver_id: &UserId,
    body: &str,
) -> Result<Message, ApiError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ApiError::validation("message is empty"));
    }
    if body.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::validation(format!(
            "message exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }

    let mut state = directory.inner.write().await;
    let conversation = state
        .conversations
        .get_mut(conversation_id)
        .ok_or_else(|| ApiError::not_found("conversation not found"))?;
    if conversation.other(sender_id) != Some(receiver_id) {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "sender and receiver are not the participants of this conversation",
        ));
    }

    let message = Message {
        id: MessageId::new(Uuid::new_v4().to_string()),
        conversation_id: conversation_id.clone(),
        sender_id: sender_id.clone(),
        body: body.to_string(),
        created_at: Utc::now(),
    };
    conversation.last_message = Some(message.body.clone());
    conversation.last_message_at = Some(message.created_at);
    *conversation.unread.entry(receiver_id.clone()).or_default() += 1;
    state
        .messages
        .entry(conversation_id.clone())
        .or_default()
        .push(message.clone());
    Ok(message)
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
