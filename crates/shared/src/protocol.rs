//! Wire contract of the realtime connection.
//!
//! Every websocket text frame is a JSON object `{"event": <name>, "data": <payload>}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Conversation, ConversationId, Message, MessageId, UserId};

/// Longest chat body a client may send, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub conversation_id: ConversationId,
    pub receiver_id: UserId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: ConversationId,
    pub receiver_id: UserId,
}

/// Directives written by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientDirective {
    #[serde(rename = "join-conversation")]
    JoinConversation(ConversationId),
    #[serde(rename = "leave-conversation")]
    LeaveConversation(ConversationId),
    #[serde(rename = "send-message")]
    SendMessage(SendMessagePayload),
    #[serde(rename = "typing")]
    Typing(TypingPayload),
    #[serde(rename = "stop-typing")]
    StopTyping(TypingPayload),
}

impl ClientDirective {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinConversation(_) => "join-conversation",
            Self::LeaveConversation(_) => "leave-conversation",
            Self::SendMessage(_) => "send-message",
            Self::Typing(_) => "typing",
            Self::StopTyping(_) => "stop-typing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTypingPayload {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
}

/// Acknowledgment for the local client's own send. Servers differ in what they echo back,
/// so every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendFailure {
    pub error: String,
}

/// Heads-up for a conversation whose room the recipient has not joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageNotification {
    pub conversation_id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Events written by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "new-message")]
    NewMessage(Message),
    #[serde(rename = "user-online")]
    UserOnline(PresencePayload),
    #[serde(rename = "user-offline")]
    UserOffline(PresencePayload),
    #[serde(rename = "user-typing")]
    UserTyping(UserTypingPayload),
    #[serde(rename = "user-stop-typing")]
    UserStopTyping(UserTypingPayload),
    #[serde(rename = "message-sent")]
    MessageSent(SendReceipt),
    #[serde(rename = "message-error")]
    MessageError(SendFailure),
    #[serde(rename = "message-notification")]
    MessageNotification(MessageNotification),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "new-message",
            Self::UserOnline(_) => "user-online",
            Self::UserOffline(_) => "user-offline",
            Self::UserTyping(_) => "user-typing",
            Self::UserStopTyping(_) => "user-stop-typing",
            Self::MessageSent(_) => "message-sent",
            Self::MessageError(_) => "message-error",
            Self::MessageNotification(_) => "message-notification",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<crate::domain::ListingId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEnvelope {
    pub conversation: Conversation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationListResponse {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePageResponse {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_directive_carries_bare_conversation_id() {
        let text = serde_json::to_string(&ClientDirective::JoinConversation("c1".into()))
            .expect("encode");
        assert_eq!(text, r#"{"event":"join-conversation","data":"c1"}"#);
    }

    #[test]
    fn send_directive_uses_camel_case_fields() {
        let directive = ClientDirective::SendMessage(SendMessagePayload {
            conversation_id: "c1".into(),
            receiver_id: "u2".into(),
            message: "hi".into(),
        });
        let value = serde_json::to_value(&directive).expect("encode");
        assert_eq!(value["event"], "send-message");
        assert_eq!(value["data"]["conversationId"], "c1");
        assert_eq!(value["data"]["receiverId"], "u2");
        assert_eq!(value["data"]["message"], "hi");
    }

    #[test]
    fn new_message_decodes_from_server_shape() {
        let raw = r#"{"event":"new-message","data":{"id":"m1","conversationId":"c1","senderId":"u2","message":"hello","createdAt":"2024-05-01T10:00:00Z"}}"#;
        let event: ServerEvent = serde_json::from_str(raw).expect("decode");
        let ServerEvent::NewMessage(message) = event else {
            panic!("expected new-message");
        };
        assert_eq!(message.id.as_str(), "m1");
        assert_eq!(message.body, "hello");
    }

    #[test]
    fn message_sent_tolerates_sparse_receipt() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"event":"message-sent","data":{}}"#).expect("decode");
        assert_eq!(event, ServerEvent::MessageSent(SendReceipt::default()));
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        assert!(serde_json::from_str::<ServerEvent>(r#"{"event":"ping","data":{}}"#).is_err());
    }
}
