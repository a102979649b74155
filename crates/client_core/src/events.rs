//! Typed inbound events and the notices published to the application layer.

use shared::{
    domain::{ConversationId, Message, UserId},
    protocol::{MessageNotification, SendReceipt, ServerEvent},
};

/// The closed set of inbound event categories handlers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    MessageReceived,
    UserOnline,
    UserOffline,
    TypingStart,
    TypingStop,
    SendAck,
    SendError,
    MessageNotification,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::MessageReceived,
        EventKind::UserOnline,
        EventKind::UserOffline,
        EventKind::TypingStart,
        EventKind::TypingStop,
        EventKind::SendAck,
        EventKind::SendError,
        EventKind::MessageNotification,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    MessageReceived(Message),
    UserOnline(UserId),
    UserOffline(UserId),
    TypingStart {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    TypingStop {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    SendAck(SendReceipt),
    SendError {
        error: String,
    },
    MessageNotification(MessageNotification),
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MessageReceived(_) => EventKind::MessageReceived,
            Self::UserOnline(_) => EventKind::UserOnline,
            Self::UserOffline(_) => EventKind::UserOffline,
            Self::TypingStart { .. } => EventKind::TypingStart,
            Self::TypingStop { .. } => EventKind::TypingStop,
            Self::SendAck(_) => EventKind::SendAck,
            Self::SendError { .. } => EventKind::SendError,
            Self::MessageNotification(_) => EventKind::MessageNotification,
        }
    }
}

impl From<ServerEvent> for InboundEvent {
    fn from(event: ServerEvent) -> Self {
        match event {
            ServerEvent::NewMessage(message) => Self::MessageReceived(message),
            ServerEvent::UserOnline(payload) => Self::UserOnline(payload.user_id),
            ServerEvent::UserOffline(payload) => Self::UserOffline(payload.user_id),
            ServerEvent::UserTyping(payload) => Self::TypingStart {
                conversation_id: payload.conversation_id,
                user_id: payload.user_id,
            },
            ServerEvent::UserStopTyping(payload) => Self::TypingStop {
                conversation_id: payload.conversation_id,
                user_id: payload.user_id,
            },
            ServerEvent::MessageSent(receipt) => Self::SendAck(receipt),
            ServerEvent::MessageError(failure) => Self::SendError {
                error: failure.error,
            },
            ServerEvent::MessageNotification(notification) => {
                Self::MessageNotification(notification)
            }
        }
    }
}

/// Connection lifecycle transitions, for banners and offline indicators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientNotice {
    Connected,
    /// The transport dropped without a local disconnect.
    Dropped,
    Reconnecting {
        attempt: u32,
        max_attempts: u32,
    },
    Reconnected,
    HandshakeRejected {
        reason: String,
    },
    /// Terminal: the retry budget is spent and the client stays offline until connected again.
    ConnectionLost,
    Disconnected,
}
