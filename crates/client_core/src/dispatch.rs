use std::time::Duration;

use shared::{
    domain::{ConversationId, UserId},
    protocol::{ClientDirective, SendMessagePayload, TypingPayload, MAX_MESSAGE_CHARS},
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::timers::TimerSlots;

/// Fired when a conversation's local typing window elapses without a keystroke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TypingIdle {
    pub(crate) conversation_id: ConversationId,
    pub(crate) generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank body; nothing is sent and nothing is reported.
    Ignored,
    /// Refused locally; surfaced to subscribers as a `SendError`.
    Rejected(String),
    /// Directives to write, in order.
    Emit(Vec<ClientDirective>),
}

/// Outbound chat sends and the debounced local typing signal.
pub(crate) struct MessageDispatch<T> {
    idle: Duration,
    typing: TimerSlots<ConversationId, UserId>,
    timers: mpsc::UnboundedSender<T>,
}

impl<T> MessageDispatch<T>
where
    T: From<TypingIdle> + Send + 'static,
{
    pub(crate) fn new(idle: Duration, timers: mpsc::UnboundedSender<T>) -> Self {
        Self {
            idle,
            typing: TimerSlots::default(),
            timers,
        }
    }

    pub(crate) fn send_message(
        &mut self,
        conversation_id: ConversationId,
        receiver_id: UserId,
        body: &str,
        connected: bool,
    ) -> SendOutcome {
        let body = body.trim();
        if body.is_empty() {
            return SendOutcome::Ignored;
        }
        if conversation_id.is_blank() || receiver_id.is_blank() {
            warn!("dispatch: refusing send without conversation or receiver");
            return SendOutcome::Rejected("conversation and receiver are required".into());
        }
        if body.chars().count() > MAX_MESSAGE_CHARS {
            return SendOutcome::Rejected(format!(
                "message exceeds {MAX_MESSAGE_CHARS} characters"
            ));
        }
        if !connected {
            warn!(conversation_id = %conversation_id, "dispatch: send while offline");
            return SendOutcome::Rejected("not connected".into());
        }

        let mut directives = Vec::with_capacity(2);
        directives.extend(self.stop_typing(&conversation_id));
        debug!(conversation_id = %conversation_id, "dispatch: sending message");
        directives.push(ClientDirective::SendMessage(SendMessagePayload {
            conversation_id,
            receiver_id,
            message: body.to_string(),
        }));
        SendOutcome::Emit(directives)
    }

    /// A keystroke. Only the first one in a window yields `typing`; later ones re-arm the timer.
    pub(crate) fn start_typing(
        &mut self,
        conversation_id: ConversationId,
        receiver_id: UserId,
        connected: bool,
    ) -> Option<ClientDirective> {
        if !connected || conversation_id.is_blank() || receiver_id.is_blank() {
            return None;
        }
        let key = conversation_id.clone();
        let newly_armed = self.typing.arm(
            conversation_id.clone(),
            receiver_id.clone(),
            self.idle,
            &self.timers,
            move |generation| {
                T::from(TypingIdle {
                    conversation_id: key,
                    generation,
                })
            },
        );
        newly_armed.then(|| {
            ClientDirective::Typing(TypingPayload {
                conversation_id,
                receiver_id,
            })
        })
    }

    pub(crate) fn stop_typing(&mut self, conversation_id: &ConversationId) -> Option<ClientDirective> {
        let receiver_id = self.typing.cancel(conversation_id)?;
        Some(ClientDirective::StopTyping(TypingPayload {
            conversation_id: conversation_id.clone(),
            receiver_id,
        }))
    }

    pub(crate) fn on_idle(&mut self, idle: TypingIdle) -> Option<ClientDirective> {
        let receiver_id = self
            .typing
            .take_if_current(&idle.conversation_id, idle.generation)?;
        debug!(conversation_id = %idle.conversation_id, "dispatch: typing window elapsed");
        Some(ClientDirective::StopTyping(TypingPayload {
            conversation_id: idle.conversation_id,
            receiver_id,
        }))
    }

    pub(crate) fn is_typing(&self, conversation_id: &ConversationId) -> bool {
        self.typing.is_armed(conversation_id)
    }

    /// Drops every pending window without emitting; the link they belonged to is gone.
    pub(crate) fn reset(&mut self) {
        self.typing.drain();
    }
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
