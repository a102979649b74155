//! Realtime chat core: connection lifecycle, room membership, typed event routing,
//! outbound dispatch, presence and the conversation store, all driven by one event loop.

use std::sync::Arc;

use shared::domain::{Conversation, ConversationId, ListingId, Message, UserId};
use tokio::{
    sync::{broadcast, mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

pub mod api;
pub mod config;
pub mod connection;
mod dispatch;
pub mod error;
pub mod events;
pub mod presence;
pub mod rooms;
pub mod router;
mod runtime;
pub mod store;
mod timers;
pub mod transport;

pub use api::{ConversationApi, HttpConversationApi, MissingConversationApi};
pub use config::{load_settings, ClientSettings};
pub use connection::{ConnectionState, Credentials};
pub use error::{ChatError, TransportError};
pub use events::{ClientNotice, EventKind, InboundEvent};
pub use router::{EventHandler, SubscriptionId};
pub use runtime::ChatState;
pub use store::StoreSnapshot;
pub use transport::{Transport, TransportLink, WsTransport};

use runtime::Command;

/// Cloneable front door to the event loop. Commands are fire-and-forget unless they
/// return a value; every call fails with [`ChatError::NotRunning`] once the loop is gone.
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<Command>,
    notices: broadcast::Sender<ClientNotice>,
}

impl ChatHandle {
    fn send(&self, command: Command) -> Result<(), ChatError> {
        self.commands
            .send(command)
            .map_err(|_| ChatError::NotRunning)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ChatError> {
        let (reply, response) = oneshot::channel();
        self.send(build(reply))?;
        response.await.map_err(|_| ChatError::NotRunning)
    }

    /// Fails with [`ChatError::AuthRequired`] before any attempt when no token is present.
    pub fn connect(&self, credentials: Credentials) -> Result<(), ChatError> {
        if credentials.bearer().is_none() {
            return Err(ChatError::AuthRequired);
        }
        self.send(Command::Connect(credentials))
    }

    /// Resolves once the teardown has been applied. Safe to call repeatedly.
    pub async fn disconnect(&self) -> Result<(), ChatError> {
        self.request(|ack| Command::Disconnect { ack }).await
    }

    pub fn join_room(&self, conversation_id: impl Into<ConversationId>) -> Result<(), ChatError> {
        self.send(Command::JoinRoom(conversation_id.into()))
    }

    pub fn leave_room(&self, conversation_id: impl Into<ConversationId>) -> Result<(), ChatError> {
        self.send(Command::LeaveRoom(conversation_id.into()))
    }

    pub fn send_message(
        &self,
        conversation_id: impl Into<ConversationId>,
        receiver_id: impl Into<UserId>,
        body: impl Into<String>,
    ) -> Result<(), ChatError> {
        self.send(Command::SendMessage {
            conversation_id: conversation_id.into(),
            receiver_id: receiver_id.into(),
            body: body.into(),
        })
    }

    /// Call on every keystroke; the loop debounces.
    pub fn start_typing(
        &self,
        conversation_id: impl Into<ConversationId>,
        receiver_id: impl Into<UserId>,
    ) -> Result<(), ChatError> {
        self.send(Command::StartTyping {
            conversation_id: conversation_id.into(),
            receiver_id: receiver_id.into(),
        })
    }

    pub fn stop_typing(&self, conversation_id: impl Into<ConversationId>) -> Result<(), ChatError> {
        self.send(Command::StopTyping(conversation_id.into()))
    }

    /// Handlers run on the event loop and must not block.
    pub async fn subscribe(
        &self,
        kind: EventKind,
        handler: impl FnMut(&InboundEvent) + Send + 'static,
    ) -> Result<SubscriptionId, ChatError> {
        let handler: EventHandler = Box::new(handler);
        self.request(|reply| Command::Subscribe {
            kind,
            handler,
            reply,
        })
        .await
    }

    pub async fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> Result<bool, ChatError> {
        self.request(|reply| Command::Unsubscribe { kind, id, reply })
            .await
    }

    pub async fn unsubscribe_all(&self, kind: EventKind) -> Result<usize, ChatError> {
        self.request(|reply| Command::UnsubscribeAll { kind, reply })
            .await
    }

    pub fn set_conversations(&self, conversations: Vec<Conversation>) -> Result<(), ChatError> {
        self.send(Command::SetConversations(conversations))
    }

    pub fn upsert_conversation(&self, conversation: Conversation) -> Result<(), ChatError> {
        self.send(Command::UpsertConversation(conversation))
    }

    pub fn open_conversation(
        &self,
        conversation_id: impl Into<ConversationId>,
        history: Vec<Message>,
    ) -> Result<(), ChatError> {
        self.send(Command::OpenConversation {
            conversation_id: conversation_id.into(),
            history,
        })
    }

    pub fn merge_history(
        &self,
        conversation_id: impl Into<ConversationId>,
        page: Vec<Message>,
    ) -> Result<(), ChatError> {
        self.send(Command::MergeHistory {
            conversation_id: conversation_id.into(),
            page,
        })
    }

    pub fn close_conversation(&self) -> Result<(), ChatError> {
        self.send(Command::CloseConversation)
    }

    pub fn mark_read(&self, conversation_id: impl Into<ConversationId>) -> Result<(), ChatError> {
        self.send(Command::MarkRead(conversation_id.into()))
    }

    /// Runs `reader` on the event loop after every command sent before it.
    pub async fn read<R>(
        &self,
        reader: impl FnOnce(&ChatState) -> R + Send + 'static,
    ) -> Result<R, ChatError>
    where
        R: Send + 'static,
    {
        self.request(|reply| {
            Command::Read(Box::new(move |state: &ChatState| {
                let _ = reply.send(reader(state));
            }))
        })
        .await
    }

    pub async fn connection_state(&self) -> Result<ConnectionState, ChatError> {
        self.read(|state| state.connection().state()).await
    }

    pub async fn snapshot(&self) -> Result<StoreSnapshot, ChatError> {
        self.read(|state| state.store().snapshot()).await
    }

    pub async fn is_online(&self, user_id: impl Into<UserId>) -> Result<bool, ChatError> {
        let user_id = user_id.into();
        self.read(move |state| state.presence().is_online(&user_id))
            .await
    }

    pub async fn online_users(&self) -> Result<Vec<UserId>, ChatError> {
        self.read(|state| state.presence().online_users()).await
    }

    pub async fn typing_in(
        &self,
        conversation_id: impl Into<ConversationId>,
    ) -> Result<Option<UserId>, ChatError> {
        let conversation_id = conversation_id.into();
        self.read(move |state| state.presence().typing_in(&conversation_id).cloned())
            .await
    }

    pub async fn joined_rooms(&self) -> Result<Vec<ConversationId>, ChatError> {
        self.read(|state| state.rooms().joined().cloned().collect())
            .await
    }

    pub fn notices(&self) -> broadcast::Receiver<ClientNotice> {
        self.notices.subscribe()
    }
}

/// Application root: owns the session credentials, the event loop and the REST collaborator.
pub struct ChatClient {
    handle: ChatHandle,
    api: Arc<dyn ConversationApi>,
    credentials: Mutex<Option<Credentials>>,
    auto_join: bool,
    task: JoinHandle<()>,
}

impl ChatClient {
    pub fn start(
        settings: &ClientSettings,
        transport: Arc<dyn Transport>,
        api: Arc<dyn ConversationApi>,
    ) -> Self {
        let (commands, notices, task) = runtime::spawn(settings, transport);
        Self {
            handle: ChatHandle { commands, notices },
            api,
            credentials: Mutex::new(None),
            auto_join: settings.auto_join_open_conversation,
            task,
        }
    }

    pub fn with_websocket(settings: &ClientSettings) -> Self {
        Self::start(
            settings,
            Arc::new(WsTransport::new(settings.socket_url.clone())),
            Arc::new(HttpConversationApi::new(settings.api_base_url.clone())),
        )
    }

    pub fn handle(&self) -> ChatHandle {
        self.handle.clone()
    }

    pub async fn connect(&self, credentials: Credentials) -> Result<(), ChatError> {
        self.handle.connect(credentials.clone())?;
        *self.credentials.lock().await = Some(credentials);
        Ok(())
    }

    /// Like [`ChatClient::connect`], but resolves only once the link is up, so rooms
    /// joined afterwards are not dropped while the state is still `Connecting`.
    pub async fn connect_and_wait(&self, credentials: Credentials) -> Result<(), ChatError> {
        let mut notices = self.handle.notices();
        self.connect(credentials).await?;
        loop {
            match notices.recv().await {
                Ok(ClientNotice::Connected | ClientNotice::Reconnected) => return Ok(()),
                Ok(ClientNotice::HandshakeRejected { reason }) => {
                    return Err(ChatError::Transport(TransportError::Rejected(reason)))
                }
                Ok(ClientNotice::ConnectionLost) => {
                    return Err(ChatError::Transport(TransportError::Io(
                        "connection lost".into(),
                    )))
                }
                Ok(ClientNotice::Disconnected) => {
                    return Err(ChatError::Transport(TransportError::Io(
                        "disconnected before the link came up".into(),
                    )))
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "client: notices lagged while waiting for connect");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(ChatError::NotRunning),
            }
        }
    }

    pub async fn disconnect(&self) -> Result<(), ChatError> {
        self.handle.disconnect().await
    }

    async fn token(&self) -> Result<String, ChatError> {
        self.credentials
            .lock()
            .await
            .as_ref()
            .and_then(|credentials| credentials.bearer().map(str::to_string))
            .ok_or(ChatError::AuthRequired)
    }

    /// Replaces the store's conversation list with the server's.
    pub async fn refresh_conversations(&self) -> Result<usize, ChatError> {
        let token = self.token().await?;
        let conversations = self
            .api
            .list_conversations(&token)
            .await
            .map_err(ChatError::api)?;
        let count = conversations.len();
        self.handle.set_conversations(conversations)?;
        info!(count, "client: conversation list refreshed");
        Ok(count)
    }

    /// Loads the newest history page, opens the conversation in the store and joins its room.
    pub async fn open_conversation(
        &self,
        conversation_id: impl Into<ConversationId>,
    ) -> Result<(), ChatError> {
        let conversation_id = conversation_id.into();
        let token = self.token().await?;
        let history = self
            .api
            .list_messages(&token, &conversation_id, 1)
            .await
            .map_err(ChatError::api)?;
        self.handle
            .open_conversation(conversation_id.clone(), history)?;
        if !self.auto_join {
            self.handle.join_room(conversation_id)?;
        }
        Ok(())
    }

    /// Get-or-create a conversation with `user_id`, optionally about a listing.
    pub async fn start_conversation(
        &self,
        user_id: impl Into<UserId>,
        listing_id: Option<ListingId>,
    ) -> Result<Conversation, ChatError> {
        let token = self.token().await?;
        let conversation = self
            .api
            .get_or_create_conversation(&token, &user_id.into(), listing_id.as_ref())
            .await
            .map_err(ChatError::api)?;
        self.handle.upsert_conversation(conversation.clone())?;
        Ok(conversation)
    }

    /// Fetches an older page and prepends it to the open conversation. Returns the page size.
    pub async fn load_older_messages(
        &self,
        conversation_id: impl Into<ConversationId>,
        page: u32,
    ) -> Result<usize, ChatError> {
        let conversation_id = conversation_id.into();
        let token = self.token().await?;
        let messages = self
            .api
            .list_messages(&token, &conversation_id, page)
            .await
            .map_err(ChatError::api)?;
        let fetched = messages.len();
        self.handle.merge_history(conversation_id, messages)?;
        Ok(fetched)
    }

    pub fn close_conversation(
        &self,
        conversation_id: impl Into<ConversationId>,
    ) -> Result<(), ChatError> {
        self.handle.leave_room(conversation_id)?;
        self.handle.close_conversation()
    }

    /// Tears the session down and waits for the event loop to exit.
    pub async fn shutdown(self) -> Result<(), ChatError> {
        *self.credentials.lock().await = None;
        self.handle
            .request(|ack| Command::Shutdown { ack })
            .await?;
        self.task.await.map_err(|_| ChatError::NotRunning)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
