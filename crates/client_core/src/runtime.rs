use std::{ops::ControlFlow, sync::Arc};

use shared::{
    domain::{Conversation, ConversationId, Message, UserId},
    protocol::{ClientDirective, ServerEvent},
};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::ClientSettings,
    connection::{
        AttemptFailure, ConnectAttempt, ConnectionManager, ConnectionState, Credentials,
        ReconnectPolicy,
    },
    dispatch::{MessageDispatch, SendOutcome, TypingIdle},
    error::TransportError,
    events::{ClientNotice, EventKind, InboundEvent},
    presence::PresenceTracker,
    rooms::RoomTracker,
    router::{EventHandler, EventRouter, SubscriptionId},
    store::ConversationStore,
    timers::TimerSlots,
    transport::{Transport, TransportLink},
};

/// Component state owned by the event loop, readable through [`crate::ChatHandle::read`].
#[derive(Debug)]
pub struct ChatState {
    connection: ConnectionManager,
    rooms: RoomTracker,
    presence: PresenceTracker,
    store: ConversationStore,
}

impl ChatState {
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn rooms(&self) -> &RoomTracker {
        &self.rooms
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }
}

pub(crate) type StateReader = Box<dyn FnOnce(&ChatState) + Send + 'static>;

pub(crate) enum Command {
    Connect(Credentials),
    Disconnect {
        ack: oneshot::Sender<()>,
    },
    JoinRoom(ConversationId),
    LeaveRoom(ConversationId),
    SendMessage {
        conversation_id: ConversationId,
        receiver_id: UserId,
        body: String,
    },
    StartTyping {
        conversation_id: ConversationId,
        receiver_id: UserId,
    },
    StopTyping(ConversationId),
    Subscribe {
        kind: EventKind,
        handler: EventHandler,
        reply: oneshot::Sender<SubscriptionId>,
    },
    Unsubscribe {
        kind: EventKind,
        id: SubscriptionId,
        reply: oneshot::Sender<bool>,
    },
    UnsubscribeAll {
        kind: EventKind,
        reply: oneshot::Sender<usize>,
    },
    SetConversations(Vec<Conversation>),
    UpsertConversation(Conversation),
    OpenConversation {
        conversation_id: ConversationId,
        history: Vec<Message>,
    },
    MergeHistory {
        conversation_id: ConversationId,
        page: Vec<Message>,
    },
    CloseConversation,
    MarkRead(ConversationId),
    Read(StateReader),
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Reports from tasks the loop spawned itself.
enum Internal {
    ConnectOutcome {
        generation: u64,
        attempt: u32,
        result: Result<TransportLink, TransportError>,
    },
    LocalTypingIdle(TypingIdle),
    RemoteTypingExpired {
        conversation_id: ConversationId,
        generation: u64,
    },
}

impl From<TypingIdle> for Internal {
    fn from(idle: TypingIdle) -> Self {
        Self::LocalTypingIdle(idle)
    }
}

/// Starts the event loop. It runs until a shutdown command arrives or every handle is dropped.
pub(crate) fn spawn(
    settings: &ClientSettings,
    transport: Arc<dyn Transport>,
) -> (
    mpsc::UnboundedSender<Command>,
    broadcast::Sender<ClientNotice>,
    JoinHandle<()>,
) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let (notices, _) = broadcast::channel(settings.notice_buffer.max(1));

    let runtime = Runtime {
        state: ChatState {
            connection: ConnectionManager::new(ReconnectPolicy {
                max_attempts: settings.reconnect_attempts,
                delay: settings.reconnect_delay(),
            }),
            rooms: RoomTracker::default(),
            presence: PresenceTracker::default(),
            store: ConversationStore::default(),
        },
        router: EventRouter::default(),
        dispatch: MessageDispatch::new(settings.typing_idle(), internal_tx.clone()),
        remote_typing: TimerSlots::default(),
        settings: settings.clone(),
        transport,
        link: None,
        pending_connect: None,
        internal_tx,
        notices: notices.clone(),
    };
    let task = tokio::spawn(runtime.run(commands_rx, internal_rx));
    (commands_tx, notices, task)
}

struct Runtime {
    state: ChatState,
    router: EventRouter,
    dispatch: MessageDispatch<Internal>,
    remote_typing: TimerSlots<ConversationId, UserId>,
    settings: ClientSettings,
    transport: Arc<dyn Transport>,
    link: Option<TransportLink>,
    pending_connect: Option<JoinHandle<()>>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    notices: broadcast::Sender<ClientNotice>,
}

async fn next_inbound(link: &mut Option<TransportLink>) -> Option<ServerEvent> {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

impl Runtime {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).is_break() {
                            break;
                        }
                    }
                    None => {
                        self.teardown();
                        break;
                    }
                },
                Some(report) = internal.recv() => self.handle_internal(report),
                event = next_inbound(&mut self.link) => match event {
                    Some(event) => self.handle_inbound(event),
                    None => self.handle_link_closed(),
                },
            }
        }
        debug!("runtime: event loop stopped");
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Connect(credentials) => self.connect(credentials),
            Command::Disconnect { ack } => {
                if self.teardown() {
                    self.notify(ClientNotice::Disconnected);
                }
                let _ = ack.send(());
            }
            Command::JoinRoom(conversation_id) => self.join_room(conversation_id),
            Command::LeaveRoom(conversation_id) => {
                let directive = self.state.rooms.leave(conversation_id);
                self.emit(directive);
            }
            Command::SendMessage {
                conversation_id,
                receiver_id,
                body,
            } => {
                let connected = self.state.connection.is_connected();
                match self
                    .dispatch
                    .send_message(conversation_id, receiver_id, &body, connected)
                {
                    SendOutcome::Ignored => {}
                    SendOutcome::Rejected(error) => {
                        self.router.route(&InboundEvent::SendError { error });
                    }
                    SendOutcome::Emit(directives) => {
                        for directive in directives {
                            self.emit(directive);
                        }
                    }
                }
            }
            Command::StartTyping {
                conversation_id,
                receiver_id,
            } => {
                let connected = self.state.connection.is_connected();
                if let Some(directive) =
                    self.dispatch
                        .start_typing(conversation_id, receiver_id, connected)
                {
                    self.emit(directive);
                }
            }
            Command::StopTyping(conversation_id) => {
                if let Some(directive) = self.dispatch.stop_typing(&conversation_id) {
                    self.emit(directive);
                }
            }
            Command::Subscribe {
                kind,
                handler,
                reply,
            } => {
                let _ = reply.send(self.router.subscribe(kind, handler));
            }
            Command::Unsubscribe { kind, id, reply } => {
                let _ = reply.send(self.router.unsubscribe(kind, id));
            }
            Command::UnsubscribeAll { kind, reply } => {
                let _ = reply.send(self.router.unsubscribe_all(kind));
            }
            Command::SetConversations(conversations) => {
                self.state.store.set_conversations(conversations);
            }
            Command::UpsertConversation(conversation) => {
                self.state.store.upsert_conversation(conversation);
            }
            Command::OpenConversation {
                conversation_id,
                history,
            } => {
                self.state
                    .store
                    .open_conversation(conversation_id.clone(), history);
                if self.settings.auto_join_open_conversation
                    && !self.state.rooms.is_joined(&conversation_id)
                {
                    self.join_room(conversation_id);
                }
            }
            Command::MergeHistory {
                conversation_id,
                page,
            } => {
                let added = self.state.store.merge_history(&conversation_id, page);
                debug!(conversation_id = %conversation_id, added, "runtime: merged history page");
            }
            Command::CloseConversation => self.state.store.close_conversation(),
            Command::MarkRead(conversation_id) => self.state.store.mark_read(&conversation_id),
            Command::Read(reader) => reader(&self.state),
            Command::Shutdown { ack } => {
                if self.teardown() {
                    self.notify(ClientNotice::Disconnected);
                }
                let _ = ack.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_internal(&mut self, report: Internal) {
        match report {
            Internal::ConnectOutcome {
                generation,
                attempt,
                result,
            } => self.on_connect_outcome(generation, attempt, result),
            Internal::LocalTypingIdle(idle) => {
                if let Some(directive) = self.dispatch.on_idle(idle) {
                    self.emit(directive);
                }
            }
            Internal::RemoteTypingExpired {
                conversation_id,
                generation,
            } => {
                let Some(user_id) = self
                    .remote_typing
                    .take_if_current(&conversation_id, generation)
                else {
                    return;
                };
                if self.state.presence.typing_in(&conversation_id) != Some(&user_id) {
                    return;
                }
                self.state.presence.typing_stopped(&conversation_id);
                debug!(conversation_id = %conversation_id, user_id = %user_id, "runtime: typing indicator expired");
                self.router.route(&InboundEvent::TypingStop {
                    conversation_id,
                    user_id,
                });
            }
        }
    }

    fn handle_inbound(&mut self, event: ServerEvent) {
        let event = InboundEvent::from(event);
        match &event {
            InboundEvent::MessageReceived(message) => {
                self.state
                    .presence
                    .message_arrived(&message.conversation_id);
                self.remote_typing.cancel(&message.conversation_id);
                self.state.store.apply_incoming_message(message.clone());
            }
            InboundEvent::UserOnline(user_id) => self.state.presence.user_online(user_id.clone()),
            InboundEvent::UserOffline(user_id) => self.state.presence.user_offline(user_id),
            InboundEvent::TypingStart {
                conversation_id,
                user_id,
            } => {
                self.state
                    .presence
                    .typing_started(conversation_id.clone(), user_id.clone());
                self.arm_typing_expiry(conversation_id, user_id);
            }
            InboundEvent::TypingStop {
                conversation_id, ..
            } => {
                self.state.presence.typing_stopped(conversation_id);
                self.remote_typing.cancel(conversation_id);
            }
            InboundEvent::MessageNotification(notification) => {
                self.state.store.apply_notification(notification);
            }
            InboundEvent::SendAck(_) | InboundEvent::SendError { .. } => {}
        }
        self.router.route(&event);
    }

    fn connect(&mut self, credentials: Credentials) {
        if self.state.connection.state() != ConnectionState::Disconnected {
            info!("runtime: replacing the current session");
            self.teardown();
        }
        let user_id = credentials.user_id.clone();
        match self.state.connection.begin_connect(credentials) {
            Ok(attempt) => {
                self.state.store.set_local_user(Some(user_id));
                self.spawn_attempt(attempt);
            }
            Err(err) => warn!(%err, "runtime: connect refused"),
        }
    }

    fn spawn_attempt(&mut self, attempt: ConnectAttempt) {
        let Some(token) = self
            .state
            .connection
            .session()
            .map(|session| session.token.clone())
        else {
            return;
        };
        if attempt.attempt > 0 {
            self.notify(ClientNotice::Reconnecting {
                attempt: attempt.attempt,
                max_attempts: self.state.connection.policy().max_attempts,
            });
        }

        let transport = Arc::clone(&self.transport);
        let reports = self.internal_tx.clone();
        if let Some(previous) = self.pending_connect.take() {
            previous.abort();
        }
        self.pending_connect = Some(tokio::spawn(async move {
            if !attempt.delay.is_zero() {
                tokio::time::sleep(attempt.delay).await;
            }
            let result = transport.connect(&token).await;
            let _ = reports.send(Internal::ConnectOutcome {
                generation: attempt.generation,
                attempt: attempt.attempt,
                result,
            });
        }));
    }

    fn on_connect_outcome(
        &mut self,
        generation: u64,
        attempt: u32,
        result: Result<TransportLink, TransportError>,
    ) {
        match result {
            Ok(link) => {
                if !self.state.connection.on_connected(generation) {
                    debug!(generation, "runtime: discarding link from a stale attempt");
                    return;
                }
                self.pending_connect = None;
                self.link = Some(link);
                if attempt == 0 {
                    self.notify(ClientNotice::Connected);
                } else {
                    info!(attempt, "runtime: reconnected");
                    self.notify(ClientNotice::Reconnected);
                    if self.settings.rejoin_rooms_on_reconnect {
                        for directive in self.state.rooms.rejoin_directives() {
                            self.emit(directive);
                        }
                    }
                }
            }
            Err(err) => match self
                .state
                .connection
                .on_attempt_failed(generation, attempt, &err)
            {
                AttemptFailure::Stale => {}
                AttemptFailure::Rejected(reason) => {
                    self.clear_session_state();
                    self.notify(ClientNotice::HandshakeRejected { reason });
                }
                AttemptFailure::Retry(next) => self.spawn_attempt(next),
                AttemptFailure::Exhausted => {
                    self.clear_session_state();
                    self.notify(ClientNotice::ConnectionLost);
                }
            },
        }
    }

    fn handle_link_closed(&mut self) {
        self.link = None;
        match self.state.connection.on_dropped() {
            AttemptFailure::Retry(next) => {
                self.notify(ClientNotice::Dropped);
                self.reset_live_state();
                if !self.settings.rejoin_rooms_on_reconnect {
                    self.state.rooms.clear();
                }
                self.spawn_attempt(next);
            }
            AttemptFailure::Exhausted => {
                self.notify(ClientNotice::Dropped);
                self.clear_session_state();
                self.notify(ClientNotice::ConnectionLost);
            }
            AttemptFailure::Stale | AttemptFailure::Rejected(_) => {}
        }
    }

    fn join_room(&mut self, conversation_id: ConversationId) {
        let state = self.state.connection.state();
        if let Some(directive) = self.state.rooms.join(conversation_id, state) {
            self.emit(directive);
        }
    }

    fn emit(&self, directive: ClientDirective) {
        let name = directive.name();
        let delivered = self.link.as_ref().is_some_and(|link| link.emit(directive));
        if !delivered {
            debug!(event = name, "runtime: no live link, dropping directive");
        }
    }

    fn arm_typing_expiry(&mut self, conversation_id: &ConversationId, user_id: &UserId) {
        let expiry = self.settings.typing_expiry();
        if expiry.is_zero() || self.state.presence.typing_in(conversation_id) != Some(user_id) {
            return;
        }
        let key = conversation_id.clone();
        self.remote_typing.arm(
            conversation_id.clone(),
            user_id.clone(),
            expiry,
            &self.internal_tx,
            move |generation| Internal::RemoteTypingExpired {
                conversation_id: key,
                generation,
            },
        );
    }

    fn notify(&self, notice: ClientNotice) {
        let _ = self.notices.send(notice);
    }

    /// State tied to one live link.
    fn reset_live_state(&mut self) {
        self.state.presence.reset();
        self.remote_typing.drain();
        self.dispatch.reset();
    }

    fn clear_session_state(&mut self) {
        self.reset_live_state();
        self.state.rooms.clear();
    }

    /// Returns true when a session was active.
    fn teardown(&mut self) -> bool {
        if let Some(pending) = self.pending_connect.take() {
            pending.abort();
        }
        self.link = None;
        let was_active = self.state.connection.disconnect();
        self.clear_session_state();
        was_active
    }
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
