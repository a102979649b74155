use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ws::WebSocket, Path, Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use shared::{
    domain::{ConversationId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        ClientDirective, ConversationEnvelope, ConversationListResponse,
        CreateConversationRequest, MessageNotification, MessagePageResponse, SendFailure,
        SendMessagePayload, SendReceipt, ServerEvent, TypingPayload, UserTypingPayload,
    },
};
use tracing::{debug, info, warn};

mod api;
mod app_state;
mod config;
mod hub;

use crate::{app_state::AppState, config::load_settings, hub::ConnectionId};

type HttpError = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings()?;
    let state = AppState::new(settings.token_config());
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/chat/conversations",
            get(http_list_conversations).post(http_create_conversation),
        )
        .route(
            "/api/chat/conversations/:conversation_id/messages",
            get(http_list_messages),
        )
        .route("/ws", get(ws_handler))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(error: ApiError) -> HttpError {
    (status_for(error.code), Json(error))
}

/// Resolves the caller from `Authorization: Bearer`, falling back to a `token` query value.
fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<UserId, HttpError> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let token = bearer
        .or(query_token)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| reject(ApiError::unauthorized("missing bearer token")))?;
    session_tokens::verify_token(&state.tokens, token).map_err(|error| {
        debug!(%error, "token verification failed");
        reject(ApiError::unauthorized("invalid or expired token"))
    })
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_list_conversations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ConversationListResponse>, HttpError> {
    let user_id = authenticate(&state, &headers, None)?;
    let conversations = api::list_conversations(&state.directory, &user_id)
        .await
        .map_err(reject)?;
    Ok(Json(ConversationListResponse { conversations }))
}

async fn http_create_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<ConversationEnvelope>, HttpError> {
    let user_id = authenticate(&state, &headers, None)?;
    let conversation =
        api::get_or_create_conversation(&state.directory, &user_id, &req.user_id, req.listing_id)
            .await
            .map_err(reject)?;
    Ok(Json(ConversationEnvelope { conversation }))
}

async fn http_list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    Query(q): Query<MessagesQuery>,
) -> Result<Json<MessagePageResponse>, HttpError> {
    let user_id = authenticate(&state, &headers, None)?;
    let page = api::list_messages(
        &state.directory,
        &user_id,
        &ConversationId::new(conversation_id),
        q.page.unwrap_or(1),
    )
    .await
    .map_err(reject)?;
    Ok(Json(page))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<WsQuery>,
) -> Response {
    match authenticate(&state, &headers, q.token.as_deref()) {
        Ok(user_id) => ws
            .on_upgrade(move |socket| ws_connection(state, socket, user_id))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket, user_id: UserId) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};
    use tokio_stream::wrappers::UnboundedReceiverStream;

    let (mut sender, mut receiver) = socket.split();
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let connection = state.hub.register(user_id.clone(), events_tx).await;
    info!(connection, user_id = %user_id, "ws: connected");

    let send_task = tokio::spawn(async move {
        let mut events = UnboundedReceiverStream::new(events_rx);
        while let Some(event) = events.next().await {
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientDirective>(&text) {
                Ok(directive) => handle_directive(&state, connection, &user_id, directive).await,
                Err(error) => warn!(connection, %error, "ws: undecodable directive"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.hub.unregister(connection).await;
    send_task.abort();
    info!(connection, user_id = %user_id, "ws: disconnected");
}

async fn handle_directive(
    state: &AppState,
    connection: ConnectionId,
    user_id: &UserId,
    directive: ClientDirective,
) {
    debug!(connection, directive = directive.name(), "ws: directive");
    match directive {
        ClientDirective::JoinConversation(conversation_id) => {
            if state
                .directory
                .is_participant(user_id, &conversation_id)
                .await
            {
                state.hub.join(connection, conversation_id).await;
            } else {
                warn!(connection, conversation_id = %conversation_id, "ws: join refused");
            }
        }
        ClientDirective::LeaveConversation(conversation_id) => {
            state.hub.leave(connection, &conversation_id).await;
        }
        ClientDirective::SendMessage(payload) => {
            relay_message(state, connection, user_id, payload).await;
        }
        ClientDirective::Typing(payload) => {
            relay_typing(state, user_id, payload, true).await;
        }
        ClientDirective::StopTyping(payload) => {
            relay_typing(state, user_id, payload, false).await;
        }
    }
}

async fn relay_message(
    state: &AppState,
    connection: ConnectionId,
    sender_id: &UserId,
    payload: SendMessagePayload,
) {
    let posted = api::post_message(
        &state.directory,
        sender_id,
        &payload.conversation_id,
        &payload.receiver_id,
        &payload.message,
    )
    .await;
    let message = match posted {
        Ok(message) => message,
        Err(error) => {
            warn!(connection, %error, "ws: send rejected");
            state
                .hub
                .send_to_connection(
                    connection,
                    ServerEvent::MessageError(SendFailure {
                        error: error.message,
                    }),
                )
                .await;
            return;
        }
    };

    state
        .hub
        .send_to_room(
            &message.conversation_id,
            &ServerEvent::NewMessage(message.clone()),
        )
        .await;
    state
        .hub
        .send_to_connection(
            connection,
            ServerEvent::MessageSent(SendReceipt {
                id: Some(message.id.clone()),
                conversation_id: Some(message.conversation_id.clone()),
                created_at: Some(message.created_at),
            }),
        )
        .await;

    if !state
        .hub
        .user_in_room(&payload.receiver_id, &message.conversation_id)
        .await
    {
        state
            .hub
            .send_to_user(
                &payload.receiver_id,
                &ServerEvent::MessageNotification(MessageNotification {
                    conversation_id: message.conversation_id,
                    sender_id: Some(message.sender_id),
                    message: Some(message.body),
                    created_at: Some(message.created_at),
                }),
            )
            .await;
    }
}

async fn relay_typing(state: &AppState, user_id: &UserId, payload: TypingPayload, started: bool) {
    if !state
        .directory
        .is_participant(&payload.receiver_id, &payload.conversation_id)
        .await
        || !state
            .directory
            .is_participant(user_id, &payload.conversation_id)
            .await
    {
        return;
    }
    let typing = UserTypingPayload {
        conversation_id: payload.conversation_id,
        user_id: user_id.clone(),
    };
    let event = if started {
        ServerEvent::UserTyping(typing)
    } else {
        ServerEvent::UserStopTyping(typing)
    };
    state.hub.send_to_user(&payload.receiver_id, &event).await;
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
