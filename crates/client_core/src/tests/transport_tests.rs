use std::time::Duration;

use axum::{
    extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use shared::protocol::PresencePayload;
use tokio::net::TcpListener;

use super::*;

const GOOD_TOKEN: &str = "token-u1";

async fn ws_handler(headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some("Bearer token-u1");
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(echo_presence)
}

/// Answers each `join-conversation` with a garbage frame followed by `user-online`.
async fn echo_presence(mut socket: WebSocket) {
    while let Some(Ok(frame)) = socket.recv().await {
        let AxumMessage::Text(text) = frame else {
            continue;
        };
        let Ok(ClientDirective::JoinConversation(conversation_id)) =
            serde_json::from_str::<ClientDirective>(&text)
        else {
            continue;
        };
        let _ = socket
            .send(AxumMessage::Text(r#"{"event":"ping","data":{}}"#.into()))
            .await;
        let online = ServerEvent::UserOnline(PresencePayload {
            user_id: format!("peer-of-{conversation_id}").into(),
        });
        let _ = socket
            .send(AxumMessage::Text(
                serde_json::to_string(&online).expect("encode"),
            ))
            .await;
    }
}

async fn spawn_ws_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route("/ws", get(ws_handler));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/ws")
}

#[test]
fn http_urls_map_onto_websocket_schemes() {
    assert_eq!(
        websocket_url("http://127.0.0.1:5000/ws").expect("url").as_str(),
        "ws://127.0.0.1:5000/ws"
    );
    assert_eq!(
        websocket_url("https://chat.example/ws").expect("url").scheme(),
        "wss"
    );
    assert_eq!(
        websocket_url("wss://chat.example/ws").expect("url").scheme(),
        "wss"
    );
}

#[test]
fn unusable_urls_are_invalid_endpoints() {
    assert!(matches!(
        websocket_url("ftp://chat.example/ws"),
        Err(TransportError::InvalidEndpoint(_))
    ));
    assert!(matches!(
        websocket_url("not a url"),
        Err(TransportError::InvalidEndpoint(_))
    ));
}

#[tokio::test]
async fn wrong_token_is_a_rejected_handshake() {
    let url = spawn_ws_server().await;
    let err = WsTransport::new(url)
        .connect("someone-else")
        .await
        .expect_err("handshake should fail");
    assert!(matches!(err, TransportError::Rejected(_)), "{err:?}");
}

#[tokio::test]
async fn unreachable_server_is_an_io_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = WsTransport::new(format!("ws://{addr}/ws"))
        .connect(GOOD_TOKEN)
        .await
        .expect_err("nothing listens");
    assert!(matches!(err, TransportError::Io(_)), "{err:?}");
}

#[tokio::test]
async fn link_writes_directives_and_skips_undecodable_frames() {
    let url = spawn_ws_server().await;
    let mut link = WsTransport::new(url)
        .connect(GOOD_TOKEN)
        .await
        .expect("connect");

    assert!(link.emit(ClientDirective::JoinConversation("c1".into())));

    let event = tokio::time::timeout(Duration::from_secs(5), link.recv())
        .await
        .expect("event in time")
        .expect("link open");
    assert_eq!(
        event,
        ServerEvent::UserOnline(PresencePayload {
            user_id: "peer-of-c1".into(),
        })
    );
}
