use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::protocol::{ClientDirective, ServerEvent};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue, StatusCode},
        Error as WsError, Message,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::error::TransportError;

/// Opens realtime links. One call per connection attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, token: &str) -> Result<TransportLink, TransportError>;
}

/// An established link: directives go out on `outbound`, decoded events come in on `inbound`.
/// Dropping the link closes it.
#[derive(Debug)]
pub struct TransportLink {
    outbound: mpsc::UnboundedSender<ClientDirective>,
    inbound: mpsc::UnboundedReceiver<ServerEvent>,
}

impl TransportLink {
    pub fn new(
        outbound: mpsc::UnboundedSender<ClientDirective>,
        inbound: mpsc::UnboundedReceiver<ServerEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Non-blocking; returns false when the writer side is already gone.
    pub fn emit(&self, directive: ClientDirective) -> bool {
        self.outbound.send(directive).is_ok()
    }

    /// `None` once the remote side has gone away.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.inbound.recv().await
    }
}

/// `tokio-tungstenite` transport carrying the bearer token in the handshake.
#[derive(Debug, Clone)]
pub struct WsTransport {
    socket_url: String,
}

impl WsTransport {
    pub fn new(socket_url: impl Into<String>) -> Self {
        Self {
            socket_url: socket_url.into(),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, token: &str) -> Result<TransportLink, TransportError> {
        let url = websocket_url(&self.socket_url)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| TransportError::InvalidEndpoint(err.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| TransportError::Rejected("token is not a valid header value".into()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, _) = connect_async(request).await.map_err(classify_connect_error)?;
        debug!(url = %url, "transport: websocket established");
        let (mut writer, mut reader) = stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientDirective>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<ServerEvent>();

        tokio::spawn(async move {
            while let Some(directive) = out_rx.recv().await {
                let text = match serde_json::to_string(&directive) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(event = directive.name(), %err, "transport: failed to encode directive");
                        continue;
                    }
                };
                if let Err(err) = writer.send(Message::Text(text)).await {
                    warn!(%err, "transport: websocket send failed");
                    break;
                }
            }
            let _ = writer.send(Message::Close(None)).await;
        });

        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    frame = reader.next() => frame,
                    _ = in_tx.closed() => break,
                };
                match frame {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if in_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(%err, "transport: dropping undecodable frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(%err, "transport: websocket receive failed");
                        break;
                    }
                }
            }
            debug!("transport: reader finished");
        });

        Ok(TransportLink::new(out_tx, in_rx))
    }
}

/// Accepts `ws(s)://` directly and maps `http(s)://` onto it.
pub fn websocket_url(raw: &str) -> Result<Url, TransportError> {
    let mut url =
        Url::parse(raw).map_err(|err| TransportError::InvalidEndpoint(format!("{raw}: {err}")))?;
    let scheme = match url.scheme() {
        "ws" | "wss" => return Ok(url),
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(TransportError::InvalidEndpoint(format!(
                "unsupported scheme '{other}'"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| TransportError::InvalidEndpoint(format!("cannot use {raw} as websocket")))?;
    Ok(url)
}

fn classify_connect_error(err: WsError) -> TransportError {
    match err {
        WsError::Http(response)
            if matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ) =>
        {
            TransportError::Rejected(format!("server answered {}", response.status()))
        }
        WsError::Url(err) => TransportError::InvalidEndpoint(err.to_string()),
        other => TransportError::Io(other.to_string()),
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
