use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server refused the handshake credential. Retrying with the same token is pointless.
    #[error("handshake rejected: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Io(String),
    #[error("invalid realtime endpoint: {0}")]
    InvalidEndpoint(String),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no session token available; log in before connecting")]
    AuthRequired,
    #[error("chat event loop is not running")]
    NotRunning,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("conversation api request failed: {source}")]
    Api { source: anyhow::Error },
}

impl ChatError {
    pub fn api(source: anyhow::Error) -> Self {
        Self::Api { source }
    }
}
