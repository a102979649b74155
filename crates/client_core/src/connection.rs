use std::time::Duration;

use shared::domain::UserId;
use tracing::{info, warn};

use crate::error::{ChatError, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: UserId,
    pub token: Option<String>,
}

impl Credentials {
    pub fn new(user_id: impl Into<UserId>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: Some(token.into()),
        }
    }

    pub fn anonymous(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            token: None,
        }
    }

    pub(crate) fn bearer(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.trim().is_empty())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub token: String,
}

/// One scheduled connection attempt. `attempt` is 0 for the initial connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectAttempt {
    pub generation: u64,
    pub attempt: u32,
    pub delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The outcome belongs to a torn-down cycle.
    Stale,
    Rejected(String),
    Retry(ConnectAttempt),
    Exhausted,
}

/// Connection lifecycle bookkeeping. Owns no I/O: the event loop performs the
/// attempts this type schedules and reports their outcome back.
#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    policy: ReconnectPolicy,
    session: Option<Session>,
    generation: u64,
}

impl ConnectionManager {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            policy,
            session: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    pub fn begin_connect(&mut self, credentials: Credentials) -> Result<ConnectAttempt, ChatError> {
        let Some(token) = credentials.bearer() else {
            warn!(user_id = %credentials.user_id, "connection: no token available, not connecting");
            return Err(ChatError::AuthRequired);
        };

        self.session = Some(Session {
            user_id: credentials.user_id.clone(),
            token: token.to_string(),
        });
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        info!(user_id = %credentials.user_id, "connection: connecting");
        Ok(ConnectAttempt {
            generation: self.generation,
            attempt: 0,
            delay: Duration::ZERO,
        })
    }

    /// Returns false when the link belongs to a stale cycle and must be discarded.
    pub fn on_connected(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.session.is_none() {
            return false;
        }
        match self.state {
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => {
                self.state = ConnectionState::Connected;
                info!("connection: connected");
                true
            }
            _ => false,
        }
    }

    pub fn on_attempt_failed(
        &mut self,
        generation: u64,
        attempt: u32,
        error: &TransportError,
    ) -> AttemptFailure {
        if generation != self.generation {
            return AttemptFailure::Stale;
        }
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        ) {
            return AttemptFailure::Stale;
        }

        match error {
            TransportError::Rejected(reason) => {
                warn!(%reason, "connection: handshake rejected");
                self.give_up();
                AttemptFailure::Rejected(reason.clone())
            }
            TransportError::InvalidEndpoint(reason) => {
                warn!(%reason, "connection: endpoint unusable");
                self.give_up();
                AttemptFailure::Exhausted
            }
            TransportError::Io(reason) => {
                warn!(attempt, %reason, "connection: attempt failed");
                self.schedule_retry(attempt + 1)
            }
        }
    }

    /// An established link went away without a local disconnect.
    pub fn on_dropped(&mut self) -> AttemptFailure {
        if self.state != ConnectionState::Connected {
            return AttemptFailure::Stale;
        }
        warn!("connection: transport dropped");
        self.schedule_retry(1)
    }

    /// Returns true when there was something to tear down.
    pub fn disconnect(&mut self) -> bool {
        let was_active = self.state != ConnectionState::Disconnected;
        self.generation += 1;
        self.session = None;
        self.state = ConnectionState::Disconnected;
        if was_active {
            info!("connection: disconnected");
        }
        was_active
    }

    fn schedule_retry(&mut self, attempt: u32) -> AttemptFailure {
        if attempt > self.policy.max_attempts {
            warn!(
                max_attempts = self.policy.max_attempts,
                "connection: reconnect budget exhausted"
            );
            self.give_up();
            return AttemptFailure::Exhausted;
        }
        self.state = ConnectionState::Reconnecting { attempt };
        AttemptFailure::Retry(ConnectAttempt {
            generation: self.generation,
            attempt,
            delay: self.policy.delay,
        })
    }

    fn give_up(&mut self) {
        self.generation += 1;
        self.state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
