use std::{path::Path, time::Duration};

use ::config::{Config, Environment, File};
use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub socket_url: String,
    pub api_base_url: String,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub typing_idle_ms: u64,
    /// Clears a peer's typing indicator when no stop arrives in time; `0` disables it.
    /// Senders refresh nothing while typing continuously, so keep it well above a composing session.
    pub typing_expiry_ms: u64,
    /// Replay joins for tracked rooms after a successful reconnect.
    pub rejoin_rooms_on_reconnect: bool,
    /// Opening a conversation in the store also requests its room.
    pub auto_join_open_conversation: bool,
    pub notice_buffer: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            socket_url: "ws://127.0.0.1:5000/ws".into(),
            api_base_url: "http://127.0.0.1:5000/api".into(),
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
            typing_idle_ms: 2000,
            typing_expiry_ms: 0,
            rejoin_rooms_on_reconnect: false,
            auto_join_open_conversation: false,
            notice_buffer: 1024,
        }
    }
}

impl ClientSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }

    pub fn typing_expiry(&self) -> Duration {
        Duration::from_millis(self.typing_expiry_ms)
    }
}

/// Layers `path` (optional, format from its extension) and `APP__*` environment variables
/// over the defaults. Values that do not fit a field are an error.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<ClientSettings> {
    load_settings_from(path, Environment::with_prefix("APP"))
}

fn load_settings_from(path: Option<&Path>, env: Environment) -> anyhow::Result<ClientSettings> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(false));
    }
    builder
        .add_source(
            env.prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to read client settings")?
        .try_deserialize::<ClientSettings>()
        .context("invalid client settings")
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
