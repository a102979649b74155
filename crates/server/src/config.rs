use anyhow::Context;
use ::config::{Config, Environment, File};
use serde::Deserialize;
use session_tokens::TokenConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub token_secret: String,
    pub token_ttl_seconds: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".into(),
            token_secret: "dev-secret".into(),
            token_ttl_seconds: 86_400,
        }
    }
}

impl Settings {
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            secret: self.token_secret.clone(),
            ttl_seconds: self.token_ttl_seconds,
        }
    }
}

/// Layers `server.toml` (optional) and `APP__*` environment variables over the defaults.
pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from("server", Environment::with_prefix("APP"))
}

fn load_settings_from(file_stem: &str, env: Environment) -> anyhow::Result<Settings> {
    Config::builder()
        .add_source(File::with_name(file_stem).required(false))
        .add_source(env.prefix_separator("__").separator("__"))
        .build()
        .context("failed to read server settings")?
        .try_deserialize::<Settings>()
        .context("invalid server settings")
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
