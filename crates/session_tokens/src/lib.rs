//! Bearer credentials carried in the realtime handshake and REST calls.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::domain::UserId;
use thiserror::Error;

const SUBJECT_PREFIX: &str = "user:";

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token rejected: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token subject is not a user: {0}")]
    BadSubject(String),
}

pub fn mint_token(cfg: &TokenConfig, user_id: &UserId) -> Result<String, TokenError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(cfg.ttl_seconds);
    let claims = Claims {
        sub: format!("{SUBJECT_PREFIX}{user_id}"),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.secret.as_bytes()),
    )?)
}

/// Returns the user the token was issued to, after checking signature and expiry.
pub fn verify_token(cfg: &TokenConfig, token: &str) -> Result<UserId, TokenError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.secret.as_bytes()),
        &Validation::default(),
    )?;
    data.claims
        .sub
        .strip_prefix(SUBJECT_PREFIX)
        .filter(|id| !id.trim().is_empty())
        .map(UserId::from)
        .ok_or(TokenError::BadSubject(data.claims.sub))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
