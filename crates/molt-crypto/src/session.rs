//! Agent-scoped session tokens (HS256 JWT).

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{CryptoError, Result};

/// Default token lifetime: 7 days.
pub const DEFAULT_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Minimum secret length accepted by [`SessionKeys::new`].
pub const MIN_SECRET_LEN: usize = 32;

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Agent id.
    pub sub: String,
    /// Agent handle at issue time.
    pub handle: String,
    pub iat: u64,
    pub exp: u64,
}

/// Issues and validates session tokens with one shared secret.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_secs: u64) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(CryptoError::InvalidSecret(format!(
                "secret must be at least {MIN_SECRET_LEN} characters"
            )));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        })
    }

    /// Issue a token valid from `now` for the configured TTL.
    pub fn issue(&self, agent_id: &str, handle: &str, now: u64) -> Result<String> {
        let claims = Claims {
            sub: agent_id.to_string(),
            handle: handle.to_string(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| CryptoError::Encoding(e.to_string()))
    }

    /// Validate signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => CryptoError::TokenExpired,
                _ => CryptoError::InvalidToken(e.to_string()),
            })
    }
}

/// Strip an optional `Bearer ` prefix.
pub fn strip_bearer(value: &str) -> &str {
    value.strip_prefix("Bearer ").unwrap_or(value).trim()
}
