//! # molt-crypto
//!
//! Credential primitives for agents.
//!
//! ## Modules
//!
//! - [`api_key`]: API key generation and Argon2id PHC hashing
//! - [`session`]: HS256 session tokens issued after registration/login

pub mod api_key;
pub mod session;

/// Error types for credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Argon2id hashing failed or the stored hash is malformed.
    #[error("argon2id error: {0}")]
    Argon2(String),

    /// The session secret is unusable.
    #[error("invalid session secret: {0}")]
    InvalidSecret(String),

    /// The presented token is expired.
    #[error("token expired")]
    TokenExpired,

    /// The presented token failed validation.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Token encoding failed.
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

/// Convenience result type for credential operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
