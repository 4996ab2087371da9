//! Agent API keys.
//!
//! Keys look like `mm_<32 hex chars>`. Only the Argon2id PHC string is
//! stored; the plaintext is returned once at registration.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::{CryptoError, Result};

/// Prefix every API key carries.
pub const API_KEY_PREFIX: &str = "mm_";

/// Random bytes behind each key.
const API_KEY_BYTES: usize = 16;

/// Generate a fresh plaintext API key.
pub fn generate() -> Zeroizing<String> {
    let mut raw = Zeroizing::new([0u8; API_KEY_BYTES]);
    rand::rngs::OsRng.fill_bytes(raw.as_mut());
    Zeroizing::new(format!("{API_KEY_PREFIX}{}", hex::encode(raw.as_ref())))
}

/// Hash a key into a PHC string (salt and parameters embedded).
pub fn hash(api_key: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(api_key.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CryptoError::Argon2(e.to_string()))
}

/// Check a presented key against a stored PHC string.
pub fn verify(api_key: &str, stored_hash: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|e| CryptoError::Argon2(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(api_key.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_format() {
        let key = generate();
        assert!(key.starts_with(API_KEY_PREFIX));
        assert_eq!(key.len(), API_KEY_PREFIX.len() + API_KEY_BYTES * 2);
        assert_ne!(*key, *generate());
    }

    #[test]
    fn test_hash_and_verify() {
        let key = generate();
        let stored = hash(&key).expect("hash");
        assert!(stored.starts_with("$argon2"));
        assert!(verify(&key, &stored).expect("verify"));
        assert!(!verify("mm_wrong", &stored).expect("verify"));
    }

    #[test]
    fn test_malformed_hash() {
        assert!(verify("mm_x", "not-a-phc-string").is_err());
    }
}
