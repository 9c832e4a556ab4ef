//! Random opaque identifiers.
//!
//! Values are `2 * byte_len` lowercase hex characters read from `OsRng`.

use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::CryptoError;

/// Length of secrets, grant codes and access tokens.
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// Length of public client keys. Short on purpose: an identifier, not a secret.
pub const CLIENT_KEY_BYTES: usize = 4;

/// Source of opaque identifiers.
///
/// Production code uses [`SecureTokenGenerator`]. The trait exists so
/// callers can be handed a generator explicitly instead of reaching for a
/// global.
pub trait TokenGenerator: Send + Sync {
    /// Return `2 * byte_len` hex characters.
    fn generate(&self, byte_len: usize) -> Result<String, CryptoError>;
}

/// CSPRNG-backed generator. Never seeded; every call reads the OS RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureTokenGenerator;

impl SecureTokenGenerator {
    pub const fn new() -> Self {
        Self
    }
}

impl TokenGenerator for SecureTokenGenerator {
    fn generate(&self, byte_len: usize) -> Result<String, CryptoError> {
        generate_hex_token(byte_len)
    }
}

/// Generate `byte_len` random bytes and hex-encode them.
pub fn generate_hex_token(byte_len: usize) -> Result<String, CryptoError> {
    if byte_len == 0 {
        return Err(CryptoError::InvalidLength(byte_len));
    }
    let mut bytes = vec![0u8; byte_len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(hex::encode(bytes))
}
