//! Error kinds surfaced by the credential lifecycle API.
//!
//! The endpoint layer maps these onto protocol responses; the kind is
//! preserved all the way up.

use warden_core::db::DatabaseError;
use warden_crypto::CryptoError;

pub type Result<T> = std::result::Result<T, CredentialError>;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Malformed input. The caller must fix the request.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced client, request, grant or token does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The credential cannot be used: already redeemed, revoked, expired,
    /// or its client is gone. Retrying fails the same way.
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    /// Client authentication failed.
    #[error("Invalid client: {0}")]
    InvalidClient(String),

    /// Storage unavailable or failed. Never a business outcome.
    #[error("Persistence error: {0}")]
    Persistence(DatabaseError),

    /// The random source failed.
    #[error("Token generation failed: {0}")]
    Generator(#[from] CryptoError),
}

impl CredentialError {
    /// Whether the caller may retry (with backoff) and expect a different
    /// outcome.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Persistence(e) => e.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn invalid_grant(msg: impl Into<String>) -> Self {
        Self::InvalidGrant(msg.into())
    }
}

impl From<DatabaseError> for CredentialError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(what),
            other => Self::Persistence(other),
        }
    }
}

impl From<warden_core::Error> for CredentialError {
    fn from(e: warden_core::Error) -> Self {
        Self::Validation(e.to_string())
    }
}
