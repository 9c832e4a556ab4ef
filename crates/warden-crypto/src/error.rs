//! Crypto error types.

/// Errors from identifier generation.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Random number generator failed: {0}")]
    RngFailed(String),

    #[error("Invalid token length: {0} bytes")]
    InvalidLength(usize),
}
