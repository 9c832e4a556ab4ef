//! `Warden` identifier generation
//!
//! Produces the opaque credentials handed out by the provider: client
//! secrets, client keys, authorization codes and bearer tokens. Every value
//! is drawn from the operating system CSPRNG and hex encoded.

pub mod compare;
pub mod error;
pub mod generator;

pub use compare::constant_time_str_eq;
pub use error::CryptoError;
pub use generator::{
    CLIENT_KEY_BYTES, DEFAULT_TOKEN_BYTES, SecureTokenGenerator, TokenGenerator, generate_hex_token,
};
