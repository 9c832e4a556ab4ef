//! Warden OAuth2 provider core.
//!
//! The credential lifecycle behind an OAuth2 authorization server:
//! - Client registration, lookup, authentication and revocation
//! - Authorization requests and the grant/deny decision
//! - Single-use access grants (authorization codes)
//! - Bearer access tokens with access tracking and reporting
//! - SQLite persistence with atomic multi-record transitions

pub mod credentials;
pub mod error;
pub mod storage;

pub use credentials::{
    AccessGrantService, AccessTokenService, AuthRequestService, ClientRegistration, ClientService,
    Provider,
};
pub use error::{CredentialError, Result};
