//! SQLite storage for the Warden provider.
//!
//! Persists clients, authorization requests, access grants and access
//! tokens. Every multi-record transition runs in one transaction that opens
//! with a conditional write, so the check and the update cannot interleave
//! with another writer.

mod db;
mod models;
mod queries_clients;
mod queries_grants;
mod queries_requests;
mod queries_tokens;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests;

pub use db::ProviderDatabase;
pub use models::*;
pub use queries_clients::{CascadeSummary, ClientChanges, NewClient};
pub use queries_grants::{GrantRedemption, NewGrant};
pub use queries_requests::{AuthDecision, AuthIssue, NewAuthRequest};
pub use queries_tokens::{Issued, MAX_REPORT_DAYS, NewToken, TokenFilter};
pub use warden_core::db::DatabaseError;
