//! Credential lifecycle services for the Warden provider.
//!
//! Each service wraps the [`ProviderDatabase`] and owns one kind of record:
//! clients, authorization requests, access grants and access tokens. The
//! endpoint layer talks to these services only.

pub mod access_grant;
pub mod access_token;
pub mod auth_request;
pub mod client;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod auth_request_tests;
#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod test_helpers;

use std::sync::Arc;

use url::Url;
use warden_core::config::CredentialConfig;
use warden_crypto::TokenGenerator;

use crate::error::{CredentialError, Result};
use crate::storage::ProviderDatabase;

pub use access_grant::AccessGrantService;
pub use access_token::AccessTokenService;
pub use auth_request::AuthRequestService;
pub use client::{ClientRegistration, ClientService};

/// All four services over one database.
#[derive(Clone)]
pub struct Provider {
    pub clients: ClientService,
    pub auth_requests: AuthRequestService,
    pub grants: AccessGrantService,
    pub tokens: AccessTokenService,
}

impl Provider {
    pub fn new(
        db: ProviderDatabase,
        generator: Arc<dyn TokenGenerator>,
        config: CredentialConfig,
    ) -> Self {
        Self {
            clients: ClientService::new(db.clone(), Arc::clone(&generator), config.clone()),
            auth_requests: AuthRequestService::new(
                db.clone(),
                Arc::clone(&generator),
                config.clone(),
            ),
            grants: AccessGrantService::new(db.clone(), Arc::clone(&generator), config.clone()),
            tokens: AccessTokenService::new(db, generator, config),
        }
    }
}

/// Parse and normalize a redirect URI. Only absolute URIs without a
/// fragment are accepted.
pub(crate) fn validate_redirect_uri(raw: &str) -> Result<String> {
    let url = Url::parse(raw.trim())
        .map_err(|e| CredentialError::Validation(format!("invalid redirect URI {raw:?}: {e}")))?;
    if url.fragment().is_some() {
        return Err(CredentialError::Validation(format!(
            "redirect URI {raw:?} must not contain a fragment"
        )));
    }
    Ok(url.to_string())
}

/// Absolute expiry for a credential issued at `now`.
///
/// `None` falls back to `default`; zero means the credential never expires.
pub(crate) fn expiry_from(
    now: i64,
    expires_in: Option<i64>,
    default: Option<i64>,
) -> Result<Option<i64>> {
    match expires_in.or(default) {
        None | Some(0) => Ok(None),
        Some(secs) if secs < 0 => Err(CredentialError::Validation(format!(
            "expires_in must not be negative, got {secs}"
        ))),
        Some(secs) => Ok(Some(now.saturating_add(secs))),
    }
}

/// Leading characters of a credential, safe to log.
pub(crate) fn redact(credential: &str) -> &str {
    credential.get(..8).unwrap_or(credential)
}
