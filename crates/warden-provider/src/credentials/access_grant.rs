//! Access grants: single-use authorization codes exchanged for tokens.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use warden_core::config::CredentialConfig;
use warden_core::db::unix_timestamp;
use warden_core::{Identity, ScopeSet};
use warden_crypto::{DEFAULT_TOKEN_BYTES, TokenGenerator};

use super::{expiry_from, redact, validate_redirect_uri};
use crate::error::{CredentialError, Result};
use crate::storage::{
    AccessGrant, AccessToken, Client, GrantRedemption, NewGrant, NewToken, ProviderDatabase,
};

const REPLAYED: &str = "You can't use the same access grant twice";

/// Absolute expiry of a grant issued at `now`. Grants always expire.
pub(crate) fn grant_expiry(now: i64, expires_in: Option<i64>, default: i64) -> Result<i64> {
    let secs = expires_in.unwrap_or(default);
    if secs <= 0 {
        return Err(CredentialError::Validation(format!(
            "grant lifetime must be positive, got {secs}"
        )));
    }
    Ok(now.saturating_add(secs))
}

#[derive(Clone)]
pub struct AccessGrantService {
    db: ProviderDatabase,
    generator: Arc<dyn TokenGenerator>,
    config: CredentialConfig,
}

impl AccessGrantService {
    pub fn new(
        db: ProviderDatabase,
        generator: Arc<dyn TokenGenerator>,
        config: CredentialConfig,
    ) -> Self {
        Self {
            db,
            generator,
            config,
        }
    }

    /// Issue a grant for `identity`, clipped to the client's scope.
    ///
    /// Without `expires_in` the grant lives for the configured grant TTL.
    #[instrument(skip(self, identity, client, scope), fields(client_id = %client.id))]
    pub async fn create(
        &self,
        identity: &Identity,
        client: &Client,
        scope: &ScopeSet,
        redirect_uri: Option<&str>,
        expires_in: Option<i64>,
    ) -> Result<AccessGrant> {
        identity.validate()?;

        let scope = scope.intersect(&client.scope);
        let redirect_uri = match (&client.redirect_uri, redirect_uri) {
            (Some(registered), _) => Some(registered.clone()),
            (None, Some(supplied)) => Some(validate_redirect_uri(supplied)?),
            (None, None) => None,
        };
        let expires_at = grant_expiry(unix_timestamp(), expires_in, self.config.grant_ttl_secs)?;
        let code = self.generator.generate(DEFAULT_TOKEN_BYTES)?;

        let grant = self
            .db
            .create_grant(&NewGrant {
                code: &code,
                identity,
                client_id: &client.id,
                scope: &scope,
                redirect_uri: redirect_uri.as_deref(),
                expires_at,
            })
            .await?
            .ok_or_else(|| {
                CredentialError::invalid_grant(format!("client {} is revoked or gone", client.id))
            })?;

        info!(code = redact(&grant.code), scope = %grant.scope, expires_at, "Access grant issued");
        Ok(grant)
    }

    /// Exchange a grant for an access token. Succeeds at most once per code.
    ///
    /// The token is obtained the same way as
    /// [`AccessTokenService::get_or_create`](super::AccessTokenService::get_or_create),
    /// so an active token for the same identity, client and scope is reused.
    #[instrument(skip(self, code), fields(code = redact(code)))]
    pub async fn authorize(&self, code: &str, expires_in: Option<i64>) -> Result<AccessToken> {
        let grant = self
            .db
            .get_grant(code)
            .await?
            .ok_or_else(|| CredentialError::NotFound(format!("Access grant {}", redact(code))))?;

        if grant.is_redeemed() || grant.revoked_at.is_some() {
            warn!(client_id = %grant.client_id, "Replayed or revoked access grant");
            return Err(CredentialError::invalid_grant(REPLAYED));
        }
        if grant.is_expired() {
            return Err(CredentialError::invalid_grant("access grant has expired"));
        }

        let client = self
            .db
            .find_client(&grant.client_id)
            .await?
            .filter(|c| !c.is_revoked())
            .ok_or_else(|| {
                CredentialError::invalid_grant(format!(
                    "client {} is revoked or gone",
                    grant.client_id
                ))
            })?;

        let scope = grant.scope.intersect(&client.scope);
        let expires_at = expiry_from(unix_timestamp(), expires_in, self.config.token_ttl_secs)?;
        let token = self.generator.generate(DEFAULT_TOKEN_BYTES)?;

        let redemption = self
            .db
            .redeem_grant(
                code,
                &NewToken {
                    token: &token,
                    identity: Some(&grant.identity),
                    client_id: &client.id,
                    scope: &scope,
                    expires_at,
                },
            )
            .await?;

        match redemption {
            GrantRedemption::Redeemed(token) => {
                info!(
                    client_id = %token.client_id,
                    token = redact(&token.token),
                    "Access grant redeemed"
                );
                Ok(token)
            }
            GrantRedemption::Spent => {
                warn!(client_id = %grant.client_id, "Access grant claimed by a concurrent request");
                Err(CredentialError::invalid_grant(REPLAYED))
            }
            GrantRedemption::ClientInactive => Err(CredentialError::invalid_grant(format!(
                "client {} is revoked or gone",
                grant.client_id
            ))),
        }
    }

    /// Revoke a grant so it can no longer be redeemed. Revoking twice is
    /// not an error.
    #[instrument(skip(self, code), fields(code = redact(code)))]
    pub async fn revoke(&self, code: &str) -> Result<()> {
        if self.db.revoke_grant(code).await? {
            info!("Access grant revoked");
            return Ok(());
        }
        if self.db.get_grant(code).await?.is_none() {
            return Err(CredentialError::NotFound(format!(
                "Access grant {}",
                redact(code)
            )));
        }
        Ok(())
    }

    pub async fn from_code(&self, code: &str) -> Result<Option<AccessGrant>> {
        Ok(self.db.get_grant(code).await?)
    }
}
