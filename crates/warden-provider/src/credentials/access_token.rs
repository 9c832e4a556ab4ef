//! Access tokens: issuance, resource access checks, revocation and
//! reporting.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use warden_core::config::CredentialConfig;
use warden_core::db::unix_timestamp;
use warden_core::{Identity, ScopeSet};
use warden_crypto::{DEFAULT_TOKEN_BYTES, TokenGenerator};

use super::{expiry_from, redact};
use crate::error::{CredentialError, Result};
use crate::storage::{
    AccessToken, Client, DailyTokenStats, Issued, MAX_REPORT_DAYS, NewToken, ProviderDatabase,
    TokenFilter,
};

/// Days covered by [`AccessTokenService::historical`] when none are given.
pub const DEFAULT_HISTORY_DAYS: i64 = 60;

#[derive(Clone)]
pub struct AccessTokenService {
    db: ProviderDatabase,
    generator: Arc<dyn TokenGenerator>,
    config: CredentialConfig,
}

impl AccessTokenService {
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

    /// Return the oldest active token for (identity, client, scope), or
    /// issue a new one.
    ///
    /// A reused token keeps its own expiry; `expires_in` only applies when
    /// a token is created.
    #[instrument(skip(self, identity, client, scope), fields(client_id = %client.id))]
    pub async fn get_or_create(
        &self,
        identity: &Identity,
        client: &Client,
        scope: &ScopeSet,
        expires_in: Option<i64>,
    ) -> Result<AccessToken> {
        identity.validate()?;

        let scope = scope.intersect(&client.scope);
        let expires_at = expiry_from(unix_timestamp(), expires_in, self.config.token_ttl_secs)?;
        let token = self.generator.generate(DEFAULT_TOKEN_BYTES)?;

        let issued = self
            .db
            .get_or_create_token(&NewToken {
                token: &token,
                identity: Some(identity),
                client_id: &client.id,
                scope: &scope,
                expires_at,
            })
            .await?
            .ok_or_else(|| inactive_client(client))?;

        match &issued {
            Issued::Reused(token) => debug!(token = redact(&token.token), "Reusing access token"),
            Issued::Created(token) => {
                info!(token = redact(&token.token), scope = %token.scope, "Access token issued");
            }
        }
        Ok(issued.into_token())
    }

    /// Issue a new token. `identity` is optional for client-only tokens.
    #[instrument(skip(self, client, scope, identity), fields(client_id = %client.id))]
    pub async fn create(
        &self,
        client: &Client,
        scope: &ScopeSet,
        identity: Option<&Identity>,
        expires_in: Option<i64>,
    ) -> Result<AccessToken> {
        if let Some(identity) = identity {
            identity.validate()?;
        }

        let scope = scope.intersect(&client.scope);
        let expires_at = expiry_from(unix_timestamp(), expires_in, self.config.token_ttl_secs)?;
        let token = self.generator.generate(DEFAULT_TOKEN_BYTES)?;

        let token = self
            .db
            .create_token(&NewToken {
                token: &token,
                identity,
                client_id: &client.id,
                scope: &scope,
                expires_at,
            })
            .await?
            .ok_or_else(|| inactive_client(client))?;

        info!(token = redact(&token.token), scope = %token.scope, "Access token issued");
        Ok(token)
    }

    /// Record that the token was just used.
    pub async fn access(&self, token: &str) -> Result<()> {
        self.db.record_token_access(token, unix_timestamp()).await?;
        Ok(())
    }

    /// Resolve a bearer token presented for resource access.
    ///
    /// Revoked, expired and unknown tokens are rejected alike. Access is
    /// recorded on success; a failure to record it is logged and ignored.
    #[instrument(skip(self, token), fields(token = redact(token)))]
    pub async fn authenticate(&self, token: &str) -> Result<AccessToken> {
        let Some(record) = self.db.get_active_token(token).await? else {
            debug!("Rejected inactive access token");
            return Err(CredentialError::invalid_grant("invalid access token"));
        };

        if let Err(e) = self.access(token).await {
            warn!(error = %e, "Failed to record token access");
        }
        Ok(record)
    }

    /// Revoke a token. Revoking twice is not an error; the client's
    /// revocation counter moves only once.
    #[instrument(skip(self, token), fields(token = redact(token)))]
    pub async fn revoke(&self, token: &str) -> Result<()> {
        if self.db.revoke_token(token).await? {
            info!("Access token revoked");
            return Ok(());
        }
        if self.db.get_token(token).await?.is_none() {
            return Err(CredentialError::NotFound(format!(
                "Access token {}",
                redact(token)
            )));
        }
        Ok(())
    }

    /// Count tokens matching `filter`. `days` must be within
    /// `0..=MAX_REPORT_DAYS`.
    pub async fn count(&self, filter: &TokenFilter) -> Result<i64> {
        if let Some(days) = filter.days {
            check_report_days(days, 0)?;
        }
        Ok(self.db.count_tokens(filter).await?)
    }

    /// Page through a client's tokens, oldest first. Unknown clients have
    /// no tokens.
    pub async fn for_client(
        &self,
        client_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<AccessToken>> {
        Ok(self.db.list_client_tokens(client_id, offset, limit).await?)
    }

    /// Any token by value, revoked or expired included.
    pub async fn from_token(&self, token: &str) -> Result<Option<AccessToken>> {
        Ok(self.db.get_token(token).await?)
    }

    /// Every token issued to `identity`, newest first.
    pub async fn from_identity(
        &self,
        identity: &Identity,
        active_only: bool,
    ) -> Result<Vec<AccessToken>> {
        Ok(self.db.list_identity_tokens(identity, active_only).await?)
    }

    /// Daily issued/revoked counts, oldest day first.
    pub async fn historical(
        &self,
        days: Option<i64>,
        client_id: Option<&str>,
    ) -> Result<Vec<DailyTokenStats>> {
        let days = days.unwrap_or(DEFAULT_HISTORY_DAYS);
        check_report_days(days, 1)?;
        Ok(self.db.token_history(days, client_id).await?)
    }
}

fn check_report_days(days: i64, min: i64) -> Result<()> {
    if (min..=MAX_REPORT_DAYS).contains(&days) {
        return Ok(());
    }
    Err(CredentialError::Validation(format!(
        "report window must be {min} to {MAX_REPORT_DAYS} days, got {days}"
    )))
}

fn inactive_client(client: &Client) -> CredentialError {
    CredentialError::invalid_grant(format!("client {} is revoked or gone", client.id))
}
