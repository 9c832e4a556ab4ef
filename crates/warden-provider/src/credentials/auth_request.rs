//! Authorization requests: created on each authorization attempt, then
//! granted or denied exactly once.

use std::sync::Arc;

use tracing::{debug, info, instrument};
use warden_core::config::CredentialConfig;
use warden_core::db::unix_timestamp;
use warden_core::{Identity, ScopeSet};
use warden_crypto::{DEFAULT_TOKEN_BYTES, TokenGenerator};

use super::access_grant::grant_expiry;
use super::{expiry_from, redact, validate_redirect_uri};
use crate::error::{CredentialError, Result};
use crate::storage::{
    AuthDecision, AuthIssue, AuthRequest, Client, NewAuthRequest, NewGrant, NewToken,
    ProviderDatabase, ResponseType,
};

#[derive(Clone)]
pub struct AuthRequestService {
    db: ProviderDatabase,
    generator: Arc<dyn TokenGenerator>,
    config: CredentialConfig,
}

impl AuthRequestService {
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

    /// Record an authorization attempt by `client`.
    ///
    /// The requested scope is clipped to the client's scope. The client's
    /// registered redirect URI wins over the one supplied here.
    #[instrument(skip(self, client, scope, state), fields(client_id = %client.id))]
    pub async fn create(
        &self,
        client: &Client,
        scope: &ScopeSet,
        redirect_uri: Option<&str>,
        response_type: ResponseType,
        state: Option<&str>,
    ) -> Result<AuthRequest> {
        if client.is_revoked() {
            return Err(CredentialError::InvalidClient(format!(
                "client {} has been revoked",
                client.id
            )));
        }

        let redirect_uri = match (&client.redirect_uri, redirect_uri) {
            (Some(registered), _) => Some(registered.clone()),
            (None, Some(supplied)) => Some(validate_redirect_uri(supplied)?),
            (None, None) => None,
        };
        let scope = scope.intersect(&client.scope);
        let id = uuid::Uuid::new_v4().to_string();

        let request = self
            .db
            .create_auth_request(&NewAuthRequest {
                id: &id,
                client_id: &client.id,
                scope: &scope,
                redirect_uri: redirect_uri.as_deref(),
                response_type,
                state,
            })
            .await?
            .ok_or_else(|| {
                CredentialError::InvalidClient(format!(
                    "client {} is revoked or gone",
                    client.id
                ))
            })?;

        debug!(request_id = %request.id, ?response_type, scope = %request.scope, "Auth request created");
        Ok(request)
    }

    pub async fn find(&self, id: &str) -> Result<Option<AuthRequest>> {
        Ok(self.db.find_auth_request(id).await?)
    }

    /// Grant a pending request on behalf of `identity`.
    ///
    /// Code requests get an access grant with the configured grant lifetime,
    /// token requests an access token (reusing an active one for the same
    /// identity, client and scope). `expires_in` is the access token
    /// lifetime and is ignored for code requests. A request that is revoked
    /// or already decided is returned unchanged.
    #[instrument(skip(self, identity))]
    pub async fn grant(
        &self,
        id: &str,
        identity: &Identity,
        expires_in: Option<i64>,
    ) -> Result<AuthRequest> {
        let request = self.db.get_auth_request(id).await?;
        if request.revoked_at.is_some() || request.authorized_at.is_some() {
            debug!(state = ?request.state(), "Auth request already settled");
            return Ok(request);
        }
        identity.validate()?;

        let client = self
            .db
            .find_client(&request.client_id)
            .await?
            .filter(|c| !c.is_revoked())
            .ok_or_else(|| CredentialError::NotFound(format!("Client {}", request.client_id)))?;
        let scope = request.scope.intersect(&client.scope);
        let now = unix_timestamp();
        let credential = self.generator.generate(DEFAULT_TOKEN_BYTES)?;

        let decision = match request.response_type {
            ResponseType::Code => {
                let expires_at = grant_expiry(now, None, self.config.grant_ttl_secs)?;
                let redirect_uri = client
                    .redirect_uri
                    .as_deref()
                    .or(request.redirect_uri.as_deref());
                let issue = AuthIssue::Code(NewGrant {
                    code: &credential,
                    identity,
                    client_id: &client.id,
                    scope: &scope,
                    redirect_uri,
                    expires_at,
                });
                self.db.grant_auth_request(id, &issue).await?
            }
            ResponseType::Token => {
                let expires_at = expiry_from(now, expires_in, self.config.token_ttl_secs)?;
                let issue = AuthIssue::Token(NewToken {
                    token: &credential,
                    identity: Some(identity),
                    client_id: &client.id,
                    scope: &scope,
                    expires_at,
                });
                self.db.grant_auth_request(id, &issue).await?
            }
        };

        match decision {
            AuthDecision::Decided(request) => {
                info!(
                    client_id = %request.client_id,
                    grant_code = ?request.grant_code.as_deref().map(redact),
                    access_token = ?request.access_token.as_deref().map(redact),
                    "Auth request granted"
                );
                Ok(request)
            }
            AuthDecision::Unchanged(request) => Ok(request),
            AuthDecision::ClientInactive => Err(CredentialError::NotFound(format!(
                "Client {}",
                request.client_id
            ))),
        }
    }

    /// Deny a pending request. Settled requests are returned unchanged.
    #[instrument(skip(self))]
    pub async fn deny(&self, id: &str) -> Result<AuthRequest> {
        match self.db.deny_auth_request(id).await? {
            AuthDecision::Decided(request) => {
                info!(client_id = %request.client_id, "Auth request denied");
                Ok(request)
            }
            AuthDecision::Unchanged(request) => Ok(request),
            AuthDecision::ClientInactive => {
                Err(CredentialError::NotFound(format!("Auth request {id}")))
            }
        }
    }
}
