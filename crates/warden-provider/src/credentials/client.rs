//! Client registration, lookup, authentication and revocation.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument, warn};
use warden_core::ScopeSet;
use warden_core::config::CredentialConfig;
use warden_crypto::{TokenGenerator, constant_time_str_eq};

use super::validate_redirect_uri;
use crate::error::{CredentialError, Result};
use crate::storage::{
    CascadeSummary, Client, ClientChanges, DatabaseError, NewClient, ProviderDatabase,
};

/// Administrative input for a new client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientRegistration {
    pub display_name: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: ScopeSet,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct ClientService {
    db: ProviderDatabase,
    generator: Arc<dyn TokenGenerator>,
    config: CredentialConfig,
}

impl ClientService {
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

    /// Register a client with a fresh secret and public key.
    ///
    /// A key that collides with an existing client is redrawn up to
    /// `client_key_attempts` times before giving up with a validation error.
    #[instrument(skip(self, registration), fields(display_name = ?registration.display_name))]
    pub async fn register(&self, registration: ClientRegistration) -> Result<Client> {
        let redirect_uri = registration
            .redirect_uri
            .as_deref()
            .map(validate_redirect_uri)
            .transpose()?;
        let secret = self.generator.generate(self.config.client_secret_bytes)?;
        let attempts = self.config.client_key_attempts.max(1);

        for attempt in 1..=attempts {
            let id = uuid::Uuid::new_v4().to_string();
            let client_key = self.generator.generate(self.config.client_key_bytes)?;

            let created = self
                .db
                .create_client(&NewClient {
                    id: &id,
                    client_key: &client_key,
                    secret: &secret,
                    display_name: registration.display_name.as_deref(),
                    link: registration.link.as_deref(),
                    image_url: registration.image_url.as_deref(),
                    redirect_uri: redirect_uri.as_deref(),
                    notes: registration.notes.as_deref().unwrap_or_default(),
                    scope: &registration.scope,
                })
                .await;

            match created {
                Ok(client) => {
                    info!(
                        client_id = %client.id,
                        client_key = %client.client_key,
                        scope = %client.scope,
                        "Client registered"
                    );
                    return Ok(client);
                }
                Err(DatabaseError::Conflict(_)) => {
                    warn!(attempt, "Client key already taken, drawing another");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CredentialError::Validation(format!(
            "could not draw an unused client key in {attempts} attempts"
        )))
    }

    /// Resolve a client by ID, then display name, then link.
    #[instrument(skip(self))]
    pub async fn lookup(&self, key: &str) -> Result<Option<Client>> {
        if let Some(client) = self.db.find_client(key).await? {
            return Ok(Some(client));
        }
        if let Some(client) = self.db.find_client_by_display_name(key).await? {
            return Ok(Some(client));
        }
        Ok(self.db.find_client_by_link(key).await?)
    }

    pub async fn find(&self, client_id: &str) -> Result<Option<Client>> {
        Ok(self.db.find_client(client_id).await?)
    }

    pub async fn find_by_key(&self, client_key: &str) -> Result<Option<Client>> {
        Ok(self.db.find_client_by_key(client_key).await?)
    }

    /// All clients, sorted by display name.
    pub async fn list(&self) -> Result<Vec<Client>> {
        Ok(self.db.list_clients().await?)
    }

    /// Change a client's descriptive fields, redirect URI or scope.
    ///
    /// Credentials already issued keep the scope they were issued with.
    #[instrument(skip(self, changes), fields(client_id = %client_id))]
    pub async fn update(&self, client_id: &str, mut changes: ClientChanges) -> Result<Client> {
        if let Some(uri) = changes.redirect_uri.take() {
            changes.redirect_uri = Some(validate_redirect_uri(&uri)?);
        }
        let client = self.db.update_client(client_id, &changes).await?;
        info!(client_id = %client.id, "Client updated");
        Ok(client)
    }

    /// Check a client's key and secret. The secret is compared in constant
    /// time; an unknown key and a wrong secret get the same message.
    #[instrument(skip(self, secret))]
    pub async fn authenticate(&self, client_key: &str, secret: &str) -> Result<Client> {
        let Some(client) = self.db.find_client_by_key(client_key).await? else {
            warn!("Authentication with unknown client key");
            return Err(CredentialError::InvalidClient("invalid client credentials".into()));
        };

        if !constant_time_str_eq(&client.secret, secret) {
            warn!(client_id = %client.id, "Client secret mismatch");
            return Err(CredentialError::InvalidClient("invalid client credentials".into()));
        }
        if client.is_revoked() {
            warn!(client_id = %client.id, "Authentication by revoked client");
            return Err(CredentialError::InvalidClient("client has been revoked".into()));
        }

        Ok(client)
    }

    /// Revoke a client and everything it issued.
    #[instrument(skip(self))]
    pub async fn revoke(&self, client_id: &str) -> Result<CascadeSummary> {
        let summary = self.db.revoke_client(client_id).await?;
        info!(
            client_id,
            auth_requests = summary.auth_requests,
            access_grants = summary.access_grants,
            access_tokens = summary.access_tokens,
            "Client revoked"
        );
        Ok(summary)
    }

    /// Delete a client and every record it owns.
    #[instrument(skip(self))]
    pub async fn delete(&self, client_id: &str) -> Result<()> {
        if !self.db.delete_client(client_id).await? {
            return Err(CredentialError::NotFound(format!("Client {client_id}")));
        }
        info!(client_id, "Client deleted");
        Ok(())
    }
}
