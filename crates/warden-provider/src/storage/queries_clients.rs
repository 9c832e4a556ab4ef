//! Client queries for the Warden provider.

use serde::Serialize;
use warden_core::ScopeSet;
use warden_core::db::{DatabaseError, unix_timestamp};

use super::db::ProviderDatabase;
use super::models::Client;

/// Parameters for registering a client.
pub struct NewClient<'a> {
    pub id: &'a str,
    pub client_key: &'a str,
    pub secret: &'a str,
    pub display_name: Option<&'a str>,
    pub link: Option<&'a str>,
    pub image_url: Option<&'a str>,
    pub redirect_uri: Option<&'a str>,
    pub notes: &'a str,
    pub scope: &'a ScopeSet,
}

/// Field changes for an existing client. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ClientChanges {
    pub display_name: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub redirect_uri: Option<String>,
    pub notes: Option<String>,
    pub scope: Option<ScopeSet>,
}

/// Dependents touched by a client revocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeSummary {
    pub auth_requests: u64,
    pub access_grants: u64,
    pub access_tokens: u64,
}

impl ProviderDatabase {
    /// Register a client. A `client_key` collision surfaces as
    /// [`DatabaseError::Conflict`].
    pub async fn create_client(&self, params: &NewClient<'_>) -> Result<Client, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO clients (id, client_key, secret, display_name, link, image_url, redirect_uri, notes, scope, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(params.id)
        .bind(params.client_key)
        .bind(params.secret)
        .bind(params.display_name)
        .bind(params.link)
        .bind(params.image_url)
        .bind(params.redirect_uri)
        .bind(params.notes)
        .bind(params.scope)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_client(params.id).await
    }

    /// Get a client by ID.
    pub async fn get_client(&self, id: &str) -> Result<Client, DatabaseError> {
        self.find_client(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Client {id}")))
    }

    /// Find a client by ID.
    pub async fn find_client(&self, id: &str) -> Result<Option<Client>, DatabaseError> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(client)
    }

    /// Find a client by its public key.
    pub async fn find_client_by_key(
        &self,
        client_key: &str,
    ) -> Result<Option<Client>, DatabaseError> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE client_key = ?")
            .bind(client_key)
            .fetch_optional(self.pool())
            .await?;

        Ok(client)
    }

    /// Find the first client with this display name.
    pub async fn find_client_by_display_name(
        &self,
        display_name: &str,
    ) -> Result<Option<Client>, DatabaseError> {
        let client = sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE display_name = ? ORDER BY created_at ASC LIMIT 1",
        )
        .bind(display_name)
        .fetch_optional(self.pool())
        .await?;

        Ok(client)
    }

    /// Find the first client with this link.
    pub async fn find_client_by_link(&self, link: &str) -> Result<Option<Client>, DatabaseError> {
        let client = sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE link = ? ORDER BY created_at ASC LIMIT 1",
        )
        .bind(link)
        .fetch_optional(self.pool())
        .await?;

        Ok(client)
    }

    /// All clients, sorted by display name.
    pub async fn list_clients(&self) -> Result<Vec<Client>, DatabaseError> {
        let clients = sqlx::query_as::<_, Client>(
            "SELECT * FROM clients ORDER BY display_name COLLATE NOCASE ASC, created_at ASC",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(clients)
    }

    /// Apply field changes to a client.
    pub async fn update_client(
        &self,
        id: &str,
        changes: &ClientChanges,
    ) -> Result<Client, DatabaseError> {
        let result = sqlx::query(
            "UPDATE clients SET display_name = COALESCE(?, display_name), link = COALESCE(?, link), image_url = COALESCE(?, image_url), redirect_uri = COALESCE(?, redirect_uri), notes = COALESCE(?, notes), scope = COALESCE(?, scope) WHERE id = ?",
        )
        .bind(changes.display_name.as_deref())
        .bind(changes.link.as_deref())
        .bind(changes.image_url.as_deref())
        .bind(changes.redirect_uri.as_deref())
        .bind(changes.notes.as_deref())
        .bind(changes.scope.as_ref())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Client {id}")));
        }

        self.get_client(id).await
    }

    /// Revoke a client and every request, grant and token it owns.
    ///
    /// The client's `revoked_at` keeps its first value. Dependents already
    /// revoked are left alone, so calling this again finishes any cascade
    /// that did not complete. Tokens revoked here count towards
    /// `tokens_revoked`.
    pub async fn revoke_client(&self, id: &str) -> Result<CascadeSummary, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        let result =
            sqlx::query("UPDATE clients SET revoked_at = COALESCE(revoked_at, ?) WHERE id = ?")
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(DatabaseError::NotFound(format!("Client {id}")));
        }

        let auth_requests = sqlx::query(
            "UPDATE auth_requests SET revoked_at = ? WHERE client_id = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let access_grants = sqlx::query(
            "UPDATE access_grants SET revoked_at = ? WHERE client_id = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let access_tokens = sqlx::query(
            "UPDATE access_tokens SET revoked_at = ? WHERE client_id = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("UPDATE clients SET tokens_revoked = tokens_revoked + ? WHERE id = ?")
            .bind(i64::try_from(access_tokens).unwrap_or(i64::MAX))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CascadeSummary {
            auth_requests,
            access_grants,
            access_tokens,
        })
    }

    /// Delete a client and everything it owns.
    pub async fn delete_client(&self, id: &str) -> Result<bool, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        for sql in [
            "DELETE FROM access_tokens WHERE client_id = ?",
            "DELETE FROM access_grants WHERE client_id = ?",
            "DELETE FROM auth_requests WHERE client_id = ?",
        ] {
            sqlx::query(sql)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        let result = sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
