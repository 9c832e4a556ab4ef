//! Authorization request queries for the Warden provider.

use warden_core::ScopeSet;
use warden_core::db::{DatabaseError, unix_timestamp};

use super::db::ProviderDatabase;
use super::models::{AuthRequest, ResponseType};
use super::queries_grants::{NewGrant, insert_grant_in};
use super::queries_tokens::{NewToken, get_or_insert_token_in};

/// Parameters for recording an authorization request.
pub struct NewAuthRequest<'a> {
    pub id: &'a str,
    pub client_id: &'a str,
    pub scope: &'a ScopeSet,
    pub redirect_uri: Option<&'a str>,
    pub response_type: ResponseType,
    pub state: Option<&'a str>,
}

/// Credential to issue when a request is granted.
pub enum AuthIssue<'a> {
    Code(NewGrant<'a>),
    Token(NewToken<'a>),
}

/// Outcome of a grant/deny decision.
#[derive(Debug, Clone)]
pub enum AuthDecision {
    /// This call set `authorized_at`.
    Decided(AuthRequest),
    /// The request was already decided or revoked; nothing changed.
    Unchanged(AuthRequest),
    /// The owning client is missing or revoked; nothing changed.
    ClientInactive,
}

impl ProviderDatabase {
    /// Record a new authorization request.
    ///
    /// Returns `None` when the client is missing or revoked; the insert is
    /// conditional on the client row so nothing is written in that case.
    pub async fn create_auth_request(
        &self,
        params: &NewAuthRequest<'_>,
    ) -> Result<Option<AuthRequest>, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            "INSERT INTO auth_requests (id, client_id, scope, redirect_uri, response_type, state, created_at) SELECT ?, id, ?, ?, ?, ?, ? FROM clients WHERE id = ? AND revoked_at IS NULL",
        )
        .bind(params.id)
        .bind(params.scope)
        .bind(params.redirect_uri)
        .bind(params.response_type)
        .bind(params.state)
        .bind(now)
        .bind(params.client_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_auth_request(params.id).await
    }

    /// Get an authorization request by ID.
    pub async fn get_auth_request(&self, id: &str) -> Result<AuthRequest, DatabaseError> {
        self.find_auth_request(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Auth request {id}")))
    }

    /// Find an authorization request by ID.
    pub async fn find_auth_request(&self, id: &str) -> Result<Option<AuthRequest>, DatabaseError> {
        let request = sqlx::query_as::<_, AuthRequest>("SELECT * FROM auth_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(request)
    }

    /// All requests made by a client, oldest first.
    pub async fn list_client_auth_requests(
        &self,
        client_id: &str,
    ) -> Result<Vec<AuthRequest>, DatabaseError> {
        let requests = sqlx::query_as::<_, AuthRequest>(
            "SELECT * FROM auth_requests WHERE client_id = ? ORDER BY created_at ASC",
        )
        .bind(client_id)
        .fetch_all(self.pool())
        .await?;

        Ok(requests)
    }

    /// Grant a pending request and issue its credential in one transaction.
    ///
    /// `authorized_at` is claimed first with a conditional write; a request
    /// that is already decided or revoked is returned unchanged.
    pub async fn grant_auth_request(
        &self,
        id: &str,
        issue: &AuthIssue<'_>,
    ) -> Result<AuthDecision, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        let claimed = sqlx::query(
            "UPDATE auth_requests SET authorized_at = ? WHERE id = ? AND authorized_at IS NULL AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(AuthDecision::Unchanged(self.get_auth_request(id).await?));
        }

        match issue {
            AuthIssue::Code(grant) => {
                let Some(grant) = insert_grant_in(&mut tx, grant, now).await? else {
                    tx.rollback().await?;
                    return Ok(AuthDecision::ClientInactive);
                };
                sqlx::query("UPDATE auth_requests SET grant_code = ? WHERE id = ?")
                    .bind(&grant.code)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
            AuthIssue::Token(token) => {
                let Some(issued) = get_or_insert_token_in(&mut tx, token, now).await? else {
                    tx.rollback().await?;
                    return Ok(AuthDecision::ClientInactive);
                };
                sqlx::query("UPDATE auth_requests SET access_token = ? WHERE id = ?")
                    .bind(&issued.token().token)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(AuthDecision::Decided(self.get_auth_request(id).await?))
    }

    /// Deny a pending request: set `authorized_at` without a credential.
    pub async fn deny_auth_request(&self, id: &str) -> Result<AuthDecision, DatabaseError> {
        let result = sqlx::query(
            "UPDATE auth_requests SET authorized_at = ? WHERE id = ? AND authorized_at IS NULL AND revoked_at IS NULL",
        )
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        let request = self.get_auth_request(id).await?;
        if result.rows_affected() > 0 {
            Ok(AuthDecision::Decided(request))
        } else {
            Ok(AuthDecision::Unchanged(request))
        }
    }
}
