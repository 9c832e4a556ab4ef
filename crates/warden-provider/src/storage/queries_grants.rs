//! Access grant queries for the Warden provider.

use sqlx::SqliteConnection;
use warden_core::db::{DatabaseError, unix_timestamp};
use warden_core::{Identity, ScopeSet};

use super::db::ProviderDatabase;
use super::models::{AccessGrant, AccessToken};
use super::queries_tokens::{NewToken, get_or_insert_token_in, lock_active_client};

/// Parameters for issuing an access grant.
pub struct NewGrant<'a> {
    pub code: &'a str,
    pub identity: &'a Identity,
    pub client_id: &'a str,
    pub scope: &'a ScopeSet,
    pub redirect_uri: Option<&'a str>,
    pub expires_at: i64,
}

/// Outcome of a redemption attempt.
#[derive(Debug, Clone)]
pub enum GrantRedemption {
    /// This caller won the grant.
    Redeemed(AccessToken),
    /// Unknown, already redeemed, revoked or expired.
    Spent,
    /// The owning client is missing or revoked. The grant is left unclaimed.
    ClientInactive,
}

/// Insert a grant in the caller's transaction. Returns `None` if the client
/// is missing or revoked.
pub(super) async fn insert_grant_in(
    conn: &mut SqliteConnection,
    params: &NewGrant<'_>,
    now: i64,
) -> Result<Option<AccessGrant>, DatabaseError> {
    if !lock_active_client(conn, params.client_id).await? {
        return Ok(None);
    }

    sqlx::query(
        "INSERT INTO access_grants (code, identity, client_id, scope, redirect_uri, created_at, expires_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(params.code)
    .bind(params.identity)
    .bind(params.client_id)
    .bind(params.scope)
    .bind(params.redirect_uri)
    .bind(now)
    .bind(params.expires_at)
    .execute(&mut *conn)
    .await?;

    Ok(Some(AccessGrant {
        code: params.code.to_string(),
        identity: params.identity.clone(),
        client_id: params.client_id.to_string(),
        scope: params.scope.clone(),
        redirect_uri: params.redirect_uri.map(str::to_string),
        created_at: now,
        expires_at: params.expires_at,
        granted_at: None,
        access_token: None,
        revoked_at: None,
    }))
}

impl ProviderDatabase {
    /// Store a new grant. Returns `None` if the client is missing or revoked.
    pub async fn create_grant(
        &self,
        params: &NewGrant<'_>,
    ) -> Result<Option<AccessGrant>, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        let Some(grant) = insert_grant_in(&mut tx, params, now).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        tx.commit().await?;
        Ok(Some(grant))
    }

    /// Get a grant by its code.
    pub async fn get_grant(&self, code: &str) -> Result<Option<AccessGrant>, DatabaseError> {
        let grant = sqlx::query_as::<_, AccessGrant>("SELECT * FROM access_grants WHERE code = ?")
            .bind(code)
            .fetch_optional(self.pool())
            .await?;

        Ok(grant)
    }

    /// All grants issued to a client, oldest first.
    pub async fn list_client_grants(
        &self,
        client_id: &str,
    ) -> Result<Vec<AccessGrant>, DatabaseError> {
        let grants = sqlx::query_as::<_, AccessGrant>(
            "SELECT * FROM access_grants WHERE client_id = ? ORDER BY created_at ASC",
        )
        .bind(client_id)
        .fetch_all(self.pool())
        .await?;

        Ok(grants)
    }

    /// Exchange a grant for a token, at most once.
    ///
    /// The claim is a conditional UPDATE and the first statement of the
    /// transaction, so concurrent callers serialize on the write lock and
    /// every caller after the winner matches zero rows. The token is issued
    /// and recorded on the grant in the same transaction.
    pub async fn redeem_grant(
        &self,
        code: &str,
        token: &NewToken<'_>,
    ) -> Result<GrantRedemption, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        let claimed = sqlx::query(
            "UPDATE access_grants SET granted_at = ? WHERE code = ? AND access_token IS NULL AND granted_at IS NULL AND revoked_at IS NULL AND expires_at > ?",
        )
        .bind(now)
        .bind(code)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(GrantRedemption::Spent);
        }

        let Some(issued) = get_or_insert_token_in(&mut tx, token, now).await? else {
            tx.rollback().await?;
            return Ok(GrantRedemption::ClientInactive);
        };

        sqlx::query("UPDATE access_grants SET access_token = ? WHERE code = ?")
            .bind(&issued.token().token)
            .bind(code)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(GrantRedemption::Redeemed(issued.into_token()))
    }

    /// Mark a grant revoked. Returns `false` if unknown or already revoked.
    pub async fn revoke_grant(&self, code: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE access_grants SET revoked_at = ? WHERE code = ? AND revoked_at IS NULL",
        )
        .bind(unix_timestamp())
        .bind(code)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
