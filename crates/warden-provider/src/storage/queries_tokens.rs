//! Access token queries for the Warden provider.

use std::collections::BTreeMap;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use warden_core::db::unix_timestamp;
use warden_core::{Identity, ScopeSet};

use super::db::ProviderDatabase;
use super::models::{AccessToken, DailyTokenStats};
use warden_core::db::DatabaseError;

const SECS_PER_DAY: i64 = 86_400;

/// Longest window, in days, a reporting query will cover.
pub const MAX_REPORT_DAYS: i64 = 36_500;

/// Parameters for issuing an access token.
pub struct NewToken<'a> {
    pub token: &'a str,
    pub identity: Option<&'a Identity>,
    pub client_id: &'a str,
    pub scope: &'a ScopeSet,
    pub expires_at: Option<i64>,
}

/// Outcome of a get-or-create.
#[derive(Debug, Clone)]
pub enum Issued {
    /// An active token for the same identity, client and scope already existed.
    Reused(AccessToken),
    Created(AccessToken),
}

impl Issued {
    pub fn into_token(self) -> AccessToken {
        match self {
            Self::Reused(token) | Self::Created(token) => token,
        }
    }

    pub const fn token(&self) -> &AccessToken {
        match self {
            Self::Reused(token) | Self::Created(token) => token,
        }
    }
}

/// Reporting filter for [`ProviderDatabase::count_tokens`].
#[derive(Debug, Clone, Default)]
pub struct TokenFilter {
    /// Only tokens created within the last `days` days.
    pub days: Option<i64>,
    /// `Some(true)`: revoked only. `Some(false)`: non-revoked only.
    pub revoked: Option<bool>,
    pub client_id: Option<String>,
}

// =========================================================================
// Transaction building blocks
// =========================================================================

/// Take the write lock and confirm the client exists and is not revoked.
///
/// A no-op UPDATE is used instead of a SELECT so the enclosing transaction
/// becomes a writer before it reads anything.
pub(super) async fn lock_active_client(
    conn: &mut SqliteConnection,
    client_id: &str,
) -> Result<bool, DatabaseError> {
    let result = sqlx::query(
        "UPDATE clients SET tokens_granted = tokens_granted WHERE id = ? AND revoked_at IS NULL",
    )
    .bind(client_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn find_active_token_in(
    conn: &mut SqliteConnection,
    identity: &Identity,
    client_id: &str,
    scope: &ScopeSet,
    now: i64,
) -> Result<Option<AccessToken>, DatabaseError> {
    let token = sqlx::query_as::<_, AccessToken>(
        "SELECT * FROM access_tokens WHERE identity = ? AND client_id = ? AND scope = ? AND revoked_at IS NULL AND (expires_at IS NULL OR expires_at > ?) ORDER BY created_at ASC LIMIT 1",
    )
    .bind(identity)
    .bind(client_id)
    .bind(scope)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(token)
}

/// Insert the token and bump the client's `tokens_granted` in the caller's
/// transaction.
async fn insert_token_in(
    conn: &mut SqliteConnection,
    params: &NewToken<'_>,
    now: i64,
) -> Result<AccessToken, DatabaseError> {
    sqlx::query(
        "INSERT INTO access_tokens (token, identity, client_id, scope, created_at, expires_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(params.token)
    .bind(params.identity)
    .bind(params.client_id)
    .bind(params.scope)
    .bind(now)
    .bind(params.expires_at)
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE clients SET tokens_granted = tokens_granted + 1 WHERE id = ?")
        .bind(params.client_id)
        .execute(&mut *conn)
        .await?;

    Ok(AccessToken {
        token: params.token.to_string(),
        identity: params.identity.cloned(),
        client_id: params.client_id.to_string(),
        scope: params.scope.clone(),
        created_at: now,
        expires_at: params.expires_at,
        revoked_at: None,
        last_access_at: None,
        prev_access_at: None,
    })
}

/// Reuse an active matching token or insert a new one.
///
/// Returns `None` when the client is missing or revoked.
pub(super) async fn get_or_insert_token_in(
    conn: &mut SqliteConnection,
    params: &NewToken<'_>,
    now: i64,
) -> Result<Option<Issued>, DatabaseError> {
    if !lock_active_client(conn, params.client_id).await? {
        return Ok(None);
    }

    if let Some(identity) = params.identity {
        if let Some(existing) =
            find_active_token_in(conn, identity, params.client_id, params.scope, now).await?
        {
            return Ok(Some(Issued::Reused(existing)));
        }
    }

    let token = insert_token_in(conn, params, now).await?;
    Ok(Some(Issued::Created(token)))
}

impl ProviderDatabase {
    // =========================================================================
    // Issuance
    // =========================================================================

    /// Create a token and count it against the client, atomically.
    ///
    /// Returns `None` when the client is missing or revoked; nothing is
    /// written in that case.
    pub async fn create_token(
        &self,
        params: &NewToken<'_>,
    ) -> Result<Option<AccessToken>, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        if !lock_active_client(&mut tx, params.client_id).await? {
            tx.rollback().await?;
            return Ok(None);
        }
        let token = insert_token_in(&mut tx, params, now).await?;

        tx.commit().await?;
        Ok(Some(token))
    }

    /// Return the oldest active token for (identity, client, scope), or
    /// create one.
    pub async fn get_or_create_token(
        &self,
        params: &NewToken<'_>,
    ) -> Result<Option<Issued>, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        let Some(issued) = get_or_insert_token_in(&mut tx, params, now).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        tx.commit().await?;
        Ok(Some(issued))
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Get a token by value, revoked or not.
    pub async fn get_token(&self, token: &str) -> Result<Option<AccessToken>, DatabaseError> {
        let token = sqlx::query_as::<_, AccessToken>("SELECT * FROM access_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(self.pool())
            .await?;

        Ok(token)
    }

    /// Get a token by value only if it is neither revoked nor expired.
    pub async fn get_active_token(
        &self,
        token: &str,
    ) -> Result<Option<AccessToken>, DatabaseError> {
        let token = sqlx::query_as::<_, AccessToken>(
            "SELECT * FROM access_tokens WHERE token = ? AND revoked_at IS NULL AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(token)
        .bind(unix_timestamp())
        .fetch_optional(self.pool())
        .await?;

        Ok(token)
    }

    /// All tokens issued to an identity, newest first.
    pub async fn list_identity_tokens(
        &self,
        identity: &Identity,
        active_only: bool,
    ) -> Result<Vec<AccessToken>, DatabaseError> {
        let tokens = if active_only {
            sqlx::query_as::<_, AccessToken>(
                "SELECT * FROM access_tokens WHERE identity = ? AND revoked_at IS NULL AND (expires_at IS NULL OR expires_at > ?) ORDER BY created_at DESC",
            )
            .bind(identity)
            .bind(unix_timestamp())
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as::<_, AccessToken>(
                "SELECT * FROM access_tokens WHERE identity = ? ORDER BY created_at DESC",
            )
            .bind(identity)
            .fetch_all(self.pool())
            .await?
        };

        Ok(tokens)
    }

    /// Tokens for a client, oldest first.
    pub async fn list_client_tokens(
        &self,
        client_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<AccessToken>, DatabaseError> {
        let tokens = sqlx::query_as::<_, AccessToken>(
            "SELECT * FROM access_tokens WHERE client_id = ? ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?",
        )
        .bind(client_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        Ok(tokens)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Record an access at `now`.
    ///
    /// Shifts `last_access_at` into `prev_access_at` only when the previous
    /// access is strictly older. Returns whether the row changed.
    pub async fn record_token_access(&self, token: &str, now: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE access_tokens SET prev_access_at = last_access_at, last_access_at = ? WHERE token = ? AND (last_access_at IS NULL OR last_access_at < ?)",
        )
        .bind(now)
        .bind(token)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke a token and count it against its client, atomically.
    ///
    /// Returns `false` when the token does not exist or was already revoked;
    /// the counter is only bumped on the transition.
    pub async fn revoke_token(&self, token: &str) -> Result<bool, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        let client_id: Option<String> = sqlx::query_scalar(
            "UPDATE access_tokens SET revoked_at = ? WHERE token = ? AND revoked_at IS NULL RETURNING client_id",
        )
        .bind(now)
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(client_id) = client_id else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query("UPDATE clients SET tokens_revoked = tokens_revoked + 1 WHERE id = ?")
            .bind(&client_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Count tokens matching `filter`.
    pub async fn count_tokens(&self, filter: &TokenFilter) -> Result<i64, DatabaseError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM access_tokens WHERE 1 = 1");

        if let Some(days) = filter.days {
            qb.push(" AND created_at >= ");
            qb.push_bind(unix_timestamp().saturating_sub(days.saturating_mul(SECS_PER_DAY)));
        }
        if let Some(revoked) = filter.revoked {
            qb.push(if revoked {
                " AND revoked_at IS NOT NULL"
            } else {
                " AND revoked_at IS NULL"
            });
        }
        if let Some(client_id) = &filter.client_id {
            qb.push(" AND client_id = ");
            qb.push_bind(client_id.as_str());
        }

        let row: (i64,) = qb.build_query_as().fetch_one(self.pool()).await?;
        Ok(row.0)
    }

    /// Per-day granted/revoked counts for the last `days` days, oldest first.
    ///
    /// Days without activity are included with zero counts. `days` is
    /// clamped to `1..=MAX_REPORT_DAYS`.
    pub async fn token_history(
        &self,
        days: i64,
        client_id: Option<&str>,
    ) -> Result<Vec<DailyTokenStats>, DatabaseError> {
        let today = unix_timestamp().div_euclid(SECS_PER_DAY);
        let first_day = today - days.clamp(1, MAX_REPORT_DAYS) + 1;
        let since = first_day * SECS_PER_DAY;

        let granted = self.daily_counts("created_at", since, client_id).await?;
        let revoked = self.daily_counts("revoked_at", since, client_id).await?;

        let mut buckets: BTreeMap<i64, DailyTokenStats> = (first_day..=today)
            .map(|day| {
                (
                    day,
                    DailyTokenStats {
                        day,
                        granted: 0,
                        revoked: 0,
                    },
                )
            })
            .collect();
        for (day, count) in granted {
            if let Some(bucket) = buckets.get_mut(&day) {
                bucket.granted = count;
            }
        }
        for (day, count) in revoked {
            if let Some(bucket) = buckets.get_mut(&day) {
                bucket.revoked = count;
            }
        }

        Ok(buckets.into_values().collect())
    }

    async fn daily_counts(
        &self,
        column: &'static str,
        since: i64,
        client_id: Option<&str>,
    ) -> Result<Vec<(i64, i64)>, DatabaseError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {column} / {SECS_PER_DAY} AS day, COUNT(*) FROM access_tokens WHERE {column} >= "
        ));
        qb.push_bind(since);
        if let Some(client_id) = client_id {
            qb.push(" AND client_id = ");
            qb.push_bind(client_id);
        }
        qb.push(" GROUP BY day");

        let rows: Vec<(i64, i64)> = qb.build_query_as().fetch_all(self.pool()).await?;
        Ok(rows)
    }
}
