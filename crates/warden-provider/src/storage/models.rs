//! Data models for Warden provider storage.

use serde::{Deserialize, Serialize};
use warden_core::{Identity, ScopeSet, db::unix_timestamp};

/// A registered application.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    pub id: String,
    /// Short public identifier presented by the client.
    pub client_key: String,
    pub secret: String,
    pub display_name: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub redirect_uri: Option<String>,
    pub notes: String,
    pub scope: ScopeSet,
    pub created_at: i64,
    pub revoked_at: Option<i64>,
    pub tokens_granted: i64,
    pub tokens_revoked: i64,
}

impl Client {
    pub const fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// What the client asked the authorization endpoint to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Authorization code flow.
    Code,
    /// Implicit flow: the token is issued directly.
    Token,
}

impl std::str::FromStr for ResponseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(Self::Code),
            "token" => Ok(Self::Token),
            other => Err(format!("unsupported response type: {other}")),
        }
    }
}

/// Where an authorization request stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthRequestState {
    Pending,
    Granted,
    Denied,
    Revoked,
}

/// Pending authorization flow awaiting the resource owner's decision.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuthRequest {
    pub id: String,
    pub client_id: String,
    pub scope: ScopeSet,
    pub redirect_uri: Option<String>,
    pub response_type: ResponseType,
    pub state: Option<String>,
    pub grant_code: Option<String>,
    pub access_token: Option<String>,
    pub created_at: i64,
    pub authorized_at: Option<i64>,
    pub revoked_at: Option<i64>,
}

impl AuthRequest {
    pub const fn state(&self) -> AuthRequestState {
        if self.revoked_at.is_some() {
            AuthRequestState::Revoked
        } else if self.authorized_at.is_none() {
            AuthRequestState::Pending
        } else if self.grant_code.is_some() || self.access_token.is_some() {
            AuthRequestState::Granted
        } else {
            AuthRequestState::Denied
        }
    }
}

/// Single-use authorization code.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessGrant {
    pub code: String,
    pub identity: Identity,
    pub client_id: String,
    pub scope: ScopeSet,
    pub redirect_uri: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
    pub granted_at: Option<i64>,
    pub access_token: Option<String>,
    pub revoked_at: Option<i64>,
}

impl AccessGrant {
    pub const fn is_redeemed(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp()
    }
}

/// Bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessToken {
    pub token: String,
    pub identity: Option<Identity>,
    pub client_id: String,
    pub scope: ScopeSet,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub revoked_at: Option<i64>,
    pub last_access_at: Option<i64>,
    pub prev_access_at: Option<i64>,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= unix_timestamp())
    }

    /// Not revoked and not expired.
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none() && !self.is_expired()
    }
}

/// Token issuance and revocation for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DailyTokenStats {
    /// Days since the Unix epoch.
    pub day: i64,
    pub granted: i64,
    pub revoked: i64,
}
