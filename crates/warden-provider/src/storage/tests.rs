//! Storage layer tests for the Warden provider.

use warden_core::db::unix_timestamp;
use warden_core::{Identity, ScopeSet};

use super::db::ProviderDatabase;
use super::models::{AuthRequestState, Client, ResponseType};
use super::queries_clients::{ClientChanges, NewClient};
use super::queries_grants::{GrantRedemption, NewGrant};
use super::queries_requests::{AuthDecision, AuthIssue, NewAuthRequest};
use super::queries_tokens::{Issued, MAX_REPORT_DAYS, NewToken, TokenFilter};
use super::DatabaseError;

async fn test_db() -> ProviderDatabase {
    ProviderDatabase::open_in_memory().await.unwrap()
}

async fn seed_client(db: &ProviderDatabase, id: &str, key: &str) -> Client {
    db.create_client(&NewClient {
        id,
        client_key: key,
        secret: "s3cret",
        display_name: Some(id),
        link: Some("https://example.com"),
        image_url: None,
        redirect_uri: Some("https://example.com/callback"),
        notes: "",
        scope: &ScopeSet::from(["read", "write"]),
    })
    .await
    .unwrap()
}

async fn issue(
    db: &ProviderDatabase,
    token: &str,
    identity: &Identity,
    client_id: &str,
    scope: &ScopeSet,
) -> Issued {
    db.get_or_create_token(&NewToken {
        token,
        identity: Some(identity),
        client_id,
        scope,
        expires_at: None,
    })
    .await
    .unwrap()
    .unwrap()
}

// === Client tests ===

#[tokio::test]
async fn create_and_get_client() {
    let db = test_db().await;
    let client = seed_client(&db, "c1", "k1").await;

    assert_eq!(client.id, "c1");
    assert_eq!(client.client_key, "k1");
    assert_eq!(client.scope, ScopeSet::from(["read", "write"]));
    assert_eq!(client.tokens_granted, 0);
    assert!(!client.is_revoked());

    let by_key = db.find_client_by_key("k1").await.unwrap().unwrap();
    assert_eq!(by_key.id, "c1");
    assert!(db.find_client("nope").await.unwrap().is_none());
    assert!(matches!(
        db.get_client("nope").await,
        Err(DatabaseError::NotFound(_))
    ));
}

#[tokio::test]
async fn duplicate_client_key_is_conflict() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;

    let err = db
        .create_client(&NewClient {
            id: "c2",
            client_key: "k1",
            secret: "other",
            display_name: None,
            link: None,
            image_url: None,
            redirect_uri: None,
            notes: "",
            scope: &ScopeSet::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Conflict(_)));
}

#[tokio::test]
async fn find_client_by_display_name_and_link() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;

    let found = db.find_client_by_display_name("c1").await.unwrap().unwrap();
    assert_eq!(found.id, "c1");
    let found = db
        .find_client_by_link("https://example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, "c1");
    assert!(db.find_client_by_display_name("zz").await.unwrap().is_none());
}

#[tokio::test]
async fn list_clients_sorted_by_display_name() {
    let db = test_db().await;
    seed_client(&db, "zeta", "k1").await;
    seed_client(&db, "Alpha", "k2").await;
    seed_client(&db, "mid", "k3").await;

    let names: Vec<_> = db
        .list_clients()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(names, ["Alpha", "mid", "zeta"]);
}

#[tokio::test]
async fn update_client_keeps_untouched_fields() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;

    let updated = db
        .update_client(
            "c1",
            &ClientChanges {
                display_name: Some("Renamed".into()),
                scope: Some(ScopeSet::from(["read"])),
                ..ClientChanges::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.display_name.as_deref(), Some("Renamed"));
    assert_eq!(updated.scope, ScopeSet::from(["read"]));
    assert_eq!(updated.link.as_deref(), Some("https://example.com"));
    assert_eq!(updated.client_key, "k1");

    assert!(matches!(
        db.update_client("nope", &ClientChanges::default()).await,
        Err(DatabaseError::NotFound(_))
    ));
}

// === Token tests ===

#[tokio::test]
async fn get_or_create_reuses_active_token() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    let alice = Identity::from("alice");
    let scope = ScopeSet::from(["read"]);

    let first = issue(&db, "t1", &alice, "c1", &scope).await;
    let second = issue(&db, "t2", &alice, "c1", &scope).await;

    assert!(matches!(first, Issued::Created(_)));
    assert!(matches!(second, Issued::Reused(_)));
    assert_eq!(second.token().token, "t1");
    assert!(db.get_token("t2").await.unwrap().is_none());
    assert_eq!(db.get_client("c1").await.unwrap().tokens_granted, 1);
}

#[tokio::test]
async fn get_or_create_distinguishes_scope_and_identity_kind() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    let read = ScopeSet::from(["read"]);

    issue(&db, "t1", &Identity::Numeric(42), "c1", &read).await;
    let text = issue(&db, "t2", &Identity::from("42"), "c1", &read).await;
    let wider = issue(
        &db,
        "t3",
        &Identity::Numeric(42),
        "c1",
        &ScopeSet::from(["read", "write"]),
    )
    .await;

    assert!(matches!(text, Issued::Created(_)));
    assert!(matches!(wider, Issued::Created(_)));
    assert_eq!(db.get_client("c1").await.unwrap().tokens_granted, 3);

    let stored = db.get_token("t1").await.unwrap().unwrap();
    assert_eq!(stored.identity, Some(Identity::Numeric(42)));
    let stored = db.get_token("t2").await.unwrap().unwrap();
    assert_eq!(stored.identity, Some(Identity::from("42")));
}

#[tokio::test]
async fn get_or_create_skips_revoked_and_expired() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    let alice = Identity::from("alice");
    let scope = ScopeSet::from(["read"]);

    db.create_token(&NewToken {
        token: "expired",
        identity: Some(&alice),
        client_id: "c1",
        scope: &scope,
        expires_at: Some(unix_timestamp() - 10),
    })
    .await
    .unwrap()
    .unwrap();
    issue(&db, "revoked", &alice, "c1", &scope).await;
    assert!(db.revoke_token("revoked").await.unwrap());

    let fresh = issue(&db, "fresh", &alice, "c1", &scope).await;
    assert!(matches!(fresh, Issued::Created(_)));
    assert!(db.get_active_token("expired").await.unwrap().is_none());
    assert!(db.get_active_token("fresh").await.unwrap().is_some());
}

#[tokio::test]
async fn tokens_for_revoked_client_are_refused() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    db.revoke_client("c1").await.unwrap();

    let scope = ScopeSet::from(["read"]);
    let params = NewToken {
        token: "t1",
        identity: None,
        client_id: "c1",
        scope: &scope,
        expires_at: None,
    };
    assert!(db.create_token(&params).await.unwrap().is_none());
    assert!(db.get_or_create_token(&params).await.unwrap().is_none());

    let missing = NewToken {
        client_id: "nope",
        ..params
    };
    assert!(db.create_token(&missing).await.unwrap().is_none());
    assert_eq!(db.get_client("c1").await.unwrap().tokens_granted, 0);
}

#[tokio::test]
async fn revoke_token_counts_once() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    issue(&db, "t1", &Identity::from("alice"), "c1", &ScopeSet::new()).await;

    assert!(db.revoke_token("t1").await.unwrap());
    let revoked_at = db.get_token("t1").await.unwrap().unwrap().revoked_at;
    assert!(revoked_at.is_some());

    assert!(!db.revoke_token("t1").await.unwrap());
    assert!(!db.revoke_token("missing").await.unwrap());

    let token = db.get_token("t1").await.unwrap().unwrap();
    assert_eq!(token.revoked_at, revoked_at);
    assert_eq!(db.get_client("c1").await.unwrap().tokens_revoked, 1);
}

#[tokio::test]
async fn record_access_shifts_previous_timestamp() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    issue(&db, "t1", &Identity::from("alice"), "c1", &ScopeSet::new()).await;

    assert!(db.record_token_access("t1", 1_000).await.unwrap());
    assert!(db.record_token_access("t1", 2_000).await.unwrap());
    // Same second: no change.
    assert!(!db.record_token_access("t1", 2_000).await.unwrap());
    // Older than the last access: no change.
    assert!(!db.record_token_access("t1", 1_500).await.unwrap());

    let token = db.get_token("t1").await.unwrap().unwrap();
    assert_eq!(token.last_access_at, Some(2_000));
    assert_eq!(token.prev_access_at, Some(1_000));
}

#[tokio::test]
async fn list_tokens_by_client_and_identity() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    seed_client(&db, "c2", "k2").await;
    let alice = Identity::from("alice");

    for (i, scope) in ["a", "b", "c"].into_iter().enumerate() {
        issue(&db, &format!("t{i}"), &alice, "c1", &ScopeSet::from(scope)).await;
    }
    issue(&db, "other", &alice, "c2", &ScopeSet::new()).await;
    db.revoke_token("t0").await.unwrap();

    let page: Vec<_> = db
        .list_client_tokens("c1", 1, 5)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.token)
        .collect();
    assert_eq!(page, ["t1", "t2"]);

    assert_eq!(db.list_identity_tokens(&alice, false).await.unwrap().len(), 4);
    assert_eq!(db.list_identity_tokens(&alice, true).await.unwrap().len(), 3);
    assert!(db
        .list_identity_tokens(&Identity::from("bob"), false)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn count_tokens_applies_filters() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    seed_client(&db, "c2", "k2").await;
    let scope = ScopeSet::new();

    issue(&db, "t1", &Identity::from("a"), "c1", &scope).await;
    issue(&db, "t2", &Identity::from("b"), "c1", &scope).await;
    issue(&db, "t3", &Identity::from("c"), "c2", &scope).await;
    db.revoke_token("t2").await.unwrap();

    let count = |filter: TokenFilter| {
        let db = db.clone();
        async move { db.count_tokens(&filter).await.unwrap() }
    };

    assert_eq!(count(TokenFilter::default()).await, 3);
    assert_eq!(
        count(TokenFilter {
            revoked: Some(true),
            ..TokenFilter::default()
        })
        .await,
        1
    );
    assert_eq!(
        count(TokenFilter {
            revoked: Some(false),
            ..TokenFilter::default()
        })
        .await,
        2
    );
    assert_eq!(
        count(TokenFilter {
            client_id: Some("c1".into()),
            days: Some(1),
            ..TokenFilter::default()
        })
        .await,
        2
    );
    assert_eq!(
        count(TokenFilter {
            days: Some(i64::MAX),
            ..TokenFilter::default()
        })
        .await,
        3
    );
}

#[tokio::test]
async fn token_history_fills_empty_days() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    seed_client(&db, "c2", "k2").await;
    let scope = ScopeSet::new();

    issue(&db, "t1", &Identity::from("a"), "c1", &scope).await;
    issue(&db, "t2", &Identity::from("b"), "c1", &scope).await;
    issue(&db, "t3", &Identity::from("c"), "c2", &scope).await;
    db.revoke_token("t1").await.unwrap();

    let history = db.token_history(7, None).await.unwrap();
    assert_eq!(history.len(), 7);
    assert!(history.windows(2).all(|w| w[0].day + 1 == w[1].day));
    let today = history.last().unwrap();
    assert_eq!((today.granted, today.revoked), (3, 1));
    assert!(history[..6].iter().all(|d| d.granted == 0 && d.revoked == 0));

    let scoped = db.token_history(7, Some("c2")).await.unwrap();
    let today = scoped.last().unwrap();
    assert_eq!((today.granted, today.revoked), (1, 0));

    let widest = db.token_history(i64::MAX, None).await.unwrap();
    assert_eq!(widest.len(), usize::try_from(MAX_REPORT_DAYS).unwrap());
    assert_eq!(widest.last().unwrap().granted, 3);
}

// === Grant tests ===

fn grant_params<'a>(
    code: &'a str,
    identity: &'a Identity,
    scope: &'a ScopeSet,
    expires_at: i64,
) -> NewGrant<'a> {
    NewGrant {
        code,
        identity,
        client_id: "c1",
        scope,
        redirect_uri: Some("https://example.com/callback"),
        expires_at,
    }
}

fn token_params<'a>(token: &'a str, identity: &'a Identity, scope: &'a ScopeSet) -> NewToken<'a> {
    NewToken {
        token,
        identity: Some(identity),
        client_id: "c1",
        scope,
        expires_at: None,
    }
}

#[tokio::test]
async fn redeem_grant_only_once() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    let alice = Identity::from("alice");
    let scope = ScopeSet::from(["read"]);

    let grant = db
        .create_grant(&grant_params("g1", &alice, &scope, unix_timestamp() + 300))
        .await
        .unwrap()
        .unwrap();
    assert!(!grant.is_redeemed());

    let first = db
        .redeem_grant("g1", &token_params("t1", &alice, &scope))
        .await
        .unwrap();
    let GrantRedemption::Redeemed(token) = first else {
        panic!("expected redemption, got {first:?}");
    };
    assert_eq!(token.token, "t1");

    let second = db
        .redeem_grant("g1", &token_params("t2", &alice, &scope))
        .await
        .unwrap();
    assert!(matches!(second, GrantRedemption::Spent));

    let grant = db.get_grant("g1").await.unwrap().unwrap();
    assert_eq!(grant.access_token.as_deref(), Some("t1"));
    assert!(grant.granted_at.is_some());
    assert!(db.get_token("t2").await.unwrap().is_none());
}

#[tokio::test]
async fn expired_or_revoked_grants_are_spent() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    let alice = Identity::from("alice");
    let scope = ScopeSet::new();

    db.create_grant(&grant_params("old", &alice, &scope, unix_timestamp() - 1))
        .await
        .unwrap()
        .unwrap();
    db.create_grant(&grant_params("gone", &alice, &scope, unix_timestamp() + 300))
        .await
        .unwrap()
        .unwrap();
    assert!(db.revoke_grant("gone").await.unwrap());
    assert!(!db.revoke_grant("gone").await.unwrap());

    for code in ["old", "gone", "unknown"] {
        let outcome = db
            .redeem_grant(code, &token_params("t1", &alice, &scope))
            .await
            .unwrap();
        assert!(matches!(outcome, GrantRedemption::Spent), "{code}");
    }
    assert!(db.get_token("t1").await.unwrap().is_none());
}

#[tokio::test]
async fn redeem_with_inactive_client_leaves_grant_unclaimed() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    let alice = Identity::from("alice");
    let scope = ScopeSet::new();
    db.create_grant(&grant_params("g1", &alice, &scope, unix_timestamp() + 300))
        .await
        .unwrap()
        .unwrap();

    // Point the token at a client that does not exist.
    let orphan = NewToken {
        client_id: "nope",
        ..token_params("t1", &alice, &scope)
    };
    let outcome = db.redeem_grant("g1", &orphan).await.unwrap();
    assert!(matches!(outcome, GrantRedemption::ClientInactive));

    let grant = db.get_grant("g1").await.unwrap().unwrap();
    assert!(grant.granted_at.is_none());
    assert!(grant.access_token.is_none());
}

#[tokio::test]
async fn grants_for_revoked_client_are_refused() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    db.revoke_client("c1").await.unwrap();

    let alice = Identity::from("alice");
    let scope = ScopeSet::new();
    let grant = db
        .create_grant(&grant_params("g1", &alice, &scope, unix_timestamp() + 300))
        .await
        .unwrap();
    assert!(grant.is_none());
    assert!(db.list_client_grants("c1").await.unwrap().is_empty());
}

// === Client cascade tests ===

#[tokio::test]
async fn revoke_client_cascades_to_dependents() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    seed_client(&db, "c2", "k2").await;
    let alice = Identity::from("alice");
    let scope = ScopeSet::new();

    db.create_auth_request(&NewAuthRequest {
        id: "r1",
        client_id: "c1",
        scope: &scope,
        redirect_uri: None,
        response_type: ResponseType::Code,
        state: None,
    })
    .await
    .unwrap()
    .unwrap();
    db.create_grant(&grant_params("g1", &alice, &scope, unix_timestamp() + 300))
        .await
        .unwrap()
        .unwrap();
    issue(&db, "t1", &alice, "c1", &scope).await;
    issue(&db, "t2", &Identity::from("bob"), "c1", &scope).await;
    issue(&db, "t3", &alice, "c2", &scope).await;
    db.revoke_token("t2").await.unwrap();

    let summary = db.revoke_client("c1").await.unwrap();
    assert_eq!(summary.auth_requests, 1);
    assert_eq!(summary.access_grants, 1);
    assert_eq!(summary.access_tokens, 1);

    let client = db.get_client("c1").await.unwrap();
    assert!(client.is_revoked());
    assert_eq!(client.tokens_revoked, 2);
    assert_eq!(
        db.get_auth_request("r1").await.unwrap().state(),
        AuthRequestState::Revoked
    );
    assert!(db.get_grant("g1").await.unwrap().unwrap().revoked_at.is_some());
    assert!(db.get_active_token("t1").await.unwrap().is_none());
    assert!(db.get_active_token("t3").await.unwrap().is_some());

    // A second call finds nothing left to revoke and keeps the timestamp.
    let again = db.revoke_client("c1").await.unwrap();
    assert_eq!(again, super::CascadeSummary::default());
    assert_eq!(
        db.get_client("c1").await.unwrap().revoked_at,
        client.revoked_at
    );
    assert!(matches!(
        db.revoke_client("nope").await,
        Err(DatabaseError::NotFound(_))
    ));
}

#[tokio::test]
async fn delete_client_removes_dependents() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    let alice = Identity::from("alice");
    let scope = ScopeSet::new();
    db.create_grant(&grant_params("g1", &alice, &scope, unix_timestamp() + 300))
        .await
        .unwrap()
        .unwrap();
    db.redeem_grant("g1", &token_params("t1", &alice, &scope))
        .await
        .unwrap();

    assert!(db.delete_client("c1").await.unwrap());
    assert!(db.find_client("c1").await.unwrap().is_none());
    assert!(db.get_grant("g1").await.unwrap().is_none());
    assert!(db.get_token("t1").await.unwrap().is_none());
    assert!(!db.delete_client("c1").await.unwrap());
}

// === Auth request tests ===

async fn seed_request(db: &ProviderDatabase, id: &str, response_type: ResponseType) {
    db.create_auth_request(&NewAuthRequest {
        id,
        client_id: "c1",
        scope: &ScopeSet::from(["read"]),
        redirect_uri: Some("https://example.com/callback"),
        response_type,
        state: Some("xyz"),
    })
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test]
async fn create_auth_request_requires_active_client() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    db.revoke_client("c1").await.unwrap();

    let request = NewAuthRequest {
        id: "r1",
        client_id: "c1",
        scope: &ScopeSet::new(),
        redirect_uri: None,
        response_type: ResponseType::Code,
        state: None,
    };
    assert!(db.create_auth_request(&request).await.unwrap().is_none());
    assert!(db.find_auth_request("r1").await.unwrap().is_none());

    let orphan = NewAuthRequest {
        client_id: "missing",
        ..request
    };
    assert!(db.create_auth_request(&orphan).await.unwrap().is_none());
}

#[tokio::test]
async fn grant_code_request_issues_grant() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    seed_request(&db, "r1", ResponseType::Code).await;
    assert_eq!(
        db.get_auth_request("r1").await.unwrap().state(),
        AuthRequestState::Pending
    );

    let alice = Identity::from("alice");
    let scope = ScopeSet::from(["read"]);
    let issue = AuthIssue::Code(grant_params("g1", &alice, &scope, unix_timestamp() + 300));
    let decision = db.grant_auth_request("r1", &issue).await.unwrap();

    let AuthDecision::Decided(request) = decision else {
        panic!("expected a decision, got {decision:?}");
    };
    assert_eq!(request.state(), AuthRequestState::Granted);
    assert_eq!(request.grant_code.as_deref(), Some("g1"));
    assert!(request.access_token.is_none());
    assert_eq!(request.state.as_deref(), Some("xyz"));
    assert!(db.get_grant("g1").await.unwrap().is_some());
}

#[tokio::test]
async fn grant_token_request_issues_token() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    seed_request(&db, "r1", ResponseType::Token).await;

    let alice = Identity::from("alice");
    let scope = ScopeSet::from(["read"]);
    let issue = AuthIssue::Token(token_params("t1", &alice, &scope));
    let decision = db.grant_auth_request("r1", &issue).await.unwrap();

    let AuthDecision::Decided(request) = decision else {
        panic!("expected a decision, got {decision:?}");
    };
    assert_eq!(request.access_token.as_deref(), Some("t1"));
    assert!(request.grant_code.is_none());
    assert_eq!(db.get_client("c1").await.unwrap().tokens_granted, 1);
}

#[tokio::test]
async fn decided_request_is_unchanged() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    seed_request(&db, "r1", ResponseType::Code).await;

    let denied = db.deny_auth_request("r1").await.unwrap();
    let AuthDecision::Decided(request) = denied else {
        panic!("expected a decision, got {denied:?}");
    };
    assert_eq!(request.state(), AuthRequestState::Denied);

    let alice = Identity::from("alice");
    let scope = ScopeSet::new();
    let issue = AuthIssue::Code(grant_params("g1", &alice, &scope, unix_timestamp() + 300));
    let again = db.grant_auth_request("r1", &issue).await.unwrap();
    let AuthDecision::Unchanged(request) = again else {
        panic!("expected no change, got {again:?}");
    };
    assert_eq!(request.state(), AuthRequestState::Denied);
    assert!(db.get_grant("g1").await.unwrap().is_none());

    assert!(matches!(
        db.deny_auth_request("r1").await.unwrap(),
        AuthDecision::Unchanged(_)
    ));
    assert!(matches!(
        db.deny_auth_request("nope").await,
        Err(DatabaseError::NotFound(_))
    ));
}

#[tokio::test]
async fn grant_with_inactive_client_keeps_request_pending() {
    let db = test_db().await;
    seed_client(&db, "c1", "k1").await;
    seed_request(&db, "r1", ResponseType::Token).await;

    let alice = Identity::from("alice");
    let scope = ScopeSet::new();
    let orphan = NewToken {
        client_id: "nope",
        ..token_params("t1", &alice, &scope)
    };
    let decision = db
        .grant_auth_request("r1", &AuthIssue::Token(orphan))
        .await
        .unwrap();
    assert!(matches!(decision, AuthDecision::ClientInactive));
    assert_eq!(
        db.get_auth_request("r1").await.unwrap().state(),
        AuthRequestState::Pending
    );
    assert_eq!(db.list_client_auth_requests("c1").await.unwrap().len(), 1);
}
