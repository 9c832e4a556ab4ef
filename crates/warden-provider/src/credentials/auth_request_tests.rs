//! Tests for `AuthRequestService`.

use warden_core::db::unix_timestamp;
use warden_core::{Identity, ScopeSet};

use super::ClientRegistration;
use super::test_helpers::{register_client, setup};
use crate::error::CredentialError;
use crate::storage::{AuthRequestState, ResponseType};

#[tokio::test]
async fn create_clips_scope_and_uses_registered_redirect() {
    let provider = setup().await;
    let client = register_client(&provider, "acme").await;

    let request = provider
        .auth_requests
        .create(
            &client,
            &ScopeSet::parse("read,admin"),
            Some("https://evil.example.com/steal"),
            ResponseType::Code,
            Some("opaque-state"),
        )
        .await
        .unwrap();

    assert_eq!(request.scope, ScopeSet::from(["read"]));
    assert_eq!(
        request.redirect_uri.as_deref(),
        Some("https://example.com/callback")
    );
    assert_eq!(request.state.as_deref(), Some("opaque-state"));
    assert_eq!(request.state(), AuthRequestState::Pending);
}

#[tokio::test]
async fn create_falls_back_to_supplied_redirect() {
    let provider = setup().await;
    let client = provider
        .clients
        .register(ClientRegistration {
            scope: ScopeSet::from(["read"]),
            ..ClientRegistration::default()
        })
        .await
        .unwrap();

    let request = provider
        .auth_requests
        .create(
            &client,
            &ScopeSet::new(),
            Some("https://app.example.com/cb"),
            ResponseType::Token,
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        request.redirect_uri.as_deref(),
        Some("https://app.example.com/cb")
    );

    let err = provider
        .auth_requests
        .create(&client, &ScopeSet::new(), Some("relative"), ResponseType::Token, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::Validation(_)));
}

#[tokio::test]
async fn grant_code_request_issues_redeemable_grant() {
    let provider = setup().await;
    let client = register_client(&provider, "acme").await;
    let request = provider
        .auth_requests
        .create(&client, &ScopeSet::from(["read"]), None, ResponseType::Code, None)
        .await
        .unwrap();

    let granted = provider
        .auth_requests
        .grant(&request.id, &Identity::from("alice"), None)
        .await
        .unwrap();

    assert_eq!(granted.state(), AuthRequestState::Granted);
    assert!(granted.access_token.is_none());
    let code = granted.grant_code.unwrap();
    let grant = provider.grants.from_code(&code).await.unwrap().unwrap();
    assert_eq!(grant.identity, Identity::from("alice"));
    assert_eq!(grant.scope, ScopeSet::from(["read"]));

    let token = provider.grants.authorize(&code, None).await.unwrap();
    assert_eq!(token.identity, Some(Identity::from("alice")));
}

#[tokio::test]
async fn grant_token_request_reuses_active_token() {
    let provider = setup().await;
    let client = register_client(&provider, "acme").await;
    let alice = Identity::Numeric(7);
    let existing = provider
        .tokens
        .get_or_create(&alice, &client, &ScopeSet::from(["read"]), None)
        .await
        .unwrap();

    let request = provider
        .auth_requests
        .create(&client, &ScopeSet::from(["read"]), None, ResponseType::Token, None)
        .await
        .unwrap();
    let granted = provider
        .auth_requests
        .grant(&request.id, &alice, Some(3600))
        .await
        .unwrap();

    assert_eq!(granted.access_token.as_deref(), Some(existing.token.as_str()));
    assert!(granted.grant_code.is_none());
    let client = provider.clients.find(&client.id).await.unwrap().unwrap();
    assert_eq!(client.tokens_granted, 1);
}

#[tokio::test]
async fn settled_requests_do_not_change() {
    let provider = setup().await;
    let client = register_client(&provider, "acme").await;
    let request = provider
        .auth_requests
        .create(&client, &ScopeSet::new(), None, ResponseType::Code, None)
        .await
        .unwrap();

    let denied = provider.auth_requests.deny(&request.id).await.unwrap();
    assert_eq!(denied.state(), AuthRequestState::Denied);

    let again = provider
        .auth_requests
        .grant(&request.id, &Identity::from("alice"), None)
        .await
        .unwrap();
    assert_eq!(again.state(), AuthRequestState::Denied);
    assert_eq!(again.authorized_at, denied.authorized_at);

    let denied_twice = provider.auth_requests.deny(&request.id).await.unwrap();
    assert_eq!(denied_twice.authorized_at, denied.authorized_at);
}

#[tokio::test]
async fn grant_after_client_revocation() {
    let provider = setup().await;
    let client = register_client(&provider, "acme").await;
    let request = provider
        .auth_requests
        .create(&client, &ScopeSet::new(), None, ResponseType::Code, None)
        .await
        .unwrap();

    provider.clients.revoke(&client.id).await.unwrap();

    // The cascade revoked the request, so granting it is a no-op.
    let unchanged = provider
        .auth_requests
        .grant(&request.id, &Identity::from("alice"), None)
        .await
        .unwrap();
    assert_eq!(unchanged.state(), AuthRequestState::Revoked);
    assert!(unchanged.grant_code.is_none());

    assert!(matches!(
        provider
            .auth_requests
            .create(&client, &ScopeSet::new(), None, ResponseType::Code, None)
            .await,
        Err(CredentialError::InvalidClient(_))
    ));
}

#[tokio::test]
async fn grant_validates_identity_and_request() {
    let provider = setup().await;
    let client = register_client(&provider, "acme").await;
    let request = provider
        .auth_requests
        .create(&client, &ScopeSet::new(), None, ResponseType::Code, None)
        .await
        .unwrap();

    assert!(matches!(
        provider
            .auth_requests
            .grant(&request.id, &Identity::from("  "), None)
            .await,
        Err(CredentialError::Validation(_))
    ));
    assert!(matches!(
        provider
            .auth_requests
            .grant("missing", &Identity::from("alice"), None)
            .await,
        Err(CredentialError::NotFound(_))
    ));
    assert!(provider.auth_requests.find("missing").await.unwrap().is_none());

    let pending = provider
        .auth_requests
        .find(&request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.state(), AuthRequestState::Pending);
}

#[tokio::test]
async fn code_grant_lifetime_ignores_token_expiry() {
    let provider = setup().await;
    let client = register_client(&provider, "acme").await;

    for expires_in in [Some(86_400), Some(0)] {
        let request = provider
            .auth_requests
            .create(&client, &ScopeSet::from(["read"]), None, ResponseType::Code, None)
            .await
            .unwrap();
        let before = unix_timestamp();
        let granted = provider
            .auth_requests
            .grant(&request.id, &Identity::from("alice"), expires_in)
            .await
            .unwrap();

        let code = granted.grant_code.unwrap();
        let grant = provider.grants.from_code(&code).await.unwrap().unwrap();
        assert!(grant.expires_at >= before + 300);
        assert!(grant.expires_at <= unix_timestamp() + 300);
    }
}

#[tokio::test]
async fn create_rechecks_client_in_storage() {
    let provider = setup().await;
    let client = register_client(&provider, "acme").await;
    let stale = client.clone();
    provider.clients.revoke(&client.id).await.unwrap();

    assert!(!stale.is_revoked());
    assert!(matches!(
        provider
            .auth_requests
            .create(&stale, &ScopeSet::new(), None, ResponseType::Token, None)
            .await,
        Err(CredentialError::InvalidClient(_))
    ));
}
