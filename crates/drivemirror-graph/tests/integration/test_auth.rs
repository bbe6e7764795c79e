//! Device authorization grant and refresh against a mock identity platform

use chrono::{Duration, Utc};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use drivemirror_core::{domain::AuthError, ports::IIdentityProvider, ports::PendingGrant};
use drivemirror_graph::{
    auth::{DeviceCodeConfig, GraphIdentityProvider},
    client::GraphClient,
};

const DEVICE_PATH: &str = "/common/oauth2/v2.0/devicecode";
const TOKEN_PATH: &str = "/common/oauth2/v2.0/token";

async fn setup() -> (MockServer, GraphIdentityProvider) {
    let server = MockServer::start().await;
    let config = DeviceCodeConfig::new(
        "client-123",
        format!("{}{DEVICE_PATH}", server.uri()),
        format!("{}{TOKEN_PATH}", server.uri()),
    );
    let graph = GraphClient::with_base_url(server.uri()).unwrap();
    let provider = GraphIdentityProvider::new(&config, graph).unwrap();
    (server, provider)
}

fn pending() -> PendingGrant {
    PendingGrant {
        verification_uri: "https://microsoft.com/devicelogin".into(),
        user_code: "ABCD1234".into(),
        message: None,
        device_code: "device-code-1".into(),
        interval_secs: 1,
        expires_at: Utc::now() + Duration::minutes(15),
    }
}

async fn mount_token_error(server: &MockServer, error: &str) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": error,
            "error_description": format!("{error} for test")
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_begin_device_authorization() {
    let (server, provider) = setup().await;
    Mock::given(method("POST"))
        .and(path(DEVICE_PATH))
        .and(body_string_contains("client_id=client-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "device_code": "device-code-1",
            "user_code": "ABCD1234",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 900,
            "interval": 5,
            "message": "To sign in, use a web browser to open the page https://microsoft.com/devicelogin and enter the code ABCD1234 to authenticate."
        })))
        .mount(&server)
        .await;

    let grant = provider.begin_device_authorization().await.unwrap();

    assert_eq!(grant.user_code, "ABCD1234");
    assert_eq!(grant.device_code, "device-code-1");
    assert_eq!(grant.verification_uri, "https://microsoft.com/devicelogin");
    assert_eq!(grant.interval_secs, 5);
    assert!(grant.instructions().contains("ABCD1234"));
    assert!(grant.expires_at > Utc::now() + Duration::minutes(14));
}

#[tokio::test]
async fn test_complete_device_authorization_success() {
    let (server, provider) = setup().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("device_code=device-code-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-1",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "rt-1",
            "scope": "Files.Read.All User.Read"
        })))
        .mount(&server)
        .await;

    let tokens = provider.complete_device_authorization(&pending()).await.unwrap();

    assert_eq!(tokens.access_token, "at-1");
    assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
    assert!(tokens.expires_at > Utc::now() + Duration::minutes(55));
}

#[tokio::test]
async fn test_complete_device_authorization_denied() {
    let (server, provider) = setup().await;
    mount_token_error(&server, "access_denied").await;

    let err = provider
        .complete_device_authorization(&pending())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Denied), "got {err:?}");
}

#[tokio::test]
async fn test_complete_device_authorization_expired() {
    let (server, provider) = setup().await;
    mount_token_error(&server, "expired_token").await;

    let err = provider
        .complete_device_authorization(&pending())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Expired), "got {err:?}");
}

#[tokio::test]
async fn test_refresh_returns_new_tokens() {
    let (server, provider) = setup().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-2",
            "token_type": "Bearer",
            "expires_in": 1800
        })))
        .mount(&server)
        .await;

    let tokens = provider.refresh("rt-old").await.unwrap();

    assert_eq!(tokens.access_token, "at-2");
    // No rotation in the response; the caller keeps its refresh token
    assert!(tokens.refresh_token.is_none());
    assert!(tokens.expires_at < Utc::now() + Duration::minutes(31));
}

#[tokio::test]
async fn test_refresh_invalid_grant_requires_reauth() {
    let (server, provider) = setup().await;
    mount_token_error(&server, "invalid_grant").await;

    let err = provider.refresh("revoked").await.unwrap_err();
    match err {
        AuthError::ReauthRequired(msg) => assert!(msg.contains("invalid_grant")),
        other => panic!("expected ReauthRequired, got {other:?}"),
    }
}

#[tokio::test]
async fn test_refresh_server_failure_is_transport() {
    let (server, provider) = setup().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = provider.refresh("rt").await.unwrap_err();
    assert!(matches!(err, AuthError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn test_fetch_profile_uses_graph() {
    let (server, provider) = setup().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "displayName": "Alice",
            "userPrincipalName": "alice@contoso.com",
            "id": "u-1"
        })))
        .mount(&server)
        .await;

    let profile = provider.fetch_profile("at").await.unwrap();
    assert_eq!(profile.email, "alice@contoso.com");
    assert_eq!(profile.display_name, "Alice");
}
