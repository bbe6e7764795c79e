//! Profile lookup via GET /me

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use drivemirror_graph::{client::GraphClient, GraphError};

#[tokio::test]
async fn test_get_profile() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "displayName": "Test User",
            "mail": "test@example.com",
            "userPrincipalName": "test@example.com",
            "id": "user-test-001"
        })))
        .mount(&server)
        .await;

    let client = GraphClient::with_base_url(server.uri()).unwrap();
    let profile = client.get_profile("tok").await.expect("get_profile failed");

    assert_eq!(profile.email, "test@example.com");
    assert_eq!(profile.display_name, "Test User");
    assert_eq!(profile.remote_user_id, "user-test-001");
}

#[tokio::test]
async fn test_get_profile_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = GraphClient::with_base_url(server.uri()).unwrap();
    let err = client.get_profile("bad").await.unwrap_err();
    assert!(matches!(err, GraphError::Unauthorized(_)));
}

#[tokio::test]
async fn test_throttling_budget_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "0"))
        .expect(2)
        .mount(&server)
        .await;

    let client = GraphClient::with_base_url(server.uri())
        .unwrap()
        .with_max_retries(1);
    let err = client.get_profile("tok").await.unwrap_err();
    assert!(matches!(err, GraphError::TooManyRequests { .. }));
}
