use assert_matches::assert_matches;
use reqwest::Method;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_api_client::ApiClient;
use shared_config::AppConfig;
use shared_models::error::AppError;

fn client_for(base_url: &str) -> ApiClient {
    let config = AppConfig {
        api_base_url: base_url.to_string(),
        jwt_secret: "secret".to_string(),
        request_timeout_secs: 2,
        ..AppConfig::default()
    };
    ApiClient::new(&config)
}

#[tokio::test]
async fn test_request_sends_bearer_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/appointments"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "a1"}])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let result: Vec<Value> = client
        .request(Method::GET, "/appointments", "token-123", None)
        .await
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0]["id"], "a1");
}

#[tokio::test]
async fn test_missing_token_fails_before_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let result = client
        .request::<Vec<Value>>(Method::GET, "/appointments", "  ", None)
        .await;

    assert_matches!(result, Err(AppError::Auth(_)));
}

#[tokio::test]
async fn test_status_codes_map_to_taxonomy() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/appointments/expired/status"))
        .respond_with(ResponseTemplate::new(401).set_body_string("jwt expired"))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/appointments/missing/status"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such appointment"))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/appointments/broken/status"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let body = Some(json!({"status": "CONFIRMED"}));

    let auth = client
        .execute(Method::PATCH, "/appointments/expired/status", "t", body.clone())
        .await;
    assert_matches!(auth, Err(AppError::Auth(_)));

    let not_found = client
        .execute(Method::PATCH, "/appointments/missing/status", "t", body.clone())
        .await;
    assert_matches!(not_found, Err(AppError::NotFound(_)));

    let server = client
        .execute(Method::PATCH, "/appointments/broken/status", "t", body)
        .await;
    assert_matches!(server, Err(AppError::Server(_)));
}

#[tokio::test]
async fn test_unexpected_payload_is_server_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let result = client
        .request::<Vec<Value>>(Method::GET, "/appointments", "t", None)
        .await;

    assert_matches!(result, Err(AppError::Server(_)));
}

#[tokio::test]
async fn test_unreachable_host_is_network_failure() {
    // Nothing listens on port 9 of localhost in the test environment.
    let client = client_for("http://127.0.0.1:9");
    let result = client
        .request::<Vec<Value>>(Method::GET, "/appointments", "t", None)
        .await;

    assert_matches!(result, Err(AppError::Network(_)));
}
