#![allow(clippy::unwrap_used)]
// Integration tests for `ApiClient` using wiremock.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use zaplink_api::{ApiClient, ApiConfig, ApiError, Credentials, RateLimiter, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

fn test_config(server: &MockServer, retries: u32) -> ApiConfig {
    ApiConfig {
        base_url: Url::parse(&format!("{}/api/", server.uri())).unwrap(),
        token_url: Url::parse(&format!("{}/oauth/token", server.uri())).unwrap(),
        retries,
        retry_initial_delay: Duration::from_millis(1),
        retry_factor: 1.5,
        retry_jitter: 0.0,
        retry_max_delay: Duration::from_millis(20),
    }
}

fn setup_with_retries(server: &MockServer, retries: u32) -> ApiClient {
    let limiter = Arc::new(RateLimiter::new(100, Duration::from_secs(1)));
    ApiClient::new(
        Credentials::new("user@example.com", SecretString::from("hunter2".to_owned())),
        limiter,
        &TransportConfig::default(),
        test_config(server, retries),
    )
    .unwrap()
}

fn setup(server: &MockServer) -> ApiClient {
    setup_with_retries(server, 5)
}

async fn mount_token_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-123",
            "token_type": "Bearer",
            "expires_in": 86400,
        })))
        .mount(server)
        .await;
}

// ── Authentication tests ────────────────────────────────────────────

#[tokio::test]
async fn test_login_success() {
    let server = MockServer::start().await;
    mount_token_ok(&server).await;

    let client = setup(&server);
    client.login().await.unwrap();
}

#[tokio::test]
async fn test_login_sends_password_grant() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=user%40example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-123",
        })))
        .expect(1)
        .mount(&server)
        .await;

    setup(&server).login().await.unwrap();
}

#[tokio::test]
async fn test_login_bad_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "The username or password is incorrect",
        })))
        .mount(&server)
        .await;

    let result = setup(&server).login().await;
    match result {
        Err(ApiError::Authentication { ref message }) => {
            assert!(message.contains("incorrect"), "got: {message}");
        }
        other => panic!("expected Authentication error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_expired_token_triggers_single_reauth() {
    let server = MockServer::start().await;
    mount_token_ok(&server).await;

    // First state fetch is rejected, the replay after re-auth succeeds.
    Mock::given(method("GET"))
        .and(path("/api/chargers/chg1/state"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/chargers/chg1/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "StateId": 710, "ValueAsString": "3" }
        ])))
        .mount(&server)
        .await;

    let client = setup(&server);
    let state = client.charger_state("chg1").await.unwrap();
    assert_eq!(state.len(), 1);
    assert_eq!(state[0].state_id, 710);
}

#[tokio::test]
async fn test_second_401_is_fatal() {
    let server = MockServer::start().await;
    mount_token_ok(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/chargers"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = setup(&server).chargers().await;
    assert!(
        matches!(result, Err(ApiError::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

// ── Retry policy tests ──────────────────────────────────────────────

#[tokio::test]
async fn test_get_500_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/chargers"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/chargers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Data": [], "Pages": 0
        })))
        .mount(&server)
        .await;

    let chargers = setup(&server).chargers().await.unwrap();
    assert!(chargers.data.is_empty());
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_get_500_exhausts_attempt_budget() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/chargers"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = setup_with_retries(&server, 3).chargers().await;
    match result {
        Err(ApiError::RequestFailed { status: 500, .. }) => {}
        other => panic!("expected RequestFailed 500, got: {other:?}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_post_500_is_never_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chargers/chg1/SendCommand/507"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let result = setup(&server).send_command("chg1", 507).await;
    match result {
        Err(ApiError::RequestFailed {
            method: "POST",
            status: 500,
            ..
        }) => {}
        other => panic!("expected RequestFailed 500, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_429_retries_then_surfaces_rate_limited() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/installation"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let result = setup_with_retries(&server, 3).installations().await;
    match result {
        Err(ApiError::RateLimited { attempts: 3 }) => {}
        other => panic!("expected RateLimited after 3 attempts, got: {other:?}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_429_recovers_when_ceiling_clears() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/installation"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/installation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Data": [{
                "Id": "inst1",
                "Active": true,
                "AuthenticationType": 0,
                "CurrentUserRoles": 1,
                "InstallationType": 0,
                "NetworkType": 4,
                "Name": "Home"
            }],
            "Pages": 1
        })))
        .mount(&server)
        .await;

    let installations = setup(&server).installations().await.unwrap();
    assert_eq!(installations.data.len(), 1);
    assert_eq!(installations.data[0].id, "inst1");
}

// ── Validation tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_malformed_response_is_validation_error() {
    let server = MockServer::start().await;

    // Paged envelope without the required `Pages` field.
    Mock::given(method("GET"))
        .and(path("/api/chargers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let result = setup(&server).chargers().await;
    match result {
        Err(ApiError::Validation { ref message, .. }) => {
            assert!(message.contains("chargers"), "got: {message}");
        }
        other => panic!("expected Validation error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_extra_fields_pass_through() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/chargers/chg1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Id": "chg1",
            "Name": "Garage",
            "Active": true,
            "DeviceType": 4,
            "SomeFutureField": "hello",
        })))
        .mount(&server)
        .await;

    let charger = setup(&server).charger("chg1").await.unwrap();
    assert_eq!(charger.extra.get("SomeFutureField").unwrap(), "hello");
}
