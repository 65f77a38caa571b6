//! API integration tests for keygate-server.
//!
//! These tests drive complete WebAuthn ceremonies through the HTTP endpoints
//! with a software authenticator standing in for the browser.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use keygate_core::{AuthenticationOptions, RegistrationOptions, SoftAuthenticator};
use keygate_server::{build_state, create_router, create_router_with_state, Config, StorageBackend};
use serde_json::{json, Value};
use tower::ServiceExt;

const RP_ID: &str = "localhost";
const ORIGIN: &str = "http://localhost:10001";

/// Build the test router using the library's create_router function
async fn create_test_app() -> Router {
    create_router().await.unwrap()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, "POST", uri, Some(body)).await
}

/// Run a full registration for `user_id`.
async fn register(app: &Router, user_id: &str, authenticator: &mut SoftAuthenticator) -> Value {
    let (status, options) = post(app, "/webauthn/register/start", json!({ "userId": user_id })).await;
    assert_eq!(status, StatusCode::OK, "{options}");
    let options: RegistrationOptions = serde_json::from_value(options).unwrap();

    let response = authenticator.register(&options).unwrap();
    let (status, outcome) = post(
        app,
        "/webauthn/register/finish",
        json!({ "userId": user_id, "response": response }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    outcome
}

async fn start_authentication(app: &Router, user_id: &str) -> AuthenticationOptions {
    let (status, options) =
        post(app, "/webauthn/authenticate/start", json!({ "userId": user_id })).await;
    assert_eq!(status, StatusCode::OK, "{options}");
    serde_json::from_value(options).unwrap()
}

// ============================================================================
// Health Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = create_test_app().await;

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "keygate-server");
    assert_eq!(json["storage"], "memory");
    assert!(json["version"].is_string());
}

// ============================================================================
// Ceremony Flow Tests
// ============================================================================

#[tokio::test]
async fn test_register_then_authenticate() {
    let app = create_test_app().await;
    let mut authenticator = SoftAuthenticator::es256(RP_ID, ORIGIN);

    let outcome = register(&app, "1234", &mut authenticator).await;
    assert_eq!(outcome["verified"], true);
    assert_eq!(outcome["authenticator"]["algorithm"], "ES256");
    assert_eq!(outcome["authenticator"]["signCounter"], 0);

    for expected in 1..=2u32 {
        let options = start_authentication(&app, "1234").await;
        assert_eq!(options.rp_id, RP_ID);
        assert_eq!(options.allow_credentials.len(), 1);
        assert_eq!(options.allow_credentials[0].id, authenticator.credential_id());

        let response = authenticator.authenticate(&options);
        let (status, outcome) = post(
            &app,
            "/webauthn/authenticate/finish",
            json!({ "userId": "1234", "response": response }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{outcome}");
        assert_eq!(outcome["verified"], true);
        assert_eq!(outcome["newCounter"], expected);
    }
}

#[tokio::test]
async fn test_registration_options_shape() {
    let app = create_test_app().await;

    let (status, options) = post(&app, "/webauthn/register/start", json!({ "userId": "2345" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(options["rp"]["id"], RP_ID);
    assert_eq!(options["user"]["name"], "Test2");
    assert_eq!(options["attestation"], "none");
    assert_eq!(options["authenticatorSelection"]["userVerification"], "preferred");
    assert_eq!(options["pubKeyCredParams"][0]["alg"], -7);
    assert!(options["challenge"].is_string());
    assert!(options["excludeCredentials"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_second_registration_excludes_first_credential() {
    let app = create_test_app().await;
    let mut first = SoftAuthenticator::es256(RP_ID, ORIGIN);
    register(&app, "1234", &mut first).await;

    let (status, options) = post(&app, "/webauthn/register/start", json!({ "userId": "1234" })).await;
    assert_eq!(status, StatusCode::OK);
    let options: RegistrationOptions = serde_json::from_value(options).unwrap();
    assert_eq!(options.exclude_credentials.len(), 1);
    assert_eq!(options.exclude_credentials[0].id, first.credential_id());

    let mut second = SoftAuthenticator::eddsa(RP_ID, ORIGIN);
    let response = second.register(&options).unwrap();
    let (status, outcome) = post(
        &app,
        "/webauthn/register/finish",
        json!({ "userId": "1234", "response": response }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["authenticator"]["algorithm"], "EdDSA");

    let options = start_authentication(&app, "1234").await;
    assert_eq!(options.allow_credentials.len(), 2);
}

// ============================================================================
// Rejection Mapping Tests
// ============================================================================

#[tokio::test]
async fn test_unknown_user_returns_404() {
    let app = create_test_app().await;

    let (status, json) = post(&app, "/webauthn/register/start", json!({ "userId": "9999" })).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "USER_NOT_FOUND");
    assert_eq!(json["verified"], false);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_finish_without_start_returns_missing_challenge() {
    let app = create_test_app().await;
    let authenticator = SoftAuthenticator::es256(RP_ID, ORIGIN);
    let response = authenticator.attest(&[7u8; 32]).unwrap();

    let (status, json) = post(
        &app,
        "/webauthn/register/finish",
        json!({ "userId": "1234", "response": response }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "MISSING_CHALLENGE");
    assert_eq!(json["verified"], false);
}

#[tokio::test]
async fn test_replayed_registration_is_rejected() {
    let app = create_test_app().await;
    let mut authenticator = SoftAuthenticator::es256(RP_ID, ORIGIN);

    let (_, options) = post(&app, "/webauthn/register/start", json!({ "userId": "1234" })).await;
    let options: RegistrationOptions = serde_json::from_value(options).unwrap();
    let body = json!({ "userId": "1234", "response": authenticator.register(&options).unwrap() });

    let (status, _) = post(&app, "/webauthn/register/finish", body.clone()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = post(&app, "/webauthn/register/finish", body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "MISSING_CHALLENGE");
}

#[tokio::test]
async fn test_wrong_origin_returns_400() {
    let app = create_test_app().await;
    let mut authenticator = SoftAuthenticator::es256(RP_ID, "http://localhost:9999");

    let (_, options) = post(&app, "/webauthn/register/start", json!({ "userId": "1234" })).await;
    let options: RegistrationOptions = serde_json::from_value(options).unwrap();
    let response = authenticator.register(&options).unwrap();

    let (status, json) = post(
        &app,
        "/webauthn/register/finish",
        json!({ "userId": "1234", "response": response }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "ORIGIN_MISMATCH");
    // The configured origin stays server-side
    assert!(!json["error"].as_str().unwrap().contains("10001"));
}

#[tokio::test]
async fn test_tampered_signature_returns_401() {
    let app = create_test_app().await;
    let mut authenticator = SoftAuthenticator::es256(RP_ID, ORIGIN);
    register(&app, "1234", &mut authenticator).await;

    let options = start_authentication(&app, "1234").await;
    let mut response = authenticator.authenticate(&options);
    if let Some(last) = response.response.signature.last_mut() {
        *last ^= 0x01;
    }

    let (status, json) = post(
        &app,
        "/webauthn/authenticate/finish",
        json!({ "userId": "1234", "response": response }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "SIGNATURE_INVALID");
    assert_eq!(json["verified"], false);
}

#[tokio::test]
async fn test_cloned_authenticator_returns_401() {
    let app = create_test_app().await;
    let mut authenticator = SoftAuthenticator::es256(RP_ID, ORIGIN);
    register(&app, "1234", &mut authenticator).await;

    let options = start_authentication(&app, "1234").await;
    let response = authenticator.authenticate(&options);
    let (status, _) = post(
        &app,
        "/webauthn/authenticate/finish",
        json!({ "userId": "1234", "response": response }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // A clone replays from an older counter value
    authenticator.set_counter(0);
    let options = start_authentication(&app, "1234").await;
    let response = authenticator.authenticate(&options);
    let (status, json) = post(
        &app,
        "/webauthn/authenticate/finish",
        json!({ "userId": "1234", "response": response }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "STALE_COUNTER");
}

#[tokio::test]
async fn test_authenticate_without_credentials_returns_404() {
    let app = create_test_app().await;

    let (status, json) =
        post(&app, "/webauthn/authenticate/start", json!({ "userId": "2345" })).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NO_CREDENTIALS");
}

// ============================================================================
// Request Validation Tests
// ============================================================================

#[tokio::test]
async fn test_malformed_json_returns_400() {
    let app = create_test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/webauthn/register/start")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_invalid_user_id_returns_400() {
    let app = create_test_app().await;

    let (status, json) = post(&app, "/webauthn/register/start", json!({ "userId": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_INPUT");

    let (status, _) = post(
        &app,
        "/webauthn/authenticate/start",
        json!({ "userId": "a b" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let app = create_test_app().await;
    let padding = "x".repeat(128 * 1024);

    let (status, _) = post(
        &app,
        "/webauthn/register/start",
        json!({ "userId": "1234", "padding": padding }),
    )
    .await;

    assert!(status.is_client_error());
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[tokio::test]
async fn test_custom_seed_users() {
    let config = Config {
        seed_users: vec![("alice".to_string(), "Alice".to_string())],
        ..Config::default()
    };
    let state = build_state(&config, StorageBackend::in_memory()).await.unwrap();
    let app = create_router_with_state(&config, state);

    let (status, options) =
        post(&app, "/webauthn/register/start", json!({ "userId": "alice" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(options["user"]["name"], "Alice");

    let (status, _) = post(&app, "/webauthn/register/start", json!({ "userId": "1234" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_required_user_verification() {
    let config = Config {
        require_user_verification: true,
        ..Config::default()
    };
    let state = build_state(&config, StorageBackend::in_memory()).await.unwrap();
    let app = create_router_with_state(&config, state);
    let mut authenticator =
        SoftAuthenticator::es256(RP_ID, ORIGIN).with_user_verification(false);

    let (_, options) = post(&app, "/webauthn/register/start", json!({ "userId": "1234" })).await;
    assert_eq!(options["authenticatorSelection"]["userVerification"], "required");
    let options: RegistrationOptions = serde_json::from_value(options).unwrap();

    let (status, json) = post(
        &app,
        "/webauthn/register/finish",
        json!({ "userId": "1234", "response": authenticator.register(&options).unwrap() }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "USER_NOT_VERIFIED");
}
