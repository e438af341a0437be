//! Login state machine against a mock server.

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use venmo_sweep::config::ApiVariant;
use venmo_sweep::types::{Error, ExtractionError};
use venmo_sweep::venmo::auth::{AuthState, Authenticator};

use crate::common::{client_for, csrf_page};

const CHALLENGE: &str = "Additional authentication is required";

fn secret(s: &str) -> SecretString {
    SecretString::new(s.to_string())
}

async fn mount_sign_in_page(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/account/sign-in"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "_csrf=login-cookie; Path=/; HttpOnly")
                .set_body_string(csrf_page("login-token")),
        )
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_login(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .and(header("csrf-token", "login-token"))
        .and(header("xsrf-token", "login-token"))
        .and(body_json(json!({
            "username": "alice",
            "password": "hunter2",
            "isGroup": "false"
        })))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_mfa_page(server: &MockServer, expected_hits: u64) {
    Mock::given(method("GET"))
        .and(path("/account/mfa/verify-bank"))
        .and(query_param("k", "otp-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "_csrf=mfa-cookie; Path=/; HttpOnly")
                .set_body_string(csrf_page("mfa-token")),
        )
        .expect(expected_hits)
        .mount(server)
        .await;
}

async fn mount_mfa_sign_in(server: &MockServer, response: ResponseTemplate, expected_hits: u64) {
    Mock::given(method("POST"))
        .and(path("/api/account/mfa/sign-in"))
        .and(header("csrf-token", "mfa-token"))
        .and(header("xsrf-token", "mfa-token"))
        .and(header("venmo-otp-secret", "otp-1"))
        .and(body_json(json!({"accountNumber": "000123"})))
        .respond_with(response)
        .expect(expected_hits)
        .mount(server)
        .await;
}

fn challenge() -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({"issue": CHALLENGE, "secret": "otp-1"}))
}

#[tokio::test]
async fn test_full_mfa_flow_walks_every_state() {
    let server = MockServer::start().await;
    mount_sign_in_page(&server).await;
    mount_login(&server, challenge()).await;
    mount_mfa_page(&server, 1).await;
    mount_mfa_sign_in(
        &server,
        ResponseTemplate::new(200)
            .insert_header("set-cookie", "api_access_token=fresh-token; Path=/; Secure"),
        1,
    )
    .await;

    let mut client = client_for(&server, ApiVariant::default());
    let (password, bank) = (secret("hunter2"), secret("000123"));
    let mut auth = Authenticator::new(&mut client, "alice", &password, Some(&bank));
    assert!(matches!(auth.state(), AuthState::Anonymous));

    auth.advance().await.unwrap();
    match auth.state() {
        AuthState::CredentialsSubmitted { otp } => assert_eq!(otp.secret, "otp-1"),
        other => panic!("expected CredentialsSubmitted, got {}", other.name()),
    }

    auth.advance().await.unwrap();
    match auth.state() {
        AuthState::MfaChallenged { csrf, .. } => {
            assert_eq!(csrf.cookie, "mfa-cookie");
            assert_eq!(csrf.token, "mfa-token");
        }
        other => panic!("expected MfaChallenged, got {}", other.name()),
    }

    auth.advance().await.unwrap();
    match auth.state() {
        AuthState::Confirmed(token) => assert_eq!(token.expose(), "fresh-token"),
        other => panic!("expected Confirmed, got {}", other.name()),
    }

    // Terminal states do not advance.
    let err = auth.advance().await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { state: "Confirmed", .. }));

    let requests = server.received_requests().await.unwrap();
    let confirm = requests
        .iter()
        .find(|r| r.url.path() == "/api/account/mfa/sign-in")
        .unwrap();
    let cookie = confirm.headers.get("cookie").unwrap().to_str().unwrap();
    assert!(cookie.contains("_csrf=mfa-cookie"));
    assert!(cookie.contains("v_id=fp01-integration"));
}

#[tokio::test]
async fn test_login_helper_returns_token() {
    let server = MockServer::start().await;
    mount_sign_in_page(&server).await;
    mount_login(&server, challenge()).await;
    mount_mfa_page(&server, 1).await;
    mount_mfa_sign_in(
        &server,
        ResponseTemplate::new(200).insert_header("set-cookie", "api_access_token=t-2; Path=/"),
        1,
    )
    .await;

    let mut client = client_for(&server, ApiVariant::default());
    let token = client
        .login("alice", &secret("hunter2"), Some(&secret("000123")))
        .await
        .unwrap();
    assert_eq!(token.expose(), "t-2");
}

#[tokio::test]
async fn test_otp_secret_from_header_variant() {
    let server = MockServer::start().await;
    mount_sign_in_page(&server).await;
    mount_login(
        &server,
        ResponseTemplate::new(401)
            .insert_header("venmo-otp-secret", "otp-1")
            .set_body_json(json!({"error": {"message": CHALLENGE, "code": 81109}})),
    )
    .await;
    mount_mfa_page(&server, 1).await;
    mount_mfa_sign_in(
        &server,
        ResponseTemplate::new(200).insert_header("set-cookie", "api_access_token=t-3; Path=/"),
        1,
    )
    .await;

    let variant = ApiVariant {
        challenge_status: 401,
        ..ApiVariant::default()
    };
    let mut client = client_for(&server, variant);
    let token = client
        .login("alice", &secret("hunter2"), Some(&secret("000123")))
        .await
        .unwrap();
    assert_eq!(token.expose(), "t-3");
}

#[tokio::test]
async fn test_unexpected_login_reply_never_reaches_mfa() {
    let server = MockServer::start().await;
    mount_sign_in_page(&server).await;
    mount_login(
        &server,
        ResponseTemplate::new(400)
            .set_body_json(json!({"issue": "Your password is incorrect", "secret": "otp-1"})),
    )
    .await;
    mount_mfa_page(&server, 0).await;
    mount_mfa_sign_in(&server, ResponseTemplate::new(200), 0).await;

    let mut client = client_for(&server, ApiVariant::default());
    let (password, bank) = (secret("hunter2"), secret("000123"));
    let mut auth = Authenticator::new(&mut client, "alice", &password, Some(&bank));

    let err = auth.advance().await.unwrap_err();
    assert!(matches!(err, Error::UnexpectedLoginResponse { status: 400, .. }));
    assert!(err.response_body().unwrap().contains("incorrect"));
    assert!(matches!(auth.state(), AuthState::Failed));

    let err = auth.advance().await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { state: "Failed", .. }));
}

#[tokio::test]
async fn test_login_accepted_without_mfa() {
    let server = MockServer::start().await;
    mount_sign_in_page(&server).await;
    mount_login(
        &server,
        ResponseTemplate::new(201).insert_header("set-cookie", "api_access_token=direct; Path=/"),
    )
    .await;
    mount_mfa_page(&server, 0).await;

    let variant = ApiVariant {
        mfa_requires_bank_account: false,
        ..ApiVariant::default()
    };
    let mut client = client_for(&server, variant);
    let token = client.login("alice", &secret("hunter2"), None).await.unwrap();
    assert_eq!(token.expose(), "direct");
}

#[tokio::test]
async fn test_mfa_200_without_token_is_fatal() {
    let server = MockServer::start().await;
    mount_sign_in_page(&server).await;
    mount_login(&server, challenge()).await;
    mount_mfa_page(&server, 1).await;
    mount_mfa_sign_in(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"ok": true})),
        1,
    )
    .await;

    let mut client = client_for(&server, ApiVariant::default());
    let err = client
        .login("alice", &secret("hunter2"), Some(&secret("000123")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingAccessToken { .. }));
}

#[tokio::test]
async fn test_sign_in_page_without_csrf_cookie() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/account/sign-in"))
        .respond_with(ResponseTemplate::new(200).set_body_string(csrf_page("login-token")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut client = client_for(&server, ApiVariant::default());
    let err = client
        .login("alice", &secret("hunter2"), Some(&secret("000123")))
        .await
        .unwrap_err();
    assert_eq!(
        err.extraction(),
        Some(&ExtractionError::MissingCookie("_csrf".into()))
    );
}

#[tokio::test]
async fn test_missing_bank_number_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut client = client_for(&server, ApiVariant::default());
    let err = client
        .login("alice", &secret("hunter2"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_mfa_verify_page_error_status_stops_login() {
    let server = MockServer::start().await;
    mount_sign_in_page(&server).await;
    mount_login(&server, challenge()).await;
    Mock::given(method("GET"))
        .and(path("/account/mfa/verify-bank"))
        .respond_with(ResponseTemplate::new(500).set_body_string("verify page down"))
        .expect(1)
        .mount(&server)
        .await;
    mount_mfa_sign_in(&server, ResponseTemplate::new(200), 0).await;

    let mut client = client_for(&server, ApiVariant::default());
    let (password, bank) = (secret("hunter2"), secret("000123"));
    let mut auth = Authenticator::new(&mut client, "alice", &password, Some(&bank));
    auth.advance().await.unwrap();

    let err = auth.advance().await.unwrap_err();
    assert!(matches!(
        err,
        Error::UnexpectedStatus {
            step: "mfa verify page",
            expected: 200,
            actual: 500,
            ..
        }
    ));
    assert_eq!(err.response_body(), Some("verify page down"));
    assert!(matches!(auth.state(), AuthState::Failed));
}

#[tokio::test]
async fn test_mfa_confirmation_error_status_ignores_token_cookie() {
    let server = MockServer::start().await;
    mount_sign_in_page(&server).await;
    mount_login(&server, challenge()).await;
    mount_mfa_page(&server, 1).await;
    mount_mfa_sign_in(
        &server,
        ResponseTemplate::new(403)
            .insert_header("set-cookie", "api_access_token=should-not-be-used; Path=/")
            .set_body_json(json!({"error": {"message": "Bank account does not match"}})),
        1,
    )
    .await;

    let mut client = client_for(&server, ApiVariant::default());
    let (password, bank) = (secret("hunter2"), secret("000123"));
    let mut auth = Authenticator::new(&mut client, "alice", &password, Some(&bank));
    auth.advance().await.unwrap();
    auth.advance().await.unwrap();

    let err = auth.advance().await.unwrap_err();
    assert!(matches!(
        err,
        Error::UnexpectedStatus {
            step: "mfa sign-in",
            expected: 200,
            actual: 403,
            ..
        }
    ));
    assert!(err.response_body().unwrap().contains("does not match"));
    assert!(matches!(auth.state(), AuthState::Failed));
}
