mod common;

use chrono::Duration;
use common::{session_token, token_with, TestApp, TEST_JWT_SECRET, TEST_USER_ID};
use reqwest::{Method, StatusCode};

const PROTECTED: &[(&str, &str)] = &[
    ("POST", "/api/extract-text"),
    ("POST", "/api/summarize"),
    ("GET", "/api/documents"),
    ("GET", "/api/documents/00000000-0000-0000-0000-000000000000"),
    ("GET", "/api/subscription"),
    ("POST", "/api/stripe/create-checkout"),
    ("POST", "/api/stripe/billing-portal"),
];

async fn call(app: &TestApp, method: &str, path: &str, auth: Option<&str>) -> StatusCode {
    let method: Method = method.parse().unwrap();
    let mut request = app.client.request(method, app.url(path));
    if let Some(value) = auth {
        request = request.header("authorization", value);
    }
    request
        .send()
        .await
        .expect("Failed to execute request")
        .status()
}

#[tokio::test]
async fn protected_endpoints_require_a_session() {
    let app = TestApp::spawn().await;

    for (method, path) in PROTECTED {
        let status = call(&app, method, path, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, path);
    }
}

#[tokio::test]
async fn invalid_sessions_are_rejected() {
    let app = TestApp::spawn().await;
    let wrong_secret = format!("Bearer {}", token_with(TEST_USER_ID, "not-the-secret", Duration::minutes(5)));
    let expired = format!("Bearer {}", token_with(TEST_USER_ID, TEST_JWT_SECRET, Duration::minutes(-10)));
    let not_bearer = format!("Basic {}", session_token(TEST_USER_ID));

    for header in [
        "Bearer garbage".to_string(),
        "Bearer ".to_string(),
        wrong_secret,
        expired,
        not_bearer,
    ] {
        for (method, path) in PROTECTED {
            let status = call(&app, method, path, Some(&header)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {} with {:?}", method, path, header);
        }
    }
}

#[tokio::test]
async fn unauthorized_body_is_json_error() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/documents", None).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn valid_session_reaches_handler() {
    let app = TestApp::spawn().await;
    let token = session_token(TEST_USER_ID);

    let response = app.get("/api/documents", Some(&token)).await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn webhook_does_not_require_a_session() {
    let app = TestApp::spawn().await;

    let response = app.post_webhook("{}", None).await;

    // Rejected for the missing provider signature, not for a missing session.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
