// SPDX-License-Identifier: MIT

//! Mobile OAuth flow: JSON login start, JSON callback, HTML bridge page.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

use common::{cookies_from, create_test_app_with_provider};
use veloclub::config::Config;

async fn body_bytes(response: axum::http::Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

async fn start_mobile_login(app: &common::TestApp) -> (String, String) {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/strava/mobile")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = cookies_from(&response);
    let body: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    let state = body["state"].as_str().unwrap().to_string();
    assert!(body["auth_url"]
        .as_str()
        .unwrap()
        .starts_with("https://www.strava.com/oauth/authorize"));
    (cookie, state)
}

fn mount_provider_success(server_expectation: u64) -> (Mock, Mock) {
    let token = Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "MOBILE_AT",
            "refresh_token": "MOBILE_RT",
            "expires_at": chrono::Utc::now().timestamp() + 21600,
        })))
        .expect(server_expectation);
    let athlete = Mock::given(method("GET"))
        .and(path("/api/v3/athlete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 77,
            "firstname": "Bea",
            "lastname": "Climber",
            "profile": null,
        })));
    (token, athlete)
}

#[tokio::test]
async fn test_mobile_callback_returns_credential_with_embedded_token() {
    let provider = MockServer::start().await;
    let (token, athlete) = mount_provider_success(1);
    token.mount(&provider).await;
    athlete.mount(&provider).await;

    let app = create_test_app_with_provider(Config::test_default(), &provider.uri());
    let (cookie, state) = start_mobile_login(&app).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/strava/callback")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, &cookie)
                .body(Body::from(
                    serde_json::json!({ "code": "CODE1", "state": state }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).unwrap();

    assert_eq!(body["access_token"], serde_json::json!("MOBILE_AT"));
    assert_eq!(body["refresh_token"], serde_json::json!("MOBILE_RT"));
    assert_eq!(body["user"]["id"], serde_json::json!(77));
    assert_eq!(body["user"]["firstName"], serde_json::json!("Bea"));

    // The credential verifies and carries the provider token for the
    // cookie-less WebView.
    let claims = veloclub::middleware::auth::verify_credential(
        &app.state.config.jwt_signing_key,
        body["credential"].as_str().unwrap(),
    )
    .unwrap();
    assert_eq!(claims.user_id, 77);
    assert_eq!(claims.access_token.as_deref(), Some("MOBILE_AT"));
}

#[tokio::test]
async fn test_mobile_callback_html_format_renders_bridge_page() {
    let provider = MockServer::start().await;
    let (token, athlete) = mount_provider_success(1);
    token.mount(&provider).await;
    athlete.mount(&provider).await;

    let app = create_test_app_with_provider(Config::test_default(), &provider.uri());
    let (cookie, state) = start_mobile_login(&app).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/strava/callback")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, &cookie)
                .body(Body::from(
                    serde_json::json!({ "code": "CODE1", "state": state, "format": "html" })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/html"));

    let page = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(page.contains("ReactNativeWebView"));
    assert!(page.contains("window.opener"));
    assert!(page.contains("MOBILE_AT"));
}

#[tokio::test]
async fn test_mobile_callback_with_bad_state_returns_error_code() {
    let provider = MockServer::start().await;
    let (token, _) = mount_provider_success(0);
    token.mount(&provider).await;

    let app = create_test_app_with_provider(Config::test_default(), &provider.uri());
    let (cookie, _state) = start_mobile_login(&app).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/strava/callback")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, &cookie)
                .body(Body::from(
                    serde_json::json!({ "code": "CODE1", "state": "forged" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], serde_json::json!("invalid_state"));
}

#[tokio::test]
async fn test_mobile_callback_failure_in_html_format_notifies_shell() {
    let provider = MockServer::start().await;
    let (token, _) = mount_provider_success(0);
    token.mount(&provider).await;

    let app = create_test_app_with_provider(Config::test_default(), &provider.uri());
    let (cookie, _state) = start_mobile_login(&app).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/strava/callback")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, &cookie)
                .body(Body::from(
                    serde_json::json!({ "code": "CODE1", "state": "forged", "format": "html" })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    // The WebView still gets a page so the shell hears about the failure.
    assert_eq!(response.status(), StatusCode::OK);
    let page = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(page.contains("login_failed"));
    assert!(page.contains("ReactNativeWebView"));
}

#[tokio::test]
async fn test_mobile_callback_without_code_is_bad_request() {
    let app = create_test_app_with_provider(Config::test_default(), "https://www.strava.com");
    let (cookie, state) = start_mobile_login(&app).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/strava/callback")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, &cookie)
                .body(Body::from(
                    serde_json::json!({ "state": state }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], serde_json::json!("bad_request"));
}
