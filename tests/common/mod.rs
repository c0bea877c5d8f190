// SPDX-License-Identifier: MIT

use std::sync::Arc;

use veloclub::config::Config;
use veloclub::db::{InMemoryUserGateway, UserGateway};
use veloclub::models::User;
use veloclub::routes::create_router;
use veloclub::services::{StravaClient, StravaService};
use veloclub::session::SessionStore;
use veloclub::AppState;

/// Everything a test needs: the router, the shared state, and the concrete
/// gateway for seeding users directly.
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub gateway: Arc<InMemoryUserGateway>,
}

/// Create a test app pointed at the real Strava endpoints. Fine for tests
/// that never reach the provider.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with_provider(Config::test_default(), "https://www.strava.com")
}

/// Create a test app whose provider calls hit `provider_base` (a wiremock
/// server in practice).
#[allow(dead_code)]
pub fn create_test_app_with_provider(config: Config, provider_base: &str) -> TestApp {
    let sessions = SessionStore::new(&config).expect("session store");
    let gateway = Arc::new(InMemoryUserGateway::new());
    let users: Arc<dyn UserGateway> = gateway.clone();

    let client = StravaClient::with_base_url(
        config.strava_client_id.clone(),
        config.strava_client_secret.clone(),
        provider_base,
    )
    .expect("strava client");
    let strava = StravaService::new(client, users.clone());

    let state = Arc::new(AppState {
        config,
        sessions,
        users,
        strava,
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        gateway,
    }
}

/// Seed a user directly into the in-memory gateway.
#[allow(dead_code)]
pub fn seed_user(app: &TestApp, strava_id: u64, is_admin: bool) -> User {
    let user = User {
        strava_id,
        first_name: "Ann".to_string(),
        last_name: "Rider".to_string(),
        email: Some("ann@example.com".to_string()),
        avatar_url: None,
        is_admin,
        access_token: "seeded_access_token".to_string(),
        refresh_token: Some("seeded_refresh_token".to_string()),
        token_expires_at: Some(chrono::Utc::now().timestamp() + 21600),
        created_at: chrono::Utc::now().to_rfc3339(),
        last_login: chrono::Utc::now().to_rfc3339(),
    };
    app.gateway.insert(user.clone());
    user
}

/// Seal a session cookie carrying the given patch, as a request header value.
#[allow(dead_code)]
pub fn session_cookie_with(app: &TestApp, patch: veloclub::session::SessionPatch) -> String {
    use axum::response::IntoResponse;

    let (jar, data) = app.state.sessions.read(&axum::http::HeaderMap::new());
    let (jar, _) = app.state.sessions.update(jar, data, patch).unwrap();
    let response = (jar, "").into_response();
    cookies_from(&response)
}

/// Extract the cookie pairs from a response's Set-Cookie headers, ready to
/// send back as a Cookie header.
#[allow(dead_code)]
pub fn cookies_from(response: &axum::http::Response<axum::body::Body>) -> String {
    response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}
