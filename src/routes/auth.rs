// SPDX-License-Identifier: MIT

//! Strava OAuth authentication routes.
//!
//! The web and mobile callbacks share one orchestrator
//! ([`complete_callback`]); only the response shape differs per client. The
//! CSRF state is single-use: whatever the outcome, the session's stored
//! state is cleared before the response leaves.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::PrivateCookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::{mint_credential, verify_credential};
use crate::models::{ProviderTokenSet, User, UserProfile, UserUpsert};
use crate::services::oauth::{build_authorize_url, generate_state, DEFAULT_SCOPES};
use crate::session::{AuthRequestData, Platform, Patch, SessionData, SessionPatch};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/strava", get(login_start))
        .route("/auth/strava/callback", get(web_callback))
        .route("/auth/logout", post(logout))
        .route("/api/auth/strava/mobile", get(mobile_login_start))
        .route("/api/auth/strava/callback", post(mobile_callback))
        .route("/api/auth/status", get(auth_status))
        .route("/api/auth/refresh", post(refresh_tokens))
}

/// Query parameters for starting the OAuth flow.
#[derive(Deserialize, Validate)]
pub struct LoginParams {
    /// Frontend URL to send the user back to after the callback.
    /// Falls back to FRONTEND_URL.
    #[serde(default)]
    #[validate(url)]
    redirect_uri: Option<String>,
    #[serde(default)]
    platform: Option<Platform>,
    /// Client-chosen correlation id for status polling.
    #[serde(default)]
    session_id: Option<String>,
}

/// Start the web OAuth flow: store state + request metadata in the session
/// and redirect to Strava.
async fn login_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LoginParams>,
    headers: HeaderMap,
) -> Result<Response> {
    params
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let (jar, auth_url, _) = begin_login(&state, &headers, params, Platform::Web)?;
    Ok((jar, Redirect::temporary(&auth_url)).into_response())
}

#[derive(Serialize)]
struct MobileLoginResponse {
    auth_url: String,
    state: String,
}

/// Mobile variant: return the authorization URL as JSON instead of
/// redirecting, so the app can open it in a WebView.
async fn mobile_login_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LoginParams>,
    headers: HeaderMap,
) -> Result<Response> {
    params
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let (jar, auth_url, state_value) = begin_login(&state, &headers, params, Platform::Mobile)?;
    Ok((
        jar,
        Json(MobileLoginResponse {
            auth_url,
            state: state_value,
        }),
    )
        .into_response())
}

/// Shared login initiation: mint a state, record the authorization request
/// in the session, and build the provider URL.
fn begin_login(
    state: &AppState,
    headers: &HeaderMap,
    params: LoginParams,
    default_platform: Platform,
) -> Result<(PrivateCookieJar, String, String)> {
    let state_value = generate_state()?;
    let auth_url = build_authorize_url(&state.config, &state_value, DEFAULT_SCOPES, None)?;

    let auth_request = AuthRequestData {
        redirect_uri: params
            .redirect_uri
            .unwrap_or_else(|| state.config.frontend_url.clone()),
        platform: params.platform.unwrap_or(default_platform),
        session_id: params.session_id.unwrap_or_else(|| state_value.clone()),
        created_at: Utc::now().timestamp(),
    };

    tracing::info!(
        platform = ?auth_request.platform,
        session_id = %auth_request.session_id,
        "Starting OAuth flow"
    );

    let (jar, data) = state.sessions.read(headers);
    let patch = SessionPatch {
        state: Patch::Set(state_value.clone()),
        auth_request: Patch::Set(auth_request),
        ..Default::default()
    };
    let (jar, _) = state.sessions.update(jar, data, patch)?;
    Ok((jar, auth_url, state_value))
}

/// Everything a successful callback produces.
struct CallbackOutcome {
    credential: String,
    tokens: ProviderTokenSet,
    user: User,
}

/// Run the callback state machine: validate the code and state, exchange
/// the code, fetch the profile, persist the user, mint a credential.
///
/// Pure with respect to the session: the caller applies the matching
/// success/failure patch, so the state is cleared on every path.
async fn complete_callback(
    state: &AppState,
    session: &SessionData,
    code: Option<&str>,
    callback_state: Option<&str>,
    platform: Platform,
) -> Result<CallbackOutcome> {
    let code = match code {
        Some(c) if !c.is_empty() => c,
        _ => return Err(AppError::BadRequest("missing authorization code".into())),
    };

    if state.config.allow_state_bypass {
        tracing::warn!("OAuth state validation bypassed (ALLOW_STATE_BYPASS)");
    } else {
        match (session.state.as_deref(), callback_state) {
            (Some(stored), Some(received)) if stored == received => {}
            _ => {
                tracing::warn!("OAuth state missing or mismatched, rejecting callback");
                return Err(AppError::InvalidState);
            }
        }
    }

    let tokens = state.strava.exchange_code(code).await?;
    let athlete = state.strava.get_athlete(&tokens.access_token).await?;

    let user = state
        .users
        .upsert_user(&UserUpsert {
            strava_id: athlete.id,
            first_name: athlete.firstname,
            last_name: athlete.lastname,
            email: athlete.email,
            avatar_url: athlete.profile,
            tokens: tokens.clone(),
        })
        .await?;

    // Only mobile clients get the provider token embedded in the
    // credential; web clients keep it in the session cookie.
    let embedded = match platform {
        Platform::Mobile => Some(tokens.access_token.clone()),
        Platform::Web => None,
    };
    let credential = mint_credential(
        &state.config.jwt_signing_key,
        user.strava_id,
        user.is_admin,
        embedded,
    )?;

    tracing::info!(
        strava_id = user.strava_id,
        first_name = %user.first_name,
        "OAuth callback completed"
    );

    Ok(CallbackOutcome {
        credential,
        tokens,
        user,
    })
}

#[derive(Deserialize)]
pub struct WebCallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    /// Set by the provider when the user denies authorization.
    #[serde(default)]
    error: Option<String>,
}

/// Web OAuth callback: finish the flow and send the browser back to the
/// frontend. Failures redirect with `?error=` rather than surfacing a raw
/// error page.
async fn web_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WebCallbackParams>,
    headers: HeaderMap,
) -> Result<Response> {
    let (jar, session) = state.sessions.read(&headers);

    let frontend = session
        .auth_request
        .as_ref()
        .map(|r| r.redirect_uri.clone())
        .unwrap_or_else(|| state.config.frontend_url.clone());

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Strava");
        let (jar, _) = state
            .sessions
            .update(jar, session, SessionPatch::login_failed())?;
        let target = format!("{}?error={}", frontend, urlencoding::encode(&error));
        return Ok((jar, Redirect::temporary(&target)).into_response());
    }

    let platform = session
        .auth_request
        .as_ref()
        .map(|r| r.platform)
        .unwrap_or(Platform::Web);

    match complete_callback(
        &state,
        &session,
        params.code.as_deref(),
        params.state.as_deref(),
        platform,
    )
    .await
    {
        Ok(outcome) => {
            let patch = SessionPatch::login_complete(outcome.user.strava_id, &outcome.tokens);
            let (jar, _) = state.sessions.update(jar, session, patch)?;
            Ok((jar, Redirect::temporary(&frontend)).into_response())
        }
        Err(e) => {
            tracing::warn!(error = %e, "OAuth callback failed");
            let (jar, _) = state
                .sessions
                .update(jar, session, SessionPatch::login_failed())?;
            let target = format!("{frontend}?error=login_failed");
            Ok((jar, Redirect::temporary(&target)).into_response())
        }
    }
}

#[derive(Deserialize)]
pub struct MobileCallbackBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    /// "html" renders the WebView bridge page instead of JSON.
    #[serde(default)]
    format: Option<String>,
}

#[derive(Serialize)]
struct MobileCallbackResponse {
    credential: String,
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    user: UserProfile,
}

/// Mobile/JSON OAuth callback.
async fn mobile_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<MobileCallbackBody>,
) -> Result<Response> {
    let (jar, session) = state.sessions.read(&headers);

    match complete_callback(
        &state,
        &session,
        body.code.as_deref(),
        body.state.as_deref(),
        Platform::Mobile,
    )
    .await
    {
        Ok(outcome) => {
            let patch = SessionPatch::login_complete(outcome.user.strava_id, &outcome.tokens);
            let (jar, _) = state.sessions.update(jar, session, patch)?;

            let payload = MobileCallbackResponse {
                credential: outcome.credential,
                access_token: outcome.tokens.access_token,
                refresh_token: outcome.tokens.refresh_token,
                user: outcome.user.profile(),
            };

            if body.format.as_deref() == Some("html") {
                let json = serde_json::to_value(&payload)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("payload encode: {e}")))?;
                Ok((jar, Html(bridge_page(&json)?)).into_response())
            } else {
                Ok((jar, Json(payload)).into_response())
            }
        }
        Err(e) => {
            let (jar, _) = state
                .sessions
                .update(jar, session, SessionPatch::login_failed())?;
            // WebView clients need a page that tells the embedding shell
            // about the failure; raw JSON errors vanish inside the view.
            if body.format.as_deref() == Some("html") {
                tracing::warn!(error = %e, "Mobile OAuth callback failed");
                let payload = serde_json::json!({
                    "isAuthenticated": false,
                    "error": "login_failed",
                });
                Ok((jar, Html(bridge_page(&payload)?)).into_response())
            } else {
                Ok((jar, e.into_response()).into_response())
            }
        }
    }
}

#[derive(Deserialize)]
pub struct StatusParams {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    format: Option<String>,
}

#[derive(Serialize)]
struct StatusResponse {
    #[serde(rename = "isAuthenticated")]
    is_authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<UserProfile>,
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    credential: Option<String>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
}

impl StatusResponse {
    fn unauthenticated() -> Self {
        Self {
            is_authenticated: false,
            user: None,
            access_token: None,
            credential: None,
            session_id: None,
        }
    }
}

/// Authentication status, polled by the frontend (and by the mobile app
/// while its WebView finishes the flow, correlated via `session_id`).
async fn auth_status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatusParams>,
    headers: HeaderMap,
) -> Result<Response> {
    let (jar, session) = state.sessions.read(&headers);
    let html = params.format.as_deref() == Some("html");

    // A bearer credential may carry an embedded provider token; an invalid
    // one is simply ignored here, status is a polling endpoint.
    let bearer_claims = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .and_then(|t| verify_credential(&state.config.jwt_signing_key, t).ok());

    // The caller asked about a specific login attempt; a different (or
    // absent) one in the session means that attempt has not completed here.
    if let Some(wanted) = &params.session_id {
        let matches = session
            .auth_request
            .as_ref()
            .is_some_and(|r| &r.session_id == wanted);
        if !matches {
            return respond_status(jar, StatusResponse::unauthenticated(), html);
        }
    }

    let Some(strava_id) = session.strava_id else {
        return respond_status(jar, StatusResponse::unauthenticated(), html);
    };

    let Some(user) = state.users.find_user(strava_id).await? else {
        // The user record disappeared; drop the stale binding.
        let patch = SessionPatch {
            strava_id: Patch::Clear,
            ..Default::default()
        };
        let (jar, _) = state.sessions.update(jar, session, patch)?;
        return respond_status(jar, StatusResponse::unauthenticated(), html);
    };

    let platform = session
        .auth_request
        .as_ref()
        .map(|r| r.platform)
        .unwrap_or(Platform::Web);
    let access_token = bearer_claims
        .and_then(|c| c.access_token)
        .or_else(|| session.access_token.clone());
    let embedded = match platform {
        Platform::Mobile => access_token.clone(),
        Platform::Web => None,
    };
    let credential = mint_credential(
        &state.config.jwt_signing_key,
        user.strava_id,
        user.is_admin,
        embedded,
    )?;

    let response = StatusResponse {
        is_authenticated: true,
        user: Some(user.profile()),
        access_token,
        credential: Some(credential),
        session_id: session.auth_request.as_ref().map(|r| r.session_id.clone()),
    };
    respond_status(jar, response, html)
}

fn respond_status(
    jar: PrivateCookieJar,
    response: StatusResponse,
    html: bool,
) -> Result<Response> {
    if html {
        let json = serde_json::to_value(&response)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("payload encode: {e}")))?;
        Ok((jar, Html(bridge_page(&json)?)).into_response())
    } else {
        Ok((jar, Json(response)).into_response())
    }
}

#[derive(Deserialize)]
pub struct RefreshBody {
    refresh_token: String,
}

#[derive(Serialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
}

/// Refresh passthrough for clients holding their own refresh token. The
/// durable record and the session copy are updated when the session is
/// bound to a user; persistence failure does not fail the refresh itself.
async fn refresh_tokens(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RefreshBody>,
) -> Result<Response> {
    let tokens = state.strava.refresh(&body.refresh_token).await?;

    let (jar, session) = state.sessions.read(&headers);
    let jar = if let Some(strava_id) = session.strava_id {
        if let Err(e) = state.users.update_tokens(strava_id, &tokens).await {
            tracing::warn!(strava_id, error = %e, "Failed to persist refreshed tokens");
        }
        let patch = SessionPatch {
            access_token: Patch::Set(tokens.access_token.clone()),
            refresh_token: match &tokens.refresh_token {
                Some(rt) => Patch::Set(rt.clone()),
                None => Patch::Keep,
            },
            ..Default::default()
        };
        let (jar, _) = state.sessions.update(jar, session, patch)?;
        jar
    } else {
        jar
    };

    Ok((
        jar,
        Json(RefreshResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
        }),
    )
        .into_response())
}

/// Clear the session cookie.
async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let (jar, _) = state.sessions.read(&headers);
    let jar = state.sessions.clear(jar);
    (jar, StatusCode::NO_CONTENT).into_response()
}

/// Render the WebView/popup bridge page. The payload is handed to the
/// native shell via `ReactNativeWebView.postMessage`, to a popup opener via
/// `window.postMessage`, and stashed in localStorage as a fallback.
///
/// The JSON is script-escaped so a value containing `</script>` cannot
/// break out of the inline block.
fn bridge_page(payload: &serde_json::Value) -> Result<String> {
    let json = serde_json::to_string(payload)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("payload encode: {e}")))?;
    let escaped = html_escape::encode_script(&json);

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Login complete</title></head>
<body>
<p>Login complete. You can close this window.</p>
<script>
(function () {{
  var payload = {escaped};
  var message = JSON.stringify(payload);
  if (window.ReactNativeWebView) {{
    window.ReactNativeWebView.postMessage(message);
  }}
  if (window.opener) {{
    window.opener.postMessage(payload, "*");
  }}
  try {{
    localStorage.setItem("veloclub_auth", message);
  }} catch (e) {{}}
  window.close();
}})();
</script>
</body>
</html>
"#
    ))
}
