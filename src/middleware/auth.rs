// SPDX-License-Identifier: MIT

//! Bearer credential codec and authentication middleware.
//!
//! Credentials are HS256 JWTs minted after a successful OAuth callback. The
//! algorithm is allow-listed (an `alg: none` or RS256 token never passes)
//! and every credential carries an expiry. Mobile credentials may embed the
//! provider access token so a cookie-less WebView can reach the provider
//! API; that widens the blast radius of a leaked credential, which is why
//! the web flow never embeds it.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::AppState;

/// Credential lifetime (30 days, same as the session cookie).
pub const CREDENTIAL_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Credential claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: u64,
    #[serde(rename = "isAdmin", default)]
    pub is_admin: bool,
    /// Embedded provider access token (mobile flow only)
    #[serde(
        rename = "accessToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub access_token: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Mint a credential for a user.
pub fn mint_credential(
    signing_key: &[u8],
    user_id: u64,
    is_admin: bool,
    access_token: Option<String>,
) -> Result<String> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        user_id,
        is_admin,
        access_token,
        iat: now,
        exp: now + CREDENTIAL_TTL_SECS,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("credential encoding failed: {e}")))
}

/// Verify a credential and return its claims.
///
/// Rejected-by-default: malformed structure, bad base64, wrong or missing
/// signature, wrong algorithm, missing or non-integer `userId`, and expired
/// `exp` all collapse to [`AppError::InvalidCredential`].
pub fn verify_credential(signing_key: &[u8], token: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    // nbf is not minted here but honored if a credential carries one.
    validation.validate_nbf = true;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(signing_key),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::InvalidCredential)
}

/// Authenticated caller, attached to the request by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub is_admin: bool,
    /// Provider access token, if the caller's channel carried one.
    pub provider_token: Option<String>,
}

/// Middleware that requires a valid bearer credential or an authenticated
/// session cookie.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);

    let auth_user = if let Some(token) = bearer {
        let claims = verify_credential(&state.config.jwt_signing_key, &token)?;
        AuthUser {
            user_id: claims.user_id,
            is_admin: claims.is_admin,
            provider_token: claims.access_token,
        }
    } else {
        let (_, session) = state.sessions.read(request.headers());
        let strava_id = session.strava_id.ok_or(AppError::Unauthorized)?;
        let user = state
            .users
            .find_user(strava_id)
            .await?
            .ok_or(AppError::Unauthorized)?;
        AuthUser {
            user_id: user.strava_id,
            is_admin: user.is_admin,
            provider_token: session.access_token,
        }
    };

    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}
