// SPDX-License-Identifier: MIT

//! Encrypted cookie-backed session store.
//!
//! Session data is serialized as JSON and sealed inside a single private
//! (AEAD-encrypted) cookie. A cookie that fails decryption or parsing is
//! treated as "no session" — tampering never surfaces as an error. The whole
//! blob is rewritten on every update, so per-cookie reads and writes are
//! linearizable: a second tab completing a different login attempt will find
//! its `state` already cleared and lose.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use serde::{Deserialize, Serialize};

use crate::config::{Config, MIN_SESSION_SECRET_LEN};
use crate::error::AppError;
use crate::models::ProviderTokenSet;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "veloclub_session";

/// Session lifetime. Matches the credential TTL so the two channels expire
/// together.
const SESSION_MAX_AGE_DAYS: i64 = 30;

/// Which kind of client initiated the login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Mobile,
}

/// Metadata for the single outstanding authorization request.
/// A new login overwrites the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequestData {
    pub redirect_uri: String,
    pub platform: Platform,
    /// Client-supplied correlation id; defaults to the state value.
    pub session_id: String,
    /// Unix timestamp when the login was initiated
    pub created_at: i64,
}

/// Server-held session data, referenced by the encrypted cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// Pending CSRF state. Present only between login-initiation and
    /// callback; cleared after validation whether it succeeds or fails.
    pub state: Option<String>,
    /// Bound identity. Set if and only if a callback fully succeeded.
    pub strava_id: Option<u64>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub auth_request: Option<AuthRequestData>,
}

impl SessionData {
    pub fn is_authenticated(&self) -> bool {
        self.strava_id.is_some()
    }
}

/// One field of a merge-patch: leave untouched, clear, or overwrite.
#[derive(Debug)]
pub enum Patch<T> {
    Keep,
    Clear,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T> Patch<T> {
    fn apply(self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Clear => *slot = None,
            Patch::Set(value) => *slot = Some(value),
        }
    }
}

/// Merge-patch over [`SessionData`]: fields not mentioned stay untouched,
/// `Clear` removes a value explicitly.
#[derive(Debug, Default)]
pub struct SessionPatch {
    pub state: Patch<String>,
    pub strava_id: Patch<u64>,
    pub access_token: Patch<String>,
    pub refresh_token: Patch<String>,
    pub auth_request: Patch<AuthRequestData>,
}

impl SessionPatch {
    /// Patch applied after a fully successful callback: state consumed,
    /// identity bound, tokens stored.
    pub fn login_complete(strava_id: u64, tokens: &ProviderTokenSet) -> Self {
        Self {
            state: Patch::Clear,
            strava_id: Patch::Set(strava_id),
            access_token: Patch::Set(tokens.access_token.clone()),
            refresh_token: match &tokens.refresh_token {
                Some(rt) => Patch::Set(rt.clone()),
                None => Patch::Keep,
            },
            ..Self::default()
        }
    }

    /// Patch applied after a failed callback: the state is single-use and
    /// must not survive a failed validation either.
    pub fn login_failed() -> Self {
        Self {
            state: Patch::Clear,
            ..Self::default()
        }
    }
}

/// Store for encrypted cookie sessions. Injected via `AppState`; handlers
/// never reach for ambient/global session access.
#[derive(Clone)]
pub struct SessionStore {
    key: Key,
    secure: bool,
}

impl SessionStore {
    /// Build a store from the configured secret.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        if config.session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(AppError::Configuration(
                "session secret shorter than 64 bytes".to_string(),
            ));
        }
        Ok(Self {
            key: Key::from(&config.session_secret),
            secure: config.secure_cookies(),
        })
    }

    /// Read the session from request headers. Absent, undecryptable, or
    /// unparseable cookies all yield an empty session.
    pub fn read(&self, headers: &HeaderMap) -> (PrivateCookieJar, SessionData) {
        let jar = PrivateCookieJar::from_headers(headers, self.key.clone());
        let data = jar
            .get(SESSION_COOKIE)
            .and_then(|cookie| serde_json::from_str(cookie.value()).ok())
            .unwrap_or_default();
        (jar, data)
    }

    /// Apply a merge-patch and reseal the cookie. Returns the jar to attach
    /// to the response and the resulting session data.
    pub fn update(
        &self,
        jar: PrivateCookieJar,
        mut data: SessionData,
        patch: SessionPatch,
    ) -> Result<(PrivateCookieJar, SessionData), AppError> {
        patch.state.apply(&mut data.state);
        patch.strava_id.apply(&mut data.strava_id);
        patch.access_token.apply(&mut data.access_token);
        patch.refresh_token.apply(&mut data.refresh_token);
        patch.auth_request.apply(&mut data.auth_request);

        let value = serde_json::to_string(&data)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("session serialize: {e}")))?;
        let jar = jar.add(self.build_cookie(value));
        Ok((jar, data))
    }

    /// Drop all session data (logout).
    pub fn clear(&self, jar: PrivateCookieJar) -> PrivateCookieJar {
        jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build())
    }

    fn build_cookie(&self, value: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(time::Duration::days(SESSION_MAX_AGE_DAYS))
            .build()
    }
}
