// SPDX-License-Identifier: MIT

//! Strava OAuth client and token lifecycle management.
//!
//! Handles:
//! - Authorization-code exchange (single attempt; codes are single-use)
//! - Token refresh with per-user locking and in-memory caching
//! - Athlete profile fetch
//! - Transient-vs-rejected error classification for the orchestrator

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::db::UserGateway;
use crate::error::{AppError, Result};
use crate::models::ProviderTokenSet;

/// Bounded timeout for every outbound provider call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Low-level Strava HTTP client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    /// Create a client against the real Strava endpoints.
    pub fn new(client_id: String, client_secret: String) -> Result<Self> {
        Self::with_base_url(client_id, client_secret, "https://www.strava.com")
    }

    /// Create a client against an arbitrary base URL (tests point this at a
    /// mock server).
    pub fn with_base_url(
        client_id: String,
        client_secret: String,
        base_url: &str,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client init failed: {e}")))?;

        Ok(Self {
            http,
            api_base: format!("{}/api/v3", base_url.trim_end_matches('/')),
            token_url: format!("{}/oauth/token", base_url.trim_end_matches('/')),
            client_id,
            client_secret,
        })
    }

    /// Exchange an authorization code for a token set.
    ///
    /// Not retried on failure: authorization codes are single-use, so a
    /// retry would fail anyway. Timeouts are reported as transient so the
    /// orchestrator can distinguish "try again" from "log in again".
    pub async fn exchange_code(&self, code: &str) -> Result<TokenExchangeResponse> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::TokenExchange {
                status: None,
                body: e.to_string(),
                transient: e.is_timeout() || e.is_connect(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::TokenExchange {
                status: Some(status),
                body,
                transient: false,
            });
        }

        response.json().await.map_err(|e| AppError::TokenExchange {
            status: None,
            body: format!("invalid token response: {e}"),
            transient: false,
        })
    }

    /// Refresh an expired access token.
    ///
    /// A provider rejection (revoked or reused refresh token) means the user
    /// must re-authenticate; callers must not retry it.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenRefreshResponse> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::TokenRefresh {
                status: None,
                transient: e.is_timeout() || e.is_connect(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status, body = %body, "Strava token refresh rejected");
            return Err(AppError::TokenRefresh {
                status: Some(status),
                transient: false,
            });
        }

        response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse token refresh response");
            AppError::TokenRefresh {
                status: None,
                transient: false,
            }
        })
    }

    /// Fetch the authenticated athlete's profile.
    ///
    /// Retried once: a profile failure right after a successful exchange is
    /// almost always transient, and giving up here wastes the single-use
    /// authorization code.
    pub async fn get_athlete(&self, access_token: &str) -> Result<StravaAthlete> {
        match self.get_athlete_once(access_token).await {
            Ok(athlete) => Ok(athlete),
            Err(e) => {
                tracing::warn!(error = %e, "Profile fetch failed, retrying once");
                self.get_athlete_once(access_token).await
            }
        }
    }

    async fn get_athlete_once(&self, access_token: &str) -> Result<StravaAthlete> {
        let url = format!("{}/athlete", self.api_base);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::ProfileFetch(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ProfileFetch(format!("HTTP {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::ProfileFetch(format!("invalid profile response: {e}")))
    }
}

/// Token set from the authorization-code exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

impl From<TokenExchangeResponse> for ProviderTokenSet {
    fn from(r: TokenExchangeResponse) -> Self {
        Self {
            access_token: r.access_token,
            refresh_token: r.refresh_token,
            expires_at: r.expires_at,
        }
    }
}

/// Token set from a refresh call.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

impl From<TokenRefreshResponse> for ProviderTokenSet {
    fn from(r: TokenRefreshResponse) -> Self {
        Self {
            access_token: r.access_token,
            refresh_token: r.refresh_token,
            expires_at: r.expires_at,
        }
    }
}

/// Athlete profile from `GET /api/v3/athlete`.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaAthlete {
    pub id: u64,
    pub firstname: String,
    pub lastname: String,
    /// Profile picture URL
    pub profile: Option<String>,
    pub email: Option<String>,
}

/// Cached access token with expiry information.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    /// Unix timestamp; tokens without a known expiry are not cached.
    expires_at: i64,
}

type TokenCache = Arc<DashMap<u64, CachedToken>>;
type RefreshLocks = Arc<DashMap<u64, Arc<Mutex<()>>>>;

/// High-level Strava service that manages token lifecycle and API calls.
///
/// Encapsulates:
/// - Token retrieval from the user gateway
/// - Automatic refresh when expiring (5-minute margin)
/// - Persistence of refreshed tokens (durable copy first, then cache)
/// - Per-user locking so only one refresh per user is in flight
#[derive(Clone)]
pub struct StravaService {
    client: StravaClient,
    users: Arc<dyn UserGateway>,
    token_cache: TokenCache,
    refresh_locks: RefreshLocks,
}

impl StravaService {
    pub fn new(client: StravaClient, users: Arc<dyn UserGateway>) -> Self {
        Self {
            client,
            users,
            token_cache: Arc::new(DashMap::new()),
            refresh_locks: Arc::new(DashMap::new()),
        }
    }

    /// Exchange an authorization code (orchestrator step 3).
    pub async fn exchange_code(&self, code: &str) -> Result<ProviderTokenSet> {
        Ok(self.client.exchange_code(code).await?.into())
    }

    /// Fetch the athlete profile (orchestrator step 4).
    pub async fn get_athlete(&self, access_token: &str) -> Result<StravaAthlete> {
        self.client.get_athlete(access_token).await
    }

    /// Refresh a token set without touching persistence. Used by the
    /// refresh passthrough endpoint, which persists separately.
    pub async fn refresh(&self, refresh_token: &str) -> Result<ProviderTokenSet> {
        Ok(self.client.refresh_token(refresh_token).await?.into())
    }

    /// Get a valid (non-expired) access token for the given athlete,
    /// refreshing and persisting if needed.
    pub async fn get_valid_access_token(&self, strava_id: u64) -> Result<String> {
        let now = Utc::now().timestamp();

        // Fast path: cached and not expiring soon.
        if let Some(cached) = self.token_cache.get(&strava_id) {
            if now + TOKEN_REFRESH_MARGIN_SECS < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        // Only one refresh per user at a time; others wait here.
        let lock = self
            .refresh_locks
            .entry(strava_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Re-check after acquiring the lock; another task may have refreshed.
        if let Some(cached) = self.token_cache.get(&strava_id) {
            if now + TOKEN_REFRESH_MARGIN_SECS < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let user = self
            .users
            .find_user(strava_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {strava_id}")))?;

        // A token without a recorded expiry is used as-is; the provider will
        // reject it if it is actually stale.
        let expires_at = match user.token_expires_at {
            Some(ts) => ts,
            None => return Ok(user.access_token),
        };

        if now + TOKEN_REFRESH_MARGIN_SECS < expires_at {
            self.token_cache.insert(
                strava_id,
                CachedToken {
                    access_token: user.access_token.clone(),
                    expires_at,
                },
            );
            return Ok(user.access_token);
        }

        tracing::info!(strava_id, "Access token expired, refreshing");

        let refresh_token = user.refresh_token.ok_or(AppError::TokenRefresh {
            status: None,
            transient: false,
        })?;

        let new_tokens: ProviderTokenSet =
            self.client.refresh_token(&refresh_token).await?.into();

        // Durable copy first: a token must never be reported valid if the
        // persisted refresh failed.
        self.users.update_tokens(strava_id, &new_tokens).await?;

        if let Some(expires_at) = new_tokens.expires_at {
            self.token_cache.insert(
                strava_id,
                CachedToken {
                    access_token: new_tokens.access_token.clone(),
                    expires_at,
                },
            );
        }

        tracing::info!(strava_id, "Token refreshed and persisted");
        Ok(new_tokens.access_token)
    }
}
