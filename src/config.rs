// SPDX-License-Identifier: MIT

//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and held in memory. Weak or missing
//! signing material is refused (or loudly warned about) here rather than
//! discovered at the first failed login.

use std::env;

/// Minimum length for the session cookie encryption secret.
/// The private cookie jar derives both its signing and encryption keys
/// from this value and requires at least 64 bytes of material.
pub const MIN_SESSION_SECRET_LEN: usize = 64;

/// Minimum length for the credential signing key before we start warning.
const MIN_JWT_KEY_LEN: usize = 32;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// Registered OAuth redirect URI (where Strava sends the callback)
    pub strava_redirect_uri: String,
    /// Frontend URL for post-login redirects and CORS
    pub frontend_url: String,
    /// Secret for sealing the session cookie (raw bytes, >= 64)
    pub session_secret: Vec<u8>,
    /// Signing key for issued bearer credentials (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Development-only flag that skips OAuth state validation.
    /// Must never be enabled in production; every use is warn-logged.
    pub allow_state_bypass: bool,
    /// Server port
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let session_secret = env::var("SESSION_SECRET")
            .map_err(|_| ConfigError::Missing("SESSION_SECRET"))?
            .into_bytes();
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::Invalid(
                "SESSION_SECRET must be at least 64 bytes",
            ));
        }

        let jwt_signing_key = env::var("JWT_SIGNING_KEY")
            .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
            .into_bytes();

        let config = Self {
            strava_client_id: env::var("STRAVA_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            strava_client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            strava_redirect_uri: env::var("STRAVA_REDIRECT_URI")
                .map_err(|_| ConfigError::Missing("STRAVA_REDIRECT_URI"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            session_secret,
            jwt_signing_key,
            allow_state_bypass: env::var("ALLOW_STATE_BYPASS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
        };

        config.warn_on_weak_secrets();
        Ok(config)
    }

    /// Emit startup warnings for configuration that is legal but unsafe.
    fn warn_on_weak_secrets(&self) {
        if self.jwt_signing_key.len() < MIN_JWT_KEY_LEN
            || self.jwt_signing_key == b"your_jwt_secret_key"
        {
            tracing::warn!(
                "JWT_SIGNING_KEY is short or a known default; issued credentials \
                 are forgeable. Generate at least 32 bytes of random key material."
            );
        }
        if self.allow_state_bypass {
            tracing::warn!(
                "ALLOW_STATE_BYPASS is enabled: OAuth state validation will be \
                 skipped. This disables CSRF protection and must never be set in \
                 production."
            );
        }
    }

    /// Whether cookies should carry the Secure attribute.
    pub fn secure_cookies(&self) -> bool {
        self.frontend_url.starts_with("https://")
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            strava_client_secret: "test_secret".to_string(),
            strava_redirect_uri: "http://localhost:8080/auth/strava/callback".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            session_secret: vec![0x42; MIN_SESSION_SECRET_LEN],
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!!".to_vec(),
            allow_state_bypass: false,
            port: 8080,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
