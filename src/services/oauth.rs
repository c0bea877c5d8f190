// SPDX-License-Identifier: MIT

//! OAuth authorization request construction.
//!
//! The state value is a one-time CSRF token binding an authorization request
//! to its callback. It is random, never derived from request data, and lives
//! only in the sealed session cookie until the callback consumes it.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};

use crate::config::Config;
use crate::error::{AppError, Result};

/// Strava authorization endpoint.
pub const AUTHORIZE_URL: &str = "https://www.strava.com/oauth/authorize";

/// Scopes requested on login. Strava expects a comma-joined list.
pub const DEFAULT_SCOPES: &[&str] = &["read", "activity:read_all", "activity:write"];

/// Bytes of entropy in a state token (256 bits; 128 is the floor).
const STATE_LEN: usize = 32;

/// Generate a one-time CSRF state value from the system CSPRNG.
///
/// An unavailable entropy source is a hard error; there is no fallback.
pub fn generate_state() -> Result<String> {
    let mut bytes = [0u8; STATE_LEN];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("system entropy source unavailable")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Build the provider authorization URL.
///
/// The redirect URI is always echoed in the query string — Strava validates
/// it against the registered set, and omitting or mismatching it fails the
/// whole flow with an opaque provider-side error.
pub fn build_authorize_url(
    config: &Config,
    state: &str,
    scopes: &[&str],
    redirect_uri: Option<&str>,
) -> Result<String> {
    if config.strava_client_id.is_empty() {
        return Err(AppError::Configuration(
            "STRAVA_CLIENT_ID is not set".to_string(),
        ));
    }

    let redirect_uri = redirect_uri.unwrap_or(&config.strava_redirect_uri);

    Ok(format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
        AUTHORIZE_URL,
        urlencoding::encode(&config.strava_client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scopes.join(",")),
        urlencoding::encode(state),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_url_safe_and_long_enough() {
        let state = generate_state().unwrap();

        // 32 bytes -> 43 chars of unpadded base64url
        assert_eq!(state.len(), 43);
        assert!(!state.contains('+'));
        assert!(!state.contains('/'));
        assert!(!state.contains('='));
    }

    #[test]
    fn test_state_values_are_unique() {
        let a = generate_state().unwrap();
        let b = generate_state().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_authorize_url_contains_required_params() {
        let config = Config::test_default();
        let url = build_authorize_url(&config, "STATE123", DEFAULT_SCOPES, None).unwrap();

        assert!(url.starts_with(AUTHORIZE_URL));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("state=STATE123"));
        assert!(url.contains(&format!(
            "redirect_uri={}",
            urlencoding::encode(&config.strava_redirect_uri)
        )));
        assert!(url.contains("scope=read%2Cactivity%3Aread_all%2Cactivity%3Awrite"));
    }

    #[test]
    fn test_authorize_url_echoes_override_redirect() {
        let config = Config::test_default();
        let url = build_authorize_url(
            &config,
            "S",
            &["read"],
            Some("https://api.example.com/auth/strava/callback"),
        )
        .unwrap();

        assert!(url.contains(&format!(
            "redirect_uri={}",
            urlencoding::encode("https://api.example.com/auth/strava/callback")
        )));
    }

    #[test]
    fn test_missing_client_id_is_configuration_error() {
        let mut config = Config::test_default();
        config.strava_client_id = String::new();

        let result = build_authorize_url(&config, "S", DEFAULT_SCOPES, None);
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }
}
