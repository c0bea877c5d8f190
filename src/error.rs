// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.
//!
//! Client-facing responses carry a short machine-checkable `error` code and
//! a human-readable message; provider bodies and internal detail are logged
//! server-side only.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired credential")]
    InvalidCredential,

    #[error("OAuth state missing or mismatched")]
    InvalidState,

    #[error("Token exchange failed")]
    TokenExchange {
        status: Option<u16>,
        body: String,
        /// Timeout or connect failure rather than a provider rejection;
        /// the caller may retry instead of re-authenticating.
        transient: bool,
    },

    #[error("Token refresh failed")]
    TokenRefresh {
        status: Option<u16>,
        transient: bool,
    },

    #[error("Profile fetch failed: {0}")]
    ProfileFetch(String),

    #[error("User persistence failed: {0}")]
    Upsert(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the failure is a network-level problem that is safe to retry,
    /// as opposed to a provider rejection that requires re-authentication.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::TokenExchange {
                transient: true,
                ..
            } | AppError::TokenRefresh {
                transient: true,
                ..
            }
        )
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Configuration(msg) => {
                tracing::error!(error = %msg, "Configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error", None)
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidCredential => {
                (StatusCode::UNAUTHORIZED, "invalid_credential", None)
            }
            AppError::InvalidState => (
                StatusCode::BAD_REQUEST,
                "invalid_state",
                Some("Please try logging in again".to_string()),
            ),
            AppError::TokenExchange {
                status,
                body,
                transient,
            } => {
                tracing::error!(?status, body = %body, transient, "Token exchange failed");
                (StatusCode::BAD_GATEWAY, "token_exchange_failed", None)
            }
            AppError::TokenRefresh { status, transient } => {
                tracing::warn!(?status, transient, "Token refresh failed");
                (StatusCode::BAD_GATEWAY, "token_refresh_failed", None)
            }
            AppError::ProfileFetch(msg) => {
                tracing::error!(error = %msg, "Profile fetch failed");
                (StatusCode::BAD_GATEWAY, "profile_fetch_failed", None)
            }
            AppError::Upsert(msg) => {
                tracing::error!(error = %msg, "User persistence error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
