// SPDX-License-Identifier: MIT

//! User model for storage and API.

use serde::{Deserialize, Serialize};

/// Tokens obtained from the provider (initial exchange or refresh).
///
/// The session holds the latest-known copy for the current browser context;
/// the persisted user record is the durable source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp when the access token expires
    pub expires_at: Option<i64>,
}

/// User record, keyed by Strava athlete ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Strava athlete ID (also the record key)
    pub strava_id: u64,
    pub first_name: String,
    pub last_name: String,
    /// Email address (may be absent if not shared by the provider)
    pub email: Option<String>,
    /// Profile picture URL
    pub avatar_url: Option<String>,
    /// Admin flag, carried into issued credentials. Never set by the OAuth
    /// flow itself; preserved across upserts.
    pub is_admin: bool,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp when the access token expires
    pub token_expires_at: Option<i64>,
    /// When the user first connected (ISO 8601)
    pub created_at: String,
    /// Last successful login (ISO 8601)
    pub last_login: String,
}

impl User {
    /// Public view of the user, safe to return to clients.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.strava_id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            profile: self.avatar_url.clone(),
        }
    }

    /// The persisted token set for this user.
    pub fn tokens(&self) -> ProviderTokenSet {
        ProviderTokenSet {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.token_expires_at,
        }
    }
}

/// Public user view returned by auth endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub profile: Option<String>,
}

/// Input to the upsert gateway after a successful callback.
#[derive(Debug, Clone)]
pub struct UserUpsert {
    pub strava_id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub tokens: ProviderTokenSet,
}
