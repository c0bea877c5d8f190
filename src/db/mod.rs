// SPDX-License-Identifier: MIT

//! User/token persistence seam.
//!
//! The auth core does not own the application's database; it talks to it
//! through [`UserGateway`]. The in-memory implementation backs tests and
//! single-instance deployments; a relational store plugs in behind the same
//! trait.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::AppError;
use crate::models::{ProviderTokenSet, User, UserUpsert};

/// Persistence operations the auth flow needs.
#[async_trait]
pub trait UserGateway: Send + Sync {
    /// Look up a user by Strava athlete ID.
    async fn find_user(&self, strava_id: u64) -> Result<Option<User>, AppError>;

    /// Create-if-absent, else update profile and tokens, keyed by Strava ID.
    /// Must never create a duplicate record for the same provider identity.
    async fn upsert_user(&self, upsert: &UserUpsert) -> Result<User, AppError>;

    /// Overwrite the persisted token set for an existing user.
    async fn update_tokens(
        &self,
        strava_id: u64,
        tokens: &ProviderTokenSet,
    ) -> Result<(), AppError>;
}

/// In-memory gateway keyed by athlete ID.
#[derive(Default)]
pub struct InMemoryUserGateway {
    users: DashMap<u64, User>,
}

impl InMemoryUserGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user directly (tests).
    pub fn insert(&self, user: User) {
        self.users.insert(user.strava_id, user);
    }
}

#[async_trait]
impl UserGateway for InMemoryUserGateway {
    async fn find_user(&self, strava_id: u64) -> Result<Option<User>, AppError> {
        Ok(self.users.get(&strava_id).map(|u| u.clone()))
    }

    async fn upsert_user(&self, upsert: &UserUpsert) -> Result<User, AppError> {
        let now = chrono::Utc::now().to_rfc3339();

        let user = match self.users.get(&upsert.strava_id) {
            Some(existing) => User {
                strava_id: upsert.strava_id,
                first_name: upsert.first_name.clone(),
                last_name: upsert.last_name.clone(),
                email: upsert.email.clone().or_else(|| existing.email.clone()),
                avatar_url: upsert.avatar_url.clone(),
                // Admin status and first-connected time survive re-login.
                is_admin: existing.is_admin,
                access_token: upsert.tokens.access_token.clone(),
                refresh_token: upsert.tokens.refresh_token.clone(),
                token_expires_at: upsert.tokens.expires_at,
                created_at: existing.created_at.clone(),
                last_login: now,
            },
            None => User {
                strava_id: upsert.strava_id,
                first_name: upsert.first_name.clone(),
                last_name: upsert.last_name.clone(),
                email: upsert.email.clone(),
                avatar_url: upsert.avatar_url.clone(),
                is_admin: false,
                access_token: upsert.tokens.access_token.clone(),
                refresh_token: upsert.tokens.refresh_token.clone(),
                token_expires_at: upsert.tokens.expires_at,
                created_at: now.clone(),
                last_login: now,
            },
        };

        self.users.insert(user.strava_id, user.clone());
        Ok(user)
    }

    async fn update_tokens(
        &self,
        strava_id: u64,
        tokens: &ProviderTokenSet,
    ) -> Result<(), AppError> {
        let mut entry = self
            .users
            .get_mut(&strava_id)
            .ok_or_else(|| AppError::NotFound(format!("User {strava_id}")))?;
        entry.access_token = tokens.access_token.clone();
        entry.refresh_token = tokens.refresh_token.clone();
        entry.token_expires_at = tokens.expires_at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_upsert(strava_id: u64, access_token: &str) -> UserUpsert {
        UserUpsert {
            strava_id,
            first_name: "Ann".to_string(),
            last_name: "Rider".to_string(),
            email: Some("ann@example.com".to_string()),
            avatar_url: Some("https://example.com/ann.jpg".to_string()),
            tokens: ProviderTokenSet {
                access_token: access_token.to_string(),
                refresh_token: Some("RT".to_string()),
                expires_at: Some(1_900_000_000),
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_provider_id() {
        let gateway = InMemoryUserGateway::new();

        let first = gateway.upsert_user(&sample_upsert(42, "AT1")).await.unwrap();
        let second = gateway.upsert_user(&sample_upsert(42, "AT2")).await.unwrap();

        // One record, second call's tokens win, created_at preserved.
        assert_eq!(gateway.users.len(), 1);
        assert_eq!(second.access_token, "AT2");
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_upsert_preserves_admin_flag() {
        let gateway = InMemoryUserGateway::new();
        let mut user = gateway.upsert_user(&sample_upsert(7, "AT1")).await.unwrap();
        user.is_admin = true;
        gateway.insert(user);

        let after = gateway.upsert_user(&sample_upsert(7, "AT2")).await.unwrap();
        assert!(after.is_admin);
    }

    #[tokio::test]
    async fn test_update_tokens_requires_existing_user() {
        let gateway = InMemoryUserGateway::new();
        let tokens = ProviderTokenSet {
            access_token: "AT".to_string(),
            refresh_token: None,
            expires_at: None,
        };
        let result = gateway.update_tokens(99, &tokens).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
