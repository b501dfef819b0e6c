//! Authentication collaborator interface.
//!
//! Token validation and user lookup live outside the hub fabric; the
//! daemon only consumes this trait. The in-memory provider backs dev
//! mode (config token blocks) and the test harness.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use palaver_proto::{PresenceStatus, Role, UserSnapshot};
use thiserror::Error;

use crate::config::TokenBlock;

/// Failure talking to the auth collaborator.
///
/// Treated as transient: the caller sees a generic server error and the
/// connection survives.
#[derive(Debug, Error)]
pub enum AuthProviderError {
    #[error("auth provider unavailable: {0}")]
    Unavailable(String),
}

/// An authenticated user as reported by the auth collaborator.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub banner_url: Option<String>,
    pub role: Role,
    pub rank: Option<String>,
    pub status_message: Option<String>,
    pub accent_color: Option<String>,
}

impl AuthUser {
    /// Minimal record, used by tests and token blocks.
    pub fn new(user_id: impl Into<String>, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            avatar_url: None,
            banner_url: None,
            role,
            rank: None,
            status_message: None,
            accent_color: None,
        }
    }

    /// Project into the wire snapshot with the given presence.
    pub fn to_snapshot(&self, presence: PresenceStatus) -> UserSnapshot {
        UserSnapshot {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
            banner_url: self.banner_url.clone(),
            role: self.role,
            rank: self.rank.clone(),
            status_message: self.status_message.clone(),
            accent_color: self.accent_color.clone(),
            presence,
            last_updated: Utc::now(),
        }
    }
}

/// External authentication service consumed by the session core.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve an opaque bearer token; `None` means rejected.
    async fn validate_token(&self, token: &str) -> Result<Option<AuthUser>, AuthProviderError>;

    /// Look a user up by id.
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<AuthUser>, AuthProviderError>;

    /// Advisory presence write-back; failures are logged, never surfaced.
    async fn set_online_status(&self, user_id: &str, online: bool);
}

/// Token-table provider for dev mode and tests.
#[derive(Default)]
pub struct InMemoryAuthProvider {
    by_token: DashMap<String, AuthUser>,
    by_id: DashMap<String, AuthUser>,
}

impl InMemoryAuthProvider {
    /// Empty provider; populate with [`Self::insert`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from config token blocks.
    pub fn from_token_blocks(blocks: &[TokenBlock]) -> Self {
        let provider = Self::new();
        for block in blocks {
            let role = match block.role.as_str() {
                "admin" => Role::Admin,
                "moderator" => Role::Moderator,
                _ => Role::User,
            };
            provider.insert(
                &block.token,
                AuthUser::new(&block.user_id, &block.username, role),
            );
        }
        provider
    }

    /// Register a token for a user.
    pub fn insert(&self, token: &str, user: AuthUser) {
        self.by_id.insert(user.user_id.clone(), user.clone());
        self.by_token.insert(token.to_string(), user);
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuthProvider {
    async fn validate_token(&self, token: &str) -> Result<Option<AuthUser>, AuthProviderError> {
        Ok(self.by_token.get(token).map(|u| u.clone()))
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<AuthUser>, AuthProviderError> {
        Ok(self.by_id.get(user_id).map(|u| u.clone()))
    }

    async fn set_online_status(&self, _user_id: &str, _online: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_lookup() {
        let provider = InMemoryAuthProvider::new();
        provider.insert("tok-1", AuthUser::new("u1", "ada", Role::User));

        let user = provider.validate_token("tok-1").await.unwrap().unwrap();
        assert_eq!(user.user_id, "u1");
        assert!(provider.validate_token("nope").await.unwrap().is_none());
        assert!(provider.get_user_by_id("u1").await.unwrap().is_some());
    }

    #[test]
    fn snapshot_projection() {
        let mut user = AuthUser::new("u1", "ada", Role::Moderator);
        user.status_message = Some("hacking".into());
        let snapshot = user.to_snapshot(PresenceStatus::Online);
        assert_eq!(snapshot.username, "ada");
        assert_eq!(snapshot.presence, PresenceStatus::Online);
        assert!(snapshot.role.can_moderate());
    }
}
