//! User presence tracking.
//!
//! A user is online iff their connection set is non-empty. Each entry
//! caches a profile snapshot: the most-recently-seen projection from
//! the auth collaborator, refreshed on profile updates and never
//! authoritative.

use dashmap::DashMap;
use palaver_proto::{PresenceStatus, ProfilePatch, Role, UserSnapshot};
use std::collections::HashSet;

use super::connections::{ConnId, UserId};

struct UserPresence {
    connections: HashSet<ConnId>,
    snapshot: UserSnapshot,
}

/// Presence table keyed by user id.
#[derive(Default)]
pub struct PresenceManager {
    users: DashMap<UserId, UserPresence>,
}

impl PresenceManager {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an authenticated connection. Returns `true` when this is
    /// the user's first live connection (they just came online).
    pub fn add_connection(&self, user_id: &str, conn_id: &str, snapshot: UserSnapshot) -> bool {
        let mut first = false;
        let mut entry = self
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| {
                first = true;
                UserPresence {
                    connections: HashSet::new(),
                    snapshot,
                }
            });
        entry.connections.insert(conn_id.to_string());
        entry.snapshot.presence = PresenceStatus::Online;
        if first {
            crate::metrics::ONLINE_USERS.inc();
        }
        first
    }

    /// Drop a connection from a user's set. Returns `true` when it was
    /// the last one (the user just went offline).
    pub fn remove_connection(&self, user_id: &str, conn_id: &str) -> bool {
        let emptied = match self.users.get_mut(user_id) {
            Some(mut entry) => {
                entry.connections.remove(conn_id);
                entry.connections.is_empty()
            }
            None => return false,
        };
        if emptied {
            self.users.remove(user_id);
            crate::metrics::ONLINE_USERS.dec();
        }
        emptied
    }

    /// Whether the user has at least one live connection.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    /// All live connections of a user.
    pub fn connections_of(&self, user_id: &str) -> Vec<ConnId> {
        self.users
            .get(user_id)
            .map(|e| e.connections.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of live connections of a user.
    pub fn connection_count(&self, user_id: &str) -> usize {
        self.users
            .get(user_id)
            .map(|e| e.connections.len())
            .unwrap_or(0)
    }

    /// The cached snapshot, if the user is online.
    pub fn snapshot(&self, user_id: &str) -> Option<UserSnapshot> {
        self.users.get(user_id).map(|e| e.snapshot.clone())
    }

    /// The cached role, defaulting to the lowest privilege when the
    /// user is unknown.
    pub fn role_of(&self, user_id: &str) -> Role {
        self.users
            .get(user_id)
            .map(|e| e.snapshot.role)
            .unwrap_or_default()
    }

    /// Presence as seen by other users.
    pub fn presence_of(&self, user_id: &str) -> PresenceStatus {
        self.users
            .get(user_id)
            .map(|e| e.snapshot.presence)
            .unwrap_or(PresenceStatus::Offline)
    }

    /// Apply a profile patch to the cached snapshot, returning the
    /// refreshed projection.
    pub fn apply_patch(&self, user_id: &str, patch: &ProfilePatch) -> Option<UserSnapshot> {
        let mut entry = self.users.get_mut(user_id)?;
        let snapshot = &mut entry.snapshot;
        if let Some(username) = &patch.username {
            snapshot.username = username.clone();
        }
        if let Some(avatar) = &patch.avatar_url {
            snapshot.avatar_url = Some(avatar.clone());
        }
        if let Some(banner) = &patch.banner_url {
            snapshot.banner_url = Some(banner.clone());
        }
        if let Some(status) = &patch.status_message {
            snapshot.status_message = Some(status.clone());
        }
        if let Some(color) = &patch.accent_color {
            snapshot.accent_color = Some(color.clone());
        }
        snapshot.last_updated = chrono::Utc::now();
        Some(snapshot.clone())
    }

    /// Replace the cached snapshot wholesale (cross-hub profile pushes).
    pub fn replace_snapshot(&self, user_id: &str, snapshot: UserSnapshot) {
        if let Some(mut entry) = self.users.get_mut(user_id) {
            entry.snapshot = snapshot;
        }
    }

    /// Snapshots of everyone currently online.
    pub fn online_snapshots(&self) -> Vec<UserSnapshot> {
        self.users.iter().map(|e| e.snapshot.clone()).collect()
    }

    /// Number of online users.
    pub fn online_count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthUser;

    fn snapshot(user_id: &str) -> UserSnapshot {
        AuthUser::new(user_id, user_id, Role::User).to_snapshot(PresenceStatus::Online)
    }

    #[test]
    fn online_iff_connections_nonempty() {
        let presence = PresenceManager::new();

        assert!(presence.add_connection("u1", "c1", snapshot("u1")));
        assert!(!presence.add_connection("u1", "c2", snapshot("u1")));
        assert!(presence.is_online("u1"));
        assert_eq!(presence.connection_count("u1"), 2);

        assert!(!presence.remove_connection("u1", "c1"));
        assert!(presence.is_online("u1"));
        assert!(presence.remove_connection("u1", "c2"));
        assert!(!presence.is_online("u1"));
        assert_eq!(presence.presence_of("u1"), PresenceStatus::Offline);
    }

    #[test]
    fn patch_refreshes_snapshot() {
        let presence = PresenceManager::new();
        presence.add_connection("u1", "c1", snapshot("u1"));

        let patch = ProfilePatch {
            username: Some("new-name".into()),
            status_message: Some("brb".into()),
            ..Default::default()
        };
        let updated = presence.apply_patch("u1", &patch).unwrap();
        assert_eq!(updated.username, "new-name");
        assert_eq!(updated.status_message.as_deref(), Some("brb"));
        // Cached for later readers too.
        assert_eq!(presence.snapshot("u1").unwrap().username, "new-name");
    }

    #[test]
    fn remove_tolerates_unknown_user() {
        let presence = PresenceManager::new();
        assert!(!presence.remove_connection("ghost", "c1"));
    }
}
