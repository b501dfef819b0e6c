//! Connection registry.
//!
//! Maps connection ids to live transport sessions, their handshake
//! state, and their outbound queues. A user may hold many connections
//! (multi-device fan-in); the user-id on a record is set at most once
//! and never cleared.

use std::time::Instant;

use dashmap::DashMap;
use palaver_proto::ServerFrame;
use std::sync::Arc;

use super::outbound::OutboundHandle;

/// Opaque connection identifier (UUID string).
pub type ConnId = String;

/// Opaque user identifier, owned by the auth collaborator.
pub type UserId = String;

/// One live transport session.
pub struct ConnectionRecord {
    /// Bound user; `None` until authentication completes.
    pub user_id: Option<UserId>,
    /// Fresh opaque value minted per successful authentication.
    pub session_id: Option<String>,
    /// When the transport accepted the connection.
    pub handshake_at: Instant,
    /// Last inbound activity (any frame, including `Ping`).
    pub last_seen: Instant,
    /// The connection's serialized outbound queue.
    pub outbound: OutboundHandle,
}

/// Registry of live connections.
#[derive(Default)]
pub struct ConnectionManager {
    connections: DashMap<ConnId, ConnectionRecord>,
}

impl ConnectionManager {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted connection in handshake state.
    pub fn register(&self, conn_id: &str, outbound: OutboundHandle) {
        let now = Instant::now();
        self.connections.insert(
            conn_id.to_string(),
            ConnectionRecord {
                user_id: None,
                session_id: None,
                handshake_at: now,
                last_seen: now,
                outbound,
            },
        );
        crate::metrics::OPEN_CONNECTIONS.inc();
    }

    /// Bind an authenticated user to a connection. The binding is
    /// permanent for the connection's lifetime; a second bind fails.
    pub fn bind_user(&self, conn_id: &str, user_id: &str, session_id: &str) -> bool {
        match self.connections.get_mut(conn_id) {
            Some(mut record) if record.user_id.is_none() => {
                record.user_id = Some(user_id.to_string());
                record.session_id = Some(session_id.to_string());
                true
            }
            _ => false,
        }
    }

    /// The user bound to a connection, if authenticated.
    pub fn user_of(&self, conn_id: &str) -> Option<UserId> {
        self.connections
            .get(conn_id)
            .and_then(|r| r.user_id.clone())
    }

    /// Whether the connection exists and has authenticated.
    pub fn is_authenticated(&self, conn_id: &str) -> bool {
        self.connections
            .get(conn_id)
            .map(|r| r.user_id.is_some())
            .unwrap_or(false)
    }

    /// Age of the connection's handshake.
    pub fn handshake_age(&self, conn_id: &str) -> Option<std::time::Duration> {
        self.connections
            .get(conn_id)
            .map(|r| r.handshake_at.elapsed())
    }

    /// Time since the connection's last inbound activity.
    pub fn last_seen_age(&self, conn_id: &str) -> Option<std::time::Duration> {
        self.connections
            .get(conn_id)
            .map(|r| r.last_seen.elapsed())
    }

    /// Refresh the last-seen stamp.
    pub fn touch(&self, conn_id: &str) {
        if let Some(mut record) = self.connections.get_mut(conn_id) {
            record.last_seen = Instant::now();
        }
    }

    /// Queue a frame to one connection.
    pub fn send_to_conn(&self, conn_id: &str, frame: Arc<ServerFrame>) {
        if let Some(record) = self.connections.get(conn_id) {
            record.outbound.push(frame);
            crate::metrics::EVENTS_SENT.inc();
        }
    }

    /// Queue a frame to every live connection.
    pub fn send_to_all(&self, frame: Arc<ServerFrame>) {
        // Collect handles first so no shard lock is held while pushing.
        let handles: Vec<OutboundHandle> = self
            .connections
            .iter()
            .map(|r| r.outbound.clone())
            .collect();
        for handle in handles {
            handle.push(frame.clone());
            crate::metrics::EVENTS_SENT.inc();
        }
    }

    /// The outbound handle of a connection.
    pub fn outbound_of(&self, conn_id: &str) -> Option<OutboundHandle> {
        self.connections.get(conn_id).map(|r| r.outbound.clone())
    }

    /// Authenticated connections idle beyond the threshold.
    pub fn idle_connections(&self, threshold: std::time::Duration) -> Vec<ConnId> {
        self.connections
            .iter()
            .filter(|r| r.user_id.is_some() && r.last_seen.elapsed() > threshold)
            .map(|r| r.key().clone())
            .collect()
    }

    /// Remove a connection, returning its record.
    pub fn remove(&self, conn_id: &str) -> Option<ConnectionRecord> {
        let removed = self.connections.remove(conn_id).map(|(_, r)| r);
        if removed.is_some() {
            crate::metrics::OPEN_CONNECTIONS.dec();
        }
        removed
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
