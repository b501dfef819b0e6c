//! Group router: named fan-out sets.
//!
//! Groups are derived from per-connection subscriptions; hubs never
//! touch membership except through these operations. Group entries are
//! lazy: created on first subscribe, removed with the last member.
//!
//! Broadcast discipline: membership is snapshotted under the shard
//! lock, then frames are queued with no lock held. Queueing is
//! non-blocking, so a stalled consumer can never stall a fan-out.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use palaver_proto::ServerFrame;

use super::connections::{ConnId, ConnectionManager};

/// Named fan-out sets over connection ids.
pub struct GroupRouter {
    groups: DashMap<String, HashSet<ConnId>>,
    /// Reverse index for disconnect cleanup.
    memberships: DashMap<ConnId, HashSet<String>>,
    connections: Arc<ConnectionManager>,
}

impl GroupRouter {
    /// Router fanning out through the given connection registry.
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self {
            groups: DashMap::new(),
            memberships: DashMap::new(),
            connections,
        }
    }

    /// Add a connection to a group.
    pub fn subscribe(&self, conn_id: &str, group: &str) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(conn_id.to_string());
        self.memberships
            .entry(conn_id.to_string())
            .or_default()
            .insert(group.to_string());
    }

    /// Remove a connection from a group, GCing an emptied group.
    pub fn unsubscribe(&self, conn_id: &str, group: &str) {
        let emptied = match self.groups.get_mut(group) {
            Some(mut members) => {
                members.remove(conn_id);
                members.is_empty()
            }
            None => false,
        };
        if emptied {
            self.groups.remove_if(group, |_, members| members.is_empty());
        }
        if let Some(mut groups) = self.memberships.get_mut(conn_id) {
            groups.remove(group);
        }
    }

    /// Whether a connection is subscribed to a group.
    pub fn is_member(&self, conn_id: &str, group: &str) -> bool {
        self.groups
            .get(group)
            .map(|members| members.contains(conn_id))
            .unwrap_or(false)
    }

    /// Membership snapshot of a group.
    pub fn members(&self, group: &str) -> Vec<ConnId> {
        self.groups
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of members in a group.
    pub fn member_count(&self, group: &str) -> usize {
        self.groups.get(group).map(|m| m.len()).unwrap_or(0)
    }

    /// Queue an event to every member of a group.
    pub fn broadcast(&self, group: &str, frame: ServerFrame) {
        self.broadcast_arc(group, &Arc::new(frame), None);
    }

    /// Queue an event to every member except one connection (typically
    /// the sender).
    pub fn broadcast_except(&self, group: &str, frame: ServerFrame, exclude: &str) {
        self.broadcast_arc(group, &Arc::new(frame), Some(exclude));
    }

    /// Shared-frame fan-out used by both broadcast flavours.
    pub fn broadcast_arc(&self, group: &str, frame: &Arc<ServerFrame>, exclude: Option<&str>) {
        let members = self.members(group);
        for conn_id in members {
            if Some(conn_id.as_str()) == exclude {
                continue;
            }
            self.connections.send_to_conn(&conn_id, frame.clone());
        }
    }

    /// Queue an event to every live connection on the server.
    pub fn broadcast_all(&self, frame: ServerFrame) {
        self.connections.send_to_all(Arc::new(frame));
    }

    /// Drop a connection from every group it joined; returns the groups
    /// it was removed from.
    pub fn remove_connection(&self, conn_id: &str) -> Vec<String> {
        let groups: Vec<String> = self
            .memberships
            .remove(conn_id)
            .map(|(_, set)| set.into_iter().collect())
            .unwrap_or_default();
        for group in &groups {
            let emptied = match self.groups.get_mut(group) {
                Some(mut members) => {
                    members.remove(conn_id);
                    members.is_empty()
                }
                None => false,
            };
            if emptied {
                self.groups.remove_if(group, |_, members| members.is_empty());
            }
        }
        groups
    }

    /// Groups a connection is currently subscribed to.
    pub fn groups_of(&self, conn_id: &str) -> Vec<String> {
        self.memberships
            .get(conn_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}
