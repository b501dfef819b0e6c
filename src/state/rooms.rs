//! Voice rooms.
//!
//! Rooms are first-class, discoverable audio spaces with a host and an
//! explicit lifecycle, unlike the lazy voice channels. All compound
//! transitions (join-if-capacity, host-transfer-or-close) run inside a
//! single map-entry critical section so concurrent joins cannot observe
//! an intermediate state. Password verification is CPU-bound and async,
//! so it happens between two entry sections; the join re-validates
//! everything after the hash check.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use palaver_proto::{RoomParticipant, VoiceRoom, VoiceRoomPage};
use uuid::Uuid;

use super::connections::{ConnId, UserId};

/// Room capacity clamp bounds.
pub const MIN_PARTICIPANTS: u32 = 2;

struct ParticipantState {
    user_id: UserId,
    username: String,
    avatar_url: Option<String>,
    conn_id: ConnId,
    joined_at: DateTime<Utc>,
}

struct RoomState {
    name: String,
    description: String,
    host_id: UserId,
    is_public: bool,
    password_hash: Option<String>,
    max_participants: u32,
    category: String,
    allow_screen_share: bool,
    created_at: DateTime<Utc>,
    is_active: bool,
    /// Join-ordered; host transfer picks the earliest remaining.
    participants: Vec<ParticipantState>,
    moderators: HashSet<UserId>,
}

impl RoomState {
    fn to_dto(&self, id: &str) -> VoiceRoom {
        VoiceRoom {
            id: id.to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            host_id: self.host_id.clone(),
            is_public: self.is_public,
            has_password: self.password_hash.is_some(),
            max_participants: self.max_participants,
            category: self.category.clone(),
            allow_screen_share: self.allow_screen_share,
            created_at: self.created_at,
            participant_count: self.participants.len() as u32,
            participants: self
                .participants
                .iter()
                .map(|p| RoomParticipant {
                    user_id: p.user_id.clone(),
                    username: p.username.clone(),
                    avatar_url: p.avatar_url.clone(),
                    is_host: p.user_id == self.host_id,
                    is_moderator: self.moderators.contains(&p.user_id),
                    joined_at: p.joined_at,
                })
                .collect(),
        }
    }
}

/// Parameters for creating a room.
pub struct VoiceRoomParams {
    pub name: String,
    pub description: String,
    pub is_public: bool,
    /// Already argon2-hashed by the caller, never plaintext.
    pub password_hash: Option<String>,
    pub max_participants: u32,
    pub category: String,
    pub allow_screen_share: bool,
}

/// Typed join failures, mapped to `VoiceRoomError` reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomJoinError {
    NotFound,
    Inactive,
    Full,
    PasswordRequired,
    PasswordMismatch,
    AlreadyJoined,
}

impl RoomJoinError {
    /// Wire-facing reason string.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound => "Room not found",
            Self::Inactive => "Room is no longer active",
            Self::Full => "Room is full",
            Self::PasswordRequired => "Room requires a password",
            Self::PasswordMismatch => "Incorrect password",
            Self::AlreadyJoined => "Already in this room",
        }
    }
}

/// What a leave (or disconnect) did to the room.
pub struct RoomLeaveOutcome {
    pub room_id: String,
    pub user_id: UserId,
    pub was_public: bool,
    /// Host moved to the earliest-joined remaining participant.
    pub new_host: Option<UserId>,
    /// Room emptied and was closed.
    pub closed: bool,
    /// Post-transition snapshot; `None` when the room closed.
    pub room: Option<VoiceRoom>,
}

/// Voice room registry.
#[derive(Default)]
pub struct VoiceRoomManager {
    rooms: DashMap<String, RoomState>,
    /// conn -> room reverse index for disconnect cleanup.
    occupancy: DashMap<ConnId, String>,
}

/// A participant's identity as supplied on join.
pub struct RoomJoiner {
    pub user_id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
    pub conn_id: ConnId,
}

impl VoiceRoomManager {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room with the creator as host and sole participant.
    /// The capacity is clamped to `MIN_PARTICIPANTS..=max_cap`.
    pub fn create(&self, host: RoomJoiner, params: VoiceRoomParams, max_cap: u32) -> VoiceRoom {
        let id = Uuid::new_v4().to_string();
        let state = RoomState {
            name: params.name,
            description: params.description,
            host_id: host.user_id.clone(),
            is_public: params.is_public,
            password_hash: params.password_hash,
            max_participants: params.max_participants.clamp(MIN_PARTICIPANTS, max_cap),
            category: params.category,
            allow_screen_share: params.allow_screen_share,
            created_at: Utc::now(),
            is_active: true,
            participants: vec![ParticipantState {
                user_id: host.user_id,
                username: host.username,
                avatar_url: host.avatar_url,
                conn_id: host.conn_id.clone(),
                joined_at: Utc::now(),
            }],
            moderators: HashSet::new(),
        };
        let dto = state.to_dto(&id);
        self.rooms.insert(id.clone(), state);
        self.occupancy.insert(host.conn_id, id);
        crate::metrics::ACTIVE_VOICE_ROOMS.inc();
        dto
    }

    /// The stored password hash, for out-of-lock verification.
    /// `Err` carries the same early failures a join would hit.
    pub fn password_hash(&self, room_id: &str) -> Result<Option<String>, RoomJoinError> {
        let room = self.rooms.get(room_id).ok_or(RoomJoinError::NotFound)?;
        if !room.is_active {
            return Err(RoomJoinError::Inactive);
        }
        Ok(room.password_hash.clone())
    }

    /// Join a room. `password_verified` reports the outcome of the
    /// argon2 check done outside the lock; everything else is
    /// re-validated here atomically.
    pub fn join(
        &self,
        room_id: &str,
        joiner: RoomJoiner,
        password_verified: bool,
    ) -> Result<VoiceRoom, RoomJoinError> {
        let mut room = self.rooms.get_mut(room_id).ok_or(RoomJoinError::NotFound)?;
        if !room.is_active {
            return Err(RoomJoinError::Inactive);
        }
        if room.password_hash.is_some() && !password_verified {
            return Err(RoomJoinError::PasswordMismatch);
        }
        if room.participants.iter().any(|p| p.user_id == joiner.user_id) {
            return Err(RoomJoinError::AlreadyJoined);
        }
        if room.participants.len() as u32 >= room.max_participants {
            return Err(RoomJoinError::Full);
        }
        room.participants.push(ParticipantState {
            user_id: joiner.user_id,
            username: joiner.username,
            avatar_url: joiner.avatar_url,
            conn_id: joiner.conn_id.clone(),
            joined_at: Utc::now(),
        });
        let dto = room.to_dto(room_id);
        drop(room);
        self.occupancy.insert(joiner.conn_id, room_id.to_string());
        Ok(dto)
    }

    /// Remove a user from a room, transferring host to the earliest
    /// remaining participant or closing an emptied room. The whole
    /// transition is atomic with respect to concurrent joins.
    pub fn leave(&self, room_id: &str, user_id: &str) -> Option<RoomLeaveOutcome> {
        let (outcome, removed_conn) = {
            let mut room = self.rooms.get_mut(room_id)?;
            let idx = room.participants.iter().position(|p| p.user_id == user_id)?;
            let removed = room.participants.remove(idx);
            room.moderators.remove(user_id);

            let was_host = room.host_id == user_id;
            let mut new_host = None;
            let closed = if room.participants.is_empty() {
                room.is_active = false;
                true
            } else {
                if was_host {
                    let next = room.participants[0].user_id.clone();
                    room.host_id = next.clone();
                    new_host = Some(next);
                }
                false
            };

            (
                RoomLeaveOutcome {
                    room_id: room_id.to_string(),
                    user_id: user_id.to_string(),
                    was_public: room.is_public,
                    new_host,
                    closed,
                    room: if closed { None } else { Some(room.to_dto(room_id)) },
                },
                removed.conn_id,
            )
        };
        self.occupancy.remove(&removed_conn);
        if outcome.closed {
            self.rooms.remove(room_id);
            crate::metrics::ACTIVE_VOICE_ROOMS.dec();
        }
        Some(outcome)
    }

    /// Close a room outright (host action). Returns the final snapshot
    /// and the participant connections to notify.
    pub fn close(&self, room_id: &str, actor: &str) -> Result<(VoiceRoom, Vec<ConnId>), &'static str> {
        {
            let room = self.rooms.get(room_id).ok_or("Room not found")?;
            if room.host_id != actor {
                return Err("Only the host can close the room");
            }
        }
        let (_, room) = self.rooms.remove(room_id).ok_or("Room not found")?;
        let conns: Vec<ConnId> = room.participants.iter().map(|p| p.conn_id.clone()).collect();
        for conn in &conns {
            self.occupancy.remove(conn);
        }
        crate::metrics::ACTIVE_VOICE_ROOMS.dec();
        Ok((room.to_dto(room_id), conns))
    }

    /// Kick a participant (host or moderator action). Returns the
    /// kicked user's connection.
    pub fn kick(&self, room_id: &str, actor: &str, target: &str) -> Result<ConnId, &'static str> {
        let conn = {
            let mut room = self.rooms.get_mut(room_id).ok_or("Room not found")?;
            if room.host_id != actor && !room.moderators.contains(actor) {
                return Err("Only the host or a moderator can kick");
            }
            if room.host_id == target {
                return Err("The host cannot be kicked");
            }
            let idx = room
                .participants
                .iter()
                .position(|p| p.user_id == target)
                .ok_or("User is not in the room")?;
            let removed = room.participants.remove(idx);
            room.moderators.remove(target);
            removed.conn_id
        };
        self.occupancy.remove(&conn);
        Ok(conn)
    }

    /// Promote a participant to moderator (host action).
    pub fn promote(&self, room_id: &str, actor: &str, target: &str) -> Result<VoiceRoom, &'static str> {
        let mut room = self.rooms.get_mut(room_id).ok_or("Room not found")?;
        if room.host_id != actor {
            return Err("Only the host can promote moderators");
        }
        if !room.participants.iter().any(|p| p.user_id == target) {
            return Err("User is not in the room");
        }
        room.moderators.insert(target.to_string());
        Ok(room.to_dto(room_id))
    }

    /// Room snapshot.
    pub fn room(&self, room_id: &str) -> Option<VoiceRoom> {
        self.rooms.get(room_id).map(|r| r.to_dto(room_id))
    }

    /// Whether screen sharing is allowed in the room.
    pub fn allows_screen_share(&self, room_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .map(|r| r.allow_screen_share)
            .unwrap_or(false)
    }

    /// The room a connection currently occupies.
    pub fn room_of_conn(&self, conn_id: &str) -> Option<(String, UserId)> {
        let room_id = self.occupancy.get(conn_id).map(|r| r.clone())?;
        let user_id = self
            .rooms
            .get(&room_id)?
            .participants
            .iter()
            .find(|p| p.conn_id == conn_id)
            .map(|p| p.user_id.clone())?;
        Some((room_id, user_id))
    }

    /// Public rooms, filtered and paginated, ordered by occupancy then
    /// creation time.
    pub fn public_rooms(
        &self,
        category: Option<&str>,
        query: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> VoiceRoomPage {
        let needle = query.map(str::to_lowercase);
        let mut rooms: Vec<VoiceRoom> = self
            .rooms
            .iter()
            .filter(|entry| entry.is_public && entry.is_active)
            .filter(|entry| category.map(|c| entry.category == c).unwrap_or(true))
            .filter(|entry| {
                needle
                    .as_deref()
                    .map(|q| entry.name.to_lowercase().contains(q))
                    .unwrap_or(true)
            })
            .map(|entry| entry.to_dto(entry.key()))
            .collect();
        rooms.sort_by(|a, b| {
            b.participant_count
                .cmp(&a.participant_count)
                .then(a.created_at.cmp(&b.created_at))
        });

        let total = rooms.len() as u32;
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let start = ((page - 1) * page_size) as usize;
        let rooms = rooms
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();
        VoiceRoomPage {
            rooms,
            page,
            page_size,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joiner(user: &str, conn: &str) -> RoomJoiner {
        RoomJoiner {
            user_id: user.into(),
            username: user.into(),
            avatar_url: None,
            conn_id: conn.into(),
        }
    }

    fn params(name: &str, public: bool, max: u32) -> VoiceRoomParams {
        VoiceRoomParams {
            name: name.into(),
            description: String::new(),
            is_public: public,
            password_hash: None,
            max_participants: max,
            category: "general".into(),
            allow_screen_share: true,
        }
    }

    fn manager_with_room(max: u32) -> (VoiceRoomManager, String) {
        let manager = VoiceRoomManager::new();
        let room = manager.create(joiner("host", "c-host"), params("lounge", true, max), 50);
        (manager, room.id)
    }

    #[test]
    fn capacity_is_clamped() {
        let manager = VoiceRoomManager::new();
        let room = manager.create(joiner("h", "c1"), params("a", true, 500), 50);
        assert_eq!(room.max_participants, 50);
        let room = manager.create(joiner("h2", "c2"), params("b", true, 0), 50);
        assert_eq!(room.max_participants, MIN_PARTICIPANTS);
    }

    #[test]
    fn join_respects_capacity_exactly() {
        let (manager, id) = manager_with_room(3);
        assert!(manager.join(&id, joiner("u2", "c2"), true).is_ok());
        assert!(manager.join(&id, joiner("u3", "c3"), true).is_ok());
        assert_eq!(
            manager.join(&id, joiner("u4", "c4"), true).unwrap_err(),
            RoomJoinError::Full
        );
        assert_eq!(manager.room(&id).unwrap().participant_count, 3);
    }

    #[test]
    fn host_leave_transfers_to_earliest_joined() {
        let (manager, id) = manager_with_room(10);
        manager.join(&id, joiner("u2", "c2"), true).unwrap();
        manager.join(&id, joiner("u3", "c3"), true).unwrap();

        let outcome = manager.leave(&id, "host").unwrap();
        assert_eq!(outcome.new_host.as_deref(), Some("u2"));
        assert!(!outcome.closed);
        let room = outcome.room.unwrap();
        assert_eq!(room.host_id, "u2");
        assert!(room.participants.iter().any(|p| p.is_host && p.user_id == "u2"));
    }

    #[test]
    fn last_leave_closes_room() {
        let (manager, id) = manager_with_room(10);
        let outcome = manager.leave(&id, "host").unwrap();
        assert!(outcome.closed);
        assert!(outcome.room.is_none());
        assert!(manager.room(&id).is_none());
    }

    #[test]
    fn password_rooms_reject_failed_verification() {
        let manager = VoiceRoomManager::new();
        let mut p = params("secret", false, 10);
        p.password_hash = Some("$argon2id$fake".into());
        let room = manager.create(joiner("h", "c1"), p, 50);

        assert_eq!(
            manager.join(&room.id, joiner("u2", "c2"), false).unwrap_err(),
            RoomJoinError::PasswordMismatch
        );
        assert!(manager.join(&room.id, joiner("u2", "c2"), true).is_ok());
    }

    #[test]
    fn kick_requires_privilege_and_spares_host() {
        let (manager, id) = manager_with_room(10);
        manager.join(&id, joiner("u2", "c2"), true).unwrap();
        manager.join(&id, joiner("u3", "c3"), true).unwrap();

        assert!(manager.kick(&id, "u2", "u3").is_err());
        manager.promote(&id, "host", "u2").unwrap();
        assert!(manager.kick(&id, "u2", "host").is_err());
        assert_eq!(manager.kick(&id, "u2", "u3").unwrap(), "c3");
        assert_eq!(manager.room(&id).unwrap().participant_count, 2);
    }

    #[test]
    fn public_listing_orders_by_occupancy() {
        let manager = VoiceRoomManager::new();
        let quiet = manager.create(joiner("h1", "c1"), params("quiet", true, 10), 50);
        let busy = manager.create(joiner("h2", "c2"), params("busy", true, 10), 50);
        manager.join(&busy.id, joiner("u3", "c3"), true).unwrap();

        let page = manager.public_rooms(None, None, 1, 10);
        assert_eq!(page.total, 2);
        assert_eq!(page.rooms[0].id, busy.id);
        assert_eq!(page.rooms[1].id, quiet.id);

        // Private rooms never listed.
        manager.create(joiner("h4", "c4"), params("hidden", false, 10), 50);
        assert_eq!(manager.public_rooms(None, None, 1, 10).total, 2);

        // Query filter.
        let page = manager.public_rooms(None, Some("bus"), 1, 10);
        assert_eq!(page.total, 1);
    }

    #[test]
    fn disconnect_lookup_via_occupancy() {
        let (manager, id) = manager_with_room(10);
        manager.join(&id, joiner("u2", "c2"), true).unwrap();
        assert_eq!(
            manager.room_of_conn("c2"),
            Some((id.clone(), "u2".to_string()))
        );
        manager.leave(&id, "u2").unwrap();
        assert_eq!(manager.room_of_conn("c2"), None);
    }
}
