//! N-way group calls.
//!
//! A group call starts with the host alone (`Starting`), becomes
//! `Active` on the first invitee join, and ends when the host leaves or
//! the participant map empties. Media rides the `groupcall_<id>` group;
//! this manager owns membership and the invite set.

use dashmap::DashMap;
use palaver_proto::{GroupCall, GroupCallParticipant, GroupCallStatus};
use std::collections::HashSet;
use uuid::Uuid;

use super::connections::{ConnId, UserId};

struct GroupCallRecord {
    call: GroupCall,
    /// Users invited but not yet joined; each receives the invite once.
    invited: HashSet<UserId>,
}

/// What a leave (or disconnect) did to the call.
pub struct GroupLeaveOutcome {
    pub call_id: String,
    pub user_id: UserId,
    /// The call ended (host left or the room emptied).
    pub ended: bool,
    /// Human-facing end reason, when ended.
    pub reason: Option<&'static str>,
    /// Post-transition snapshot; `None` when the call was removed.
    pub call: Option<GroupCall>,
    /// Connections that were in the call at transition time, for
    /// notifying after an end.
    pub member_conns: Vec<ConnId>,
}

/// Group call table.
#[derive(Default)]
pub struct GroupCallManager {
    calls: DashMap<String, GroupCallRecord>,
    /// user -> call they currently occupy.
    active: DashMap<UserId, String>,
}

impl GroupCallManager {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a call with the host as sole participant.
    pub fn start(
        &self,
        host: GroupCallParticipant,
        name: &str,
        invited: Vec<UserId>,
    ) -> Result<GroupCall, &'static str> {
        let host_id = host.user_id.clone();
        let call_id = Uuid::new_v4().to_string();
        match self.active.entry(host_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err("You are already in a call");
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(call_id.clone());
            }
        }

        let call = GroupCall {
            id: call_id.clone(),
            host_id: host_id.clone(),
            name: name.to_string(),
            status: GroupCallStatus::Starting,
            participants: vec![host],
        };
        self.calls.insert(
            call_id,
            GroupCallRecord {
                call: call.clone(),
                invited: invited
                    .into_iter()
                    .filter(|u| *u != host_id)
                    .collect(),
            },
        );
        crate::metrics::ACTIVE_GROUP_CALLS.inc();
        Ok(call)
    }

    /// Join a call. Returns the snapshot and whether this was the first
    /// join (`Starting -> Active`).
    pub fn join(
        &self,
        call_id: &str,
        participant: GroupCallParticipant,
    ) -> Result<(GroupCall, bool), &'static str> {
        let user_id = participant.user_id.clone();
        match self.active.entry(user_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err("You are already in a call");
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(call_id.to_string());
            }
        }

        let result = {
            match self.calls.get_mut(call_id) {
                Some(mut record) => {
                    if record.call.status == GroupCallStatus::Ended {
                        Err("Call has ended")
                    } else {
                        record.invited.remove(&user_id);
                        let activated = record.call.status == GroupCallStatus::Starting;
                        if activated {
                            record.call.status = GroupCallStatus::Active;
                        }
                        record.call.participants.push(participant);
                        Ok((record.call.clone(), activated))
                    }
                }
                None => Err("Call not found"),
            }
        };
        if result.is_err() {
            self.active.remove_if(&user_id, |_, c| c == call_id);
        }
        result
    }

    /// Remove a participant. Host leaving or an emptied map ends the
    /// call atomically with respect to concurrent joins.
    pub fn leave(&self, call_id: &str, user_id: &str) -> Option<GroupLeaveOutcome> {
        let outcome = {
            let mut record = self.calls.get_mut(call_id)?;
            let before = record.call.participants.len();
            record.call.participants.retain(|p| p.user_id != user_id);
            if record.call.participants.len() == before {
                return None;
            }

            let host_left = record.call.host_id == user_id;
            let emptied = record.call.participants.is_empty();
            let ended = host_left || emptied;
            if ended {
                record.call.status = GroupCallStatus::Ended;
            }
            GroupLeaveOutcome {
                call_id: call_id.to_string(),
                user_id: user_id.to_string(),
                ended,
                reason: if host_left {
                    Some("Host left the call")
                } else if emptied {
                    Some("All participants left")
                } else {
                    None
                },
                call: if ended { None } else { Some(record.call.clone()) },
                member_conns: record
                    .call
                    .participants
                    .iter()
                    .map(|p| p.connection_id.clone())
                    .collect(),
            }
        };
        self.active.remove_if(user_id, |_, c| c == call_id);
        if outcome.ended {
            self.remove_call(call_id);
        }
        Some(outcome)
    }

    /// Decline an invite; returns the host to notify. Only invited
    /// users can decline, and only once.
    pub fn decline(&self, call_id: &str, user_id: &str) -> Option<UserId> {
        let mut record = self.calls.get_mut(call_id)?;
        if record.invited.remove(user_id) {
            Some(record.call.host_id.clone())
        } else {
            None
        }
    }

    /// Add an invitee. Caller must be a participant.
    pub fn invite(
        &self,
        call_id: &str,
        actor: &str,
        target: &str,
    ) -> Result<GroupCall, &'static str> {
        let mut record = self.calls.get_mut(call_id).ok_or("Call not found")?;
        if !record.call.participants.iter().any(|p| p.user_id == actor) {
            return Err("Only participants can invite");
        }
        if record.call.participants.iter().any(|p| p.user_id == target) {
            return Err("User is already in the call");
        }
        record.invited.insert(target.to_string());
        Ok(record.call.clone())
    }

    /// Update a participant's speaking state.
    pub fn set_speaking(
        &self,
        call_id: &str,
        conn_id: &str,
        speaking: bool,
        level: u32,
    ) -> Option<GroupCall> {
        let mut record = self.calls.get_mut(call_id)?;
        let participant = record
            .call
            .participants
            .iter_mut()
            .find(|p| p.connection_id == conn_id)?;
        participant.speaking = speaking;
        participant.audio_level = level;
        Some(record.call.clone())
    }

    /// Whether the connection participates in the call (media gating).
    pub fn is_member_conn(&self, call_id: &str, conn_id: &str) -> bool {
        self.calls
            .get(call_id)
            .map(|r| {
                r.call
                    .participants
                    .iter()
                    .any(|p| p.connection_id == conn_id)
            })
            .unwrap_or(false)
    }

    /// Snapshot of a call.
    pub fn get(&self, call_id: &str) -> Option<GroupCall> {
        self.calls.get(call_id).map(|r| r.call.clone())
    }

    /// The call a user currently occupies.
    pub fn call_of_user(&self, user_id: &str) -> Option<String> {
        self.active.get(user_id).map(|c| c.clone())
    }

    /// Disconnect handling: leave whatever call the dropped connection
    /// anchored. Multi-device: only the connection that joined counts.
    pub fn handle_disconnect(&self, user_id: &str, conn_id: &str) -> Option<GroupLeaveOutcome> {
        let call_id = self.active.get(user_id).map(|c| c.clone())?;
        let joined_conn = self.calls.get(&call_id).and_then(|r| {
            r.call
                .participants
                .iter()
                .find(|p| p.user_id == user_id)
                .map(|p| p.connection_id.clone())
        })?;
        if joined_conn != conn_id {
            return None;
        }
        self.leave(&call_id, user_id)
    }

    fn remove_call(&self, call_id: &str) {
        if let Some((_, record)) = self.calls.remove(call_id) {
            for p in &record.call.participants {
                self.active.remove_if(&p.user_id, |_, c| c == call_id);
            }
            crate::metrics::ACTIVE_GROUP_CALLS.dec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(user: &str, conn: &str) -> GroupCallParticipant {
        GroupCallParticipant {
            user_id: user.into(),
            username: user.into(),
            avatar_url: None,
            connection_id: conn.into(),
            muted: false,
            deafened: false,
            speaking: false,
            audio_level: 0,
        }
    }

    #[test]
    fn first_join_activates() {
        let manager = GroupCallManager::new();
        let call = manager
            .start(participant("host", "ch"), "standup", vec!["u2".into()])
            .unwrap();
        assert_eq!(call.status, GroupCallStatus::Starting);

        let (call, activated) = manager.join(&call.id, participant("u2", "c2")).unwrap();
        assert!(activated);
        assert_eq!(call.status, GroupCallStatus::Active);
        assert_eq!(call.participants.len(), 2);
    }

    #[test]
    fn host_leave_ends_call_for_everyone() {
        let manager = GroupCallManager::new();
        let call = manager
            .start(participant("host", "ch"), "standup", vec![])
            .unwrap();
        manager.join(&call.id, participant("u2", "c2")).unwrap();

        let outcome = manager.leave(&call.id, "host").unwrap();
        assert!(outcome.ended);
        assert_eq!(outcome.reason, Some("Host left the call"));
        assert_eq!(outcome.member_conns, vec!["c2".to_string()]);
        assert!(manager.get(&call.id).is_none());
        // Remaining participant's slot is freed too.
        assert!(manager.call_of_user("u2").is_none());
    }

    #[test]
    fn non_host_leave_keeps_call_alive() {
        let manager = GroupCallManager::new();
        let call = manager
            .start(participant("host", "ch"), "standup", vec![])
            .unwrap();
        manager.join(&call.id, participant("u2", "c2")).unwrap();

        let outcome = manager.leave(&call.id, "u2").unwrap();
        assert!(!outcome.ended);
        assert_eq!(outcome.call.unwrap().participants.len(), 1);
        assert!(manager.get(&call.id).is_some());
    }

    #[test]
    fn decline_notifies_host_once() {
        let manager = GroupCallManager::new();
        let call = manager
            .start(participant("host", "ch"), "standup", vec!["u2".into()])
            .unwrap();
        assert_eq!(manager.decline(&call.id, "u2"), Some("host".to_string()));
        assert_eq!(manager.decline(&call.id, "u2"), None);
        // Uninvited users cannot decline.
        assert_eq!(manager.decline(&call.id, "u9"), None);
    }

    #[test]
    fn invite_requires_membership() {
        let manager = GroupCallManager::new();
        let call = manager
            .start(participant("host", "ch"), "standup", vec![])
            .unwrap();
        assert!(manager.invite(&call.id, "outsider", "u3").is_err());
        assert!(manager.invite(&call.id, "host", "u3").is_ok());
    }

    #[test]
    fn disconnect_of_media_conn_leaves_call() {
        let manager = GroupCallManager::new();
        let call = manager
            .start(participant("host", "ch"), "standup", vec![])
            .unwrap();
        manager.join(&call.id, participant("u2", "c2")).unwrap();

        // A different device of u2 dropping is ignored.
        assert!(manager.handle_disconnect("u2", "c2-other").is_none());
        let outcome = manager.handle_disconnect("u2", "c2").unwrap();
        assert!(!outcome.ended);

        // Host's media connection dropping ends the call.
        let outcome = manager.handle_disconnect("host", "ch").unwrap();
        assert!(outcome.ended);
    }
}
