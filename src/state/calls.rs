//! 1:1 call state machine.
//!
//! Transition graph:
//!
//! ```text
//! Ringing -> InProgress (answer accept)
//! Ringing -> Declined   (answer decline)
//! Ringing -> Missed     (ring timeout)
//! Ringing | InProgress -> Ended (hang-up, disconnect)
//! ```
//!
//! Each user holds at most one non-terminal call; the per-user index is
//! maintained inside the same critical sections as the call table so
//! the invariant survives concurrent `StartCall`s. Terminal records
//! linger until their scheduled purge so a repeated `EndCall` stays
//! idempotent. Ring timeouts are scheduled tasks keyed by call id and
//! cancelled on any transition.

use chrono::Utc;
use dashmap::DashMap;
use palaver_proto::{Call, CallStatus};
use tokio::task::AbortHandle;
use uuid::Uuid;

use super::connections::{ConnId, UserId};

struct CallRecord {
    call: Call,
    caller_conn: ConnId,
    /// Set when the recipient answers; the answering device anchors the
    /// media path.
    recipient_conn: Option<ConnId>,
}

/// What a state transition produced, for broadcasting.
pub struct CallTransition {
    /// Snapshot after the transition.
    pub call: Call,
    /// The caller-side media anchor.
    pub caller_conn: ConnId,
    /// The recipient-side media anchor, if answered.
    pub recipient_conn: Option<ConnId>,
}

impl CallTransition {
    fn from_record(record: &CallRecord) -> Self {
        Self {
            call: record.call.clone(),
            caller_conn: record.caller_conn.clone(),
            recipient_conn: record.recipient_conn.clone(),
        }
    }

    /// The other endpoint's user id from one participant's view.
    pub fn peer_of(&self, user_id: &str) -> UserId {
        if self.call.caller_id == user_id {
            self.call.recipient_id.clone()
        } else {
            self.call.caller_id.clone()
        }
    }
}

/// 1:1 call table.
#[derive(Default)]
pub struct CallManager {
    calls: DashMap<String, CallRecord>,
    /// user -> active (non-terminal) call.
    active: DashMap<UserId, String>,
    /// Pending ring-timeout tasks, aborted on transition.
    ring_timers: DashMap<String, AbortHandle>,
}

impl CallManager {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ringing call. Fails when either party already has an
    /// active call.
    pub fn start(
        &self,
        caller_id: &str,
        caller_name: &str,
        caller_conn: &str,
        recipient_id: &str,
        recipient_name: &str,
    ) -> Result<Call, &'static str> {
        if caller_id == recipient_id {
            return Err("Cannot call yourself");
        }
        // Reserve the caller slot first; entry() makes the reservation
        // atomic against a concurrent StartCall from the same user.
        let call_id = Uuid::new_v4().to_string();
        match self.active.entry(caller_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err("You are already in a call");
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(call_id.clone());
            }
        }
        match self.active.entry(recipient_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                self.active.remove(caller_id);
                return Err("User is already in a call");
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(call_id.clone());
            }
        }

        let call = Call {
            id: call_id.clone(),
            caller_id: caller_id.to_string(),
            recipient_id: recipient_id.to_string(),
            caller_name: caller_name.to_string(),
            recipient_name: recipient_name.to_string(),
            status: CallStatus::Ringing,
            started_at: Utc::now(),
            answered_at: None,
            duration_secs: None,
        };
        self.calls.insert(
            call_id,
            CallRecord {
                call: call.clone(),
                caller_conn: caller_conn.to_string(),
                recipient_conn: None,
            },
        );
        crate::metrics::ACTIVE_CALLS.inc();
        Ok(call)
    }

    /// Answer a ringing call. Only the recipient may answer; the
    /// answering connection becomes the media anchor.
    pub fn answer(
        &self,
        call_id: &str,
        user_id: &str,
        conn_id: &str,
        accept: bool,
    ) -> Result<CallTransition, &'static str> {
        let transition = {
            let mut record = self.calls.get_mut(call_id).ok_or("Call not found")?;
            if record.call.recipient_id != user_id {
                return Err("Only the call recipient can answer");
            }
            if record.call.status != CallStatus::Ringing {
                return Err("Call is no longer ringing");
            }
            if accept {
                record.call.status = CallStatus::InProgress;
                record.call.answered_at = Some(Utc::now());
                record.recipient_conn = Some(conn_id.to_string());
            } else {
                record.call.status = CallStatus::Declined;
            }
            CallTransition::from_record(&record)
        };
        self.cancel_ring_timer(call_id);
        if !accept {
            self.release(call_id);
        }
        Ok(transition)
    }

    /// Hang up. Idempotent on calls that already ended.
    pub fn end(&self, call_id: &str, user_id: &str) -> Result<CallTransition, &'static str> {
        let transition = {
            let mut record = self.calls.get_mut(call_id).ok_or("Call not found")?;
            if record.call.caller_id != user_id && record.call.recipient_id != user_id {
                return Err("Not a participant of this call");
            }
            if record.call.status.is_active() {
                Self::finish(&mut record.call, CallStatus::Ended);
            }
            CallTransition::from_record(&record)
        };
        self.cancel_ring_timer(call_id);
        self.release(call_id);
        Ok(transition)
    }

    /// Ring timeout: `Ringing -> Missed`. Returns `None` when the call
    /// already left the ringing state.
    pub fn timeout_ring(&self, call_id: &str) -> Option<CallTransition> {
        let transition = {
            let mut record = self.calls.get_mut(call_id)?;
            if record.call.status != CallStatus::Ringing {
                return None;
            }
            Self::finish(&mut record.call, CallStatus::Missed);
            CallTransition::from_record(&record)
        };
        // The firing timer removes its own registration.
        self.ring_timers.remove(call_id);
        self.release(call_id);
        Some(transition)
    }

    /// Disconnect handling. Ends the user's call when the dropped
    /// connection anchored it, or when a ringing participant lost their
    /// last connection.
    pub fn handle_disconnect(
        &self,
        user_id: &str,
        conn_id: &str,
        last_connection: bool,
    ) -> Option<CallTransition> {
        let call_id = self.active.get(user_id).map(|c| c.clone())?;
        let transition = {
            let mut record = self.calls.get_mut(&call_id)?;
            let anchored = record.caller_conn == conn_id
                || record.recipient_conn.as_deref() == Some(conn_id);
            let ringing_recipient_gone = record.call.status == CallStatus::Ringing
                && record.call.recipient_id == user_id
                && last_connection;
            let ringing_caller_gone =
                record.call.status == CallStatus::Ringing && record.caller_conn == conn_id;
            if !(record.call.status == CallStatus::InProgress && anchored)
                && !ringing_recipient_gone
                && !ringing_caller_gone
            {
                return None;
            }
            Self::finish(&mut record.call, CallStatus::Ended);
            CallTransition::from_record(&record)
        };
        self.cancel_ring_timer(&call_id);
        self.release(&call_id);
        Some(transition)
    }

    /// Media gating: the peer connection to forward to, iff the call is
    /// in progress and the sender is one of its anchors.
    pub fn relay_target(&self, call_id: &str, sender_conn: &str) -> Option<ConnId> {
        let record = self.calls.get(call_id)?;
        if record.call.status != CallStatus::InProgress {
            return None;
        }
        let recipient_conn = record.recipient_conn.as_deref()?;
        if record.caller_conn == sender_conn {
            Some(recipient_conn.to_string())
        } else if recipient_conn == sender_conn {
            Some(record.caller_conn.clone())
        } else {
            None
        }
    }

    /// Current snapshot of a call.
    pub fn get(&self, call_id: &str) -> Option<Call> {
        self.calls.get(call_id).map(|r| r.call.clone())
    }

    /// The user's active call id, if any.
    pub fn active_call_of(&self, user_id: &str) -> Option<String> {
        self.active.get(user_id).map(|c| c.clone())
    }

    /// Attach a ring-timeout task's abort handle.
    pub fn register_ring_timer(&self, call_id: &str, handle: AbortHandle) {
        self.ring_timers.insert(call_id.to_string(), handle);
    }

    /// Drop a lingering terminal record. Scheduled by handlers a little
    /// after the terminal transition; a no-op while the call is live.
    pub fn purge_terminal(&self, call_id: &str) {
        self.calls
            .remove_if(call_id, |_, r| !r.call.status.is_active());
    }

    fn cancel_ring_timer(&self, call_id: &str) {
        if let Some((_, handle)) = self.ring_timers.remove(call_id) {
            handle.abort();
        }
    }

    /// Free both participants' active slots. Idempotent: the gauge
    /// moves only when a slot is actually released.
    fn release(&self, call_id: &str) {
        let Some(record) = self.calls.get(call_id) else {
            return;
        };
        let caller = record.call.caller_id.clone();
        let recipient = record.call.recipient_id.clone();
        drop(record);
        let freed = self.active.remove_if(&caller, |_, c| c == call_id).is_some();
        self.active.remove_if(&recipient, |_, c| c == call_id);
        if freed {
            crate::metrics::ACTIVE_CALLS.dec();
        }
    }

    fn finish(call: &mut Call, status: CallStatus) {
        call.status = status;
        if let Some(answered) = call.answered_at {
            call.duration_secs = Some((Utc::now() - answered).num_seconds().max(0) as u64);
        }
    }
}
