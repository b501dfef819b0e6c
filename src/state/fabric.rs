//! The Fabric - central shared state for the hub daemon.
//!
//! The Fabric acts as a dependency-injection container and coordinator
//! for the domain managers that hold the actual hub state:
//! - [`ConnectionManager`]: transport sessions and outbound queues.
//! - [`PresenceManager`]: user online state and cached snapshots.
//! - [`GroupRouter`]: named fan-out sets.
//! - [`VoiceChannelManager`] / [`ScreenShareManager`] /
//!   [`VoiceRoomManager`] / [`CallManager`] / [`GroupCallManager`]:
//!   the voice hub registries.
//! - [`SubscriptionManager`]: content-feed preferences.
//!
//! # Lock discipline
//!
//! Managers use keyed concurrent maps; every critical section is
//! synchronous and short. Nothing awaits while holding a guard: the
//! pattern throughout is mutate-to-consistent, build the payload,
//! release, then broadcast.
//!
//! # Disconnect cleanup
//!
//! `disconnect` is the canonical teardown, used by the connection loop,
//! the idle sweep, and moderation. Order matters and every step must
//! tolerate partial state (a connection that never authenticated, a
//! user with other live devices):
//!
//! 1. End the connection's own screen share and notify its channel.
//! 2. Remove it from every viewer set.
//! 3. Purge its bandwidth buckets.
//! 4. Leave its voice channel (with channel GC).
//! 5. Leave its voice room (host transfer or closure).
//! 6. End any 1:1 or group call it anchored.
//! 7. Drop presence iff this was the user's last connection.
//! 8. Announce the departure (`UserLeft` + system Leave message).

use std::sync::Arc;

use chrono::Utc;
use palaver_proto::names::{event, group};
use palaver_proto::{args, ChatMessage, MessageKind, ServerFrame};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthProvider;
use crate::config::{Config, LimitsConfig};
use crate::repo::Repository;
use crate::security::RateLimitManager;

use super::calls::CallManager;
use super::connections::ConnectionManager;
use super::content::SubscriptionManager;
use super::group_calls::{GroupCallManager, GroupLeaveOutcome};
use super::groups::GroupRouter;
use super::presence::PresenceManager;
use super::rooms::{RoomLeaveOutcome, VoiceRoomManager};
use super::screenshare::ScreenShareManager;
use super::voice::VoiceChannelManager;

/// Lifecycle management state: shutdown signaling.
pub struct LifecycleManager {
    /// Shutdown signal broadcaster; every connection loop subscribes.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleManager {
    /// Fresh lifecycle state.
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self { shutdown_tx }
    }

    /// Subscribe a connection loop to shutdown.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown to every subscriber.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Central shared state container.
pub struct Fabric {
    /// Server name announced in the handshake.
    pub server_name: String,
    /// Policy knobs.
    pub limits: LimitsConfig,
    /// Transport session registry.
    pub connections: Arc<ConnectionManager>,
    /// User presence and cached snapshots.
    pub presence: PresenceManager,
    /// Named fan-out sets.
    pub groups: GroupRouter,
    /// Voice channel participants.
    pub voice: VoiceChannelManager,
    /// Screen shares and bandwidth ledgers.
    pub screen: ScreenShareManager,
    /// Voice rooms.
    pub rooms: VoiceRoomManager,
    /// 1:1 calls.
    pub calls: CallManager,
    /// Group calls.
    pub group_calls: GroupCallManager,
    /// Content-feed subscriptions.
    pub subscriptions: SubscriptionManager,
    /// Text-path flood protection.
    pub rate_limiter: RateLimitManager,
    /// Durable-state collaborator.
    pub repo: Arc<dyn Repository>,
    /// Auth collaborator.
    pub auth: Arc<dyn AuthProvider>,
    /// Shutdown signaling.
    pub lifecycle: LifecycleManager,
}

impl Fabric {
    /// Wire up a fabric from configuration and collaborators.
    pub fn new(
        config: &Config,
        repo: Arc<dyn Repository>,
        auth: Arc<dyn AuthProvider>,
    ) -> Arc<Self> {
        let connections = Arc::new(ConnectionManager::new());
        Arc::new(Self {
            server_name: config.server.name.clone(),
            limits: config.limits.clone(),
            groups: GroupRouter::new(connections.clone()),
            connections,
            presence: PresenceManager::new(),
            voice: VoiceChannelManager::new(),
            screen: ScreenShareManager::new(
                config.limits.upload_bytes_per_sec,
                config.limits.download_bytes_per_sec,
            ),
            rooms: VoiceRoomManager::new(),
            calls: CallManager::new(),
            group_calls: GroupCallManager::new(),
            subscriptions: SubscriptionManager::new(),
            rate_limiter: RateLimitManager::new(config.rate_limits.clone()),
            repo,
            auth,
            lifecycle: LifecycleManager::new(),
        })
    }

    /// Queue an event to every connection of one user.
    pub fn send_to_user(&self, user_id: &str, frame: ServerFrame) {
        let frame = Arc::new(frame);
        for conn_id in self.presence.connections_of(user_id) {
            self.connections.send_to_conn(&conn_id, frame.clone());
        }
    }

    /// Queue an event to one connection.
    pub fn send_to_conn(&self, conn_id: &str, frame: ServerFrame) {
        self.connections.send_to_conn(conn_id, Arc::new(frame));
    }

    /// Persist and broadcast a synthetic channel message (join/leave
    /// notices). Repository failures are logged, never surfaced: the
    /// notice still fans out.
    pub async fn post_system_message(
        &self,
        channel: &str,
        kind: MessageKind,
        user_id: &str,
        username: &str,
        content: String,
    ) -> ChatMessage {
        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            channel: channel.to_string(),
            sender_id: user_id.to_string(),
            sender_name: username.to_string(),
            content,
            kind,
            sent_at: Utc::now(),
            edited_at: None,
            attachments: Vec::new(),
            reactions: Vec::new(),
        };
        if let Err(e) = self.repo.save_message(&message).await {
            warn!(error = %e, channel = %channel, "Failed to persist system message");
        }
        self.groups.broadcast(
            &group::channel(channel),
            ServerFrame::event(event::RECEIVE_MESSAGE, args![message]),
        );
        message
    }

    /// Announce a voice-room departure: participant-left to the room,
    /// host transfer, and public listing updates or removal.
    pub fn announce_room_leave(&self, outcome: &RoomLeaveOutcome, leaver_conn: &str) {
        let room_group = group::room(&outcome.room_id);
        self.groups.unsubscribe(leaver_conn, &room_group);
        self.groups.broadcast(
            &room_group,
            ServerFrame::event(
                event::VOICE_ROOM_PARTICIPANT_LEFT,
                args![outcome.room_id, outcome.user_id],
            ),
        );
        if let Some(new_host) = &outcome.new_host {
            self.groups.broadcast(
                &room_group,
                ServerFrame::event(
                    event::VOICE_ROOM_HOST_CHANGED,
                    args![outcome.room_id, new_host],
                ),
            );
        }
        if outcome.closed {
            if outcome.was_public {
                self.groups.broadcast_all(ServerFrame::event(
                    event::VOICE_ROOM_REMOVED,
                    args![outcome.room_id],
                ));
            }
        } else if outcome.was_public {
            if let Some(room) = &outcome.room {
                self.groups
                    .broadcast_all(ServerFrame::event(event::VOICE_ROOM_UPDATED, args![room]));
            }
        }
    }

    /// Announce a group-call departure or teardown.
    pub fn announce_group_call_leave(&self, outcome: &GroupLeaveOutcome, leaver_conn: &str) {
        let call_group = group::group_call(&outcome.call_id);
        self.groups.unsubscribe(leaver_conn, &call_group);
        if outcome.ended {
            let reason = outcome.reason.unwrap_or("Call ended");
            let frame = Arc::new(ServerFrame::event(
                event::GROUP_CALL_ENDED,
                args![outcome.call_id, reason],
            ));
            for conn in &outcome.member_conns {
                self.connections.send_to_conn(conn, frame.clone());
                self.groups.unsubscribe(conn, &call_group);
            }
        } else {
            self.groups.broadcast(
                &call_group,
                ServerFrame::event(
                    event::GROUP_CALL_PARTICIPANT_LEFT,
                    args![outcome.call_id, outcome.user_id],
                ),
            );
            if let Some(call) = &outcome.call {
                self.groups.broadcast(
                    &call_group,
                    ServerFrame::event(event::GROUP_CALL_UPDATED, args![call]),
                );
            }
        }
    }

    /// Canonical connection teardown. See the module docs for the
    /// ordering contract.
    pub async fn disconnect(self: &Arc<Self>, conn_id: &str) {
        let user_id = self.connections.user_of(conn_id);
        debug!(conn_id = %conn_id, user = ?user_id, "Disconnect cleanup");

        // Snapshot before presence teardown; step 8 needs the name.
        let snapshot = user_id.as_deref().and_then(|u| self.presence.snapshot(u));

        // 1-3: screen share, viewer sets, buckets.
        let (own_share, shrunk) = self.screen.purge_connection(conn_id);
        if let Some(share) = own_share {
            let voice_group = group::voice(&share.channel_id);
            self.groups.broadcast_except(
                &voice_group,
                ServerFrame::event(event::SCREEN_SHARE_STOPPED, args![conn_id]),
                conn_id,
            );
            self.groups.broadcast_except(
                &voice_group,
                ServerFrame::event(event::USER_SCREEN_SHARE_CHANGED, args![conn_id, false]),
                conn_id,
            );
        }
        for (sharer_conn, viewers) in shrunk {
            self.send_to_conn(
                &sharer_conn,
                ServerFrame::event(event::VIEWER_COUNT_UPDATED, args![viewers]),
            );
        }

        // 4: voice channel.
        if let Some((channel_id, participant, _emptied)) = self.voice.leave(conn_id) {
            let voice_group = group::voice(&channel_id);
            self.groups.unsubscribe(conn_id, &voice_group);
            self.groups.broadcast(
                &voice_group,
                ServerFrame::event(
                    event::USER_LEFT_VOICE,
                    args![conn_id, participant.user_id],
                ),
            );
        }

        // 5: voice room.
        if let Some((room_id, room_user)) = self.rooms.room_of_conn(conn_id) {
            if let Some(outcome) = self.rooms.leave(&room_id, &room_user) {
                self.announce_room_leave(&outcome, conn_id);
            }
        }

        // 6: calls. Presence still includes this connection, so "last"
        // means no other device remains.
        if let Some(uid) = user_id.as_deref() {
            let last_connection = self.presence.connection_count(uid) <= 1;
            if let Some(transition) = self.calls.handle_disconnect(uid, conn_id, last_connection) {
                let peer = transition.peer_of(uid);
                self.send_to_user(
                    &peer,
                    ServerFrame::event(
                        event::CALL_ENDED,
                        args![transition.call.id, "User disconnected"],
                    ),
                );
                self.send_to_user(
                    uid,
                    ServerFrame::event(
                        event::CALL_ENDED,
                        args![transition.call.id, "User disconnected"],
                    ),
                );
                self.schedule_call_purge(transition.call.id.clone());
            }
            if let Some(outcome) = self.group_calls.handle_disconnect(uid, conn_id) {
                self.announce_group_call_leave(&outcome, conn_id);
            }
        }

        // 7: presence.
        let mut went_offline = false;
        if let Some(uid) = user_id.as_deref() {
            went_offline = self.presence.remove_connection(uid, conn_id);
            if went_offline {
                self.auth.set_online_status(uid, false).await;
                self.subscriptions.remove(uid);
                match self.repo.friends_of(uid).await {
                    Ok(friends) => {
                        for friendship in friends {
                            let other = if friendship.requester_id == uid {
                                friendship.addressee_id
                            } else {
                                friendship.requester_id
                            };
                            self.send_to_user(
                                &other,
                                ServerFrame::event(event::FRIEND_OFFLINE, args![uid]),
                            );
                        }
                    }
                    Err(e) => warn!(error = %e, user = %uid, "Failed to load friends for offline fan-out"),
                }
            }
        }

        // 8: departure announcements, only when the user truly left.
        if went_offline {
            if let (Some(uid), Some(snapshot)) = (user_id.as_deref(), snapshot) {
                self.groups
                    .broadcast_all(ServerFrame::event(event::USER_LEFT, args![uid]));
                self.post_system_message(
                    group::GENERAL,
                    MessageKind::Leave,
                    uid,
                    &snapshot.username,
                    format!("{} left the chat", snapshot.username),
                )
                .await;
                info!(user = %uid, "User went offline");
            }
        }

        // Final unregistration: groups, limiters, the record itself.
        self.groups.remove_connection(conn_id);
        self.rate_limiter.remove_connection(conn_id);
        if let Some(record) = self.connections.remove(conn_id) {
            record.outbound.close();
        }
    }

    /// Schedule removal of a terminal call record; keeps `EndCall`
    /// idempotent for a grace period without leaking records.
    pub fn schedule_call_purge(self: &Arc<Self>, call_id: String) {
        let fabric = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            fabric.calls.purge_terminal(&call_id);
        });
    }
}
