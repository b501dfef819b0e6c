//! Voice room handlers.
//!
//! Room passwords are argon2-hashed at creation and verified on the
//! blocking pool; the join re-validates capacity and liveness inside
//! the room's critical section afterwards, so a slow hash can never
//! hold the room lock.

use async_trait::async_trait;
use palaver_proto::names::{event, group};
use palaver_proto::{args, ClientFrame, ServerFrame};
use serde::Deserialize;
use tracing::warn;

use super::super::{opt_str, require_obj, require_str, require_u32, Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::security::password;
use crate::state::{RoomJoinError, RoomJoiner, VoiceRoomParams};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateVoiceRoomRequest {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_public")]
    is_public: bool,
    #[serde(default)]
    password: Option<String>,
    #[serde(default = "default_max")]
    max_participants: u32,
    #[serde(default)]
    category: String,
    #[serde(default = "default_public")]
    allow_screen_share: bool,
}

fn default_public() -> bool {
    true
}
fn default_max() -> u32 {
    10
}

fn room_joiner(ctx: &Context<'_>) -> Result<RoomJoiner, HandlerError> {
    let user_id = ctx.user_id()?;
    let snapshot = ctx
        .fabric
        .presence
        .snapshot(&user_id)
        .ok_or(HandlerError::NotAuthenticated)?;
    Ok(RoomJoiner {
        user_id,
        username: snapshot.username,
        avatar_url: snapshot.avatar_url,
        conn_id: ctx.conn_id.to_string(),
    })
}

/// Handler for `CreateVoiceRoom({...})`.
pub struct CreateVoiceRoomHandler;

#[async_trait]
impl Handler for CreateVoiceRoomHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let request: CreateVoiceRoomRequest = require_obj(frame, 0, "room")?;
        if request.name.trim().is_empty() {
            return Err(HandlerError::MissingArgument("name"));
        }
        let host = room_joiner(ctx)?;

        let password_hash = match request.password.filter(|p| !p.is_empty()) {
            Some(plain) => match password::hash_password(plain).await {
                Ok(hash) => Some(hash),
                Err(e) => {
                    warn!(error = %e, "Room password hashing failed");
                    return Err(HandlerError::conflict("Could not secure the room"));
                }
            },
            None => None,
        };

        let room = ctx.fabric.rooms.create(
            host,
            VoiceRoomParams {
                name: request.name,
                description: request.description,
                is_public: request.is_public,
                password_hash,
                max_participants: request.max_participants,
                category: request.category,
                allow_screen_share: request.allow_screen_share,
            },
            ctx.fabric.limits.max_room_participants,
        );

        ctx.fabric.groups.subscribe(ctx.conn_id, &group::room(&room.id));
        ctx.reply(ServerFrame::event(event::VOICE_ROOM_JOINED, args![room]));
        if room.is_public {
            ctx.fabric
                .groups
                .broadcast_all(ServerFrame::event(event::VOICE_ROOM_ADDED, args![room]));
        }
        Ok(())
    }
}

/// Handler for `JoinVoiceRoom(roomId, password?)`.
pub struct JoinVoiceRoomHandler;

#[async_trait]
impl Handler for JoinVoiceRoomHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let room_id = require_str(frame, 0, "roomId")?;
        let supplied_password = opt_str(frame, 1).map(str::to_string);
        let joiner = room_joiner(ctx)?;

        // Phase 1: read the hash and verify outside any room lock.
        let password_verified = match ctx.fabric.rooms.password_hash(room_id) {
            Ok(None) => true,
            Ok(Some(hash)) => {
                let Some(plain) = supplied_password else {
                    return Err(HandlerError::conflict(
                        RoomJoinError::PasswordRequired.reason(),
                    ));
                };
                match password::verify_password(plain, hash).await {
                    Ok(ok) => ok,
                    Err(e) => {
                        warn!(error = %e, room = %room_id, "Room password verification failed");
                        false
                    }
                }
            }
            Err(e) => return Err(HandlerError::conflict(e.reason())),
        };

        // Phase 2: atomic join with re-validation.
        let room = ctx
            .fabric
            .rooms
            .join(room_id, joiner, password_verified)
            .map_err(|e| HandlerError::conflict(e.reason()))?;

        let room_group = group::room(room_id);
        ctx.fabric.groups.subscribe(ctx.conn_id, &room_group);
        if let Some(participant) = room.participants.last().cloned() {
            ctx.fabric.groups.broadcast_except(
                &room_group,
                ServerFrame::event(
                    event::VOICE_ROOM_PARTICIPANT_JOINED,
                    args![room_id, participant],
                ),
                ctx.conn_id,
            );
        }
        ctx.reply(ServerFrame::event(event::VOICE_ROOM_JOINED, args![room]));
        if room.is_public {
            ctx.fabric
                .groups
                .broadcast_all(ServerFrame::event(event::VOICE_ROOM_UPDATED, args![room]));
        }
        Ok(())
    }
}

/// Handler for `LeaveVoiceRoom(roomId)`.
pub struct LeaveVoiceRoomHandler;

#[async_trait]
impl Handler for LeaveVoiceRoomHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let room_id = require_str(frame, 0, "roomId")?;
        let user_id = ctx.user_id()?;
        let outcome = ctx
            .fabric
            .rooms
            .leave(room_id, &user_id)
            .ok_or(HandlerError::NotFound("voice room"))?;
        ctx.fabric.announce_room_leave(&outcome, ctx.conn_id);
        Ok(())
    }
}

/// Handler for `CloseVoiceRoom(roomId)`.
pub struct CloseVoiceRoomHandler;

#[async_trait]
impl Handler for CloseVoiceRoomHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let room_id = require_str(frame, 0, "roomId")?;
        let user_id = ctx.user_id()?;
        let (room, member_conns) = ctx
            .fabric
            .rooms
            .close(room_id, &user_id)
            .map_err(HandlerError::conflict)?;

        let room_group = group::room(room_id);
        let removed = ServerFrame::event(event::VOICE_ROOM_REMOVED, args![room_id]);
        for conn in &member_conns {
            ctx.fabric.send_to_conn(conn, removed.clone());
            ctx.fabric.groups.unsubscribe(conn, &room_group);
        }
        if room.is_public {
            ctx.fabric.groups.broadcast_all(removed);
        }
        Ok(())
    }
}

/// Handler for `KickFromVoiceRoom(roomId, targetUserId)`.
pub struct KickFromVoiceRoomHandler;

#[async_trait]
impl Handler for KickFromVoiceRoomHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let room_id = require_str(frame, 0, "roomId")?;
        let target = require_str(frame, 1, "targetUserId")?;
        let user_id = ctx.user_id()?;

        let kicked_conn = ctx
            .fabric
            .rooms
            .kick(room_id, &user_id, target)
            .map_err(HandlerError::conflict)?;

        let room_group = group::room(room_id);
        ctx.fabric.send_to_conn(
            &kicked_conn,
            ServerFrame::event(event::KICKED_FROM_VOICE_ROOM, args![room_id]),
        );
        ctx.fabric.groups.unsubscribe(&kicked_conn, &room_group);
        ctx.fabric.groups.broadcast(
            &room_group,
            ServerFrame::event(event::VOICE_ROOM_PARTICIPANT_LEFT, args![room_id, target]),
        );
        if let Some(room) = ctx.fabric.rooms.room(room_id) {
            if room.is_public {
                ctx.fabric
                    .groups
                    .broadcast_all(ServerFrame::event(event::VOICE_ROOM_UPDATED, args![room]));
            }
        }
        Ok(())
    }
}

/// Handler for `PromoteToModerator(roomId, targetUserId)`.
pub struct PromoteToModeratorHandler;

#[async_trait]
impl Handler for PromoteToModeratorHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let room_id = require_str(frame, 0, "roomId")?;
        let target = require_str(frame, 1, "targetUserId")?;
        let user_id = ctx.user_id()?;

        ctx.fabric
            .rooms
            .promote(room_id, &user_id, target)
            .map_err(HandlerError::conflict)?;
        ctx.fabric.groups.broadcast(
            &group::room(room_id),
            ServerFrame::event(event::MODERATOR_PROMOTED, args![room_id, target]),
        );
        Ok(())
    }
}

/// Handler for `GetPublicVoiceRooms(category?, query?, page, pageSize)`.
pub struct GetPublicVoiceRoomsHandler;

#[async_trait]
impl Handler for GetPublicVoiceRoomsHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let category = opt_str(frame, 0).filter(|s| !s.is_empty());
        let query = opt_str(frame, 1).filter(|s| !s.is_empty());
        let page = require_u32(frame, 2, "page").unwrap_or(1);
        let page_size = require_u32(frame, 3, "pageSize").unwrap_or(20);

        let listing = ctx
            .fabric
            .rooms
            .public_rooms(category, query, page, page_size);
        ctx.reply(ServerFrame::event(event::VOICE_ROOM_LIST, args![listing]));
        Ok(())
    }
}
