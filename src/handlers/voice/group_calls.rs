//! Group call handlers.
//!
//! Membership lives in the [`GroupCallManager`](crate::state::GroupCallManager);
//! media and state deltas ride the `groupcall_<id>` fan-out group that
//! participants' connections join.

use async_trait::async_trait;
use palaver_proto::names::{event, group};
use palaver_proto::{args, encode_payload, ClientFrame, GroupCallParticipant, ServerFrame};

use super::super::{require_bool, require_bytes, require_obj, require_str, require_text, require_u32, Context, Handler};
use crate::error::{HandlerError, HandlerResult};

fn participant_of(ctx: &Context<'_>) -> Result<GroupCallParticipant, HandlerError> {
    let user_id = ctx.user_id()?;
    let snapshot = ctx
        .fabric
        .presence
        .snapshot(&user_id)
        .ok_or(HandlerError::NotAuthenticated)?;
    Ok(GroupCallParticipant {
        user_id,
        username: snapshot.username,
        avatar_url: snapshot.avatar_url,
        connection_id: ctx.conn_id.to_string(),
        muted: false,
        deafened: false,
        speaking: false,
        audio_level: 0,
    })
}

/// Handler for `StartGroupCall(name, invitedUserIds)`.
pub struct StartGroupCallHandler;

#[async_trait]
impl Handler for StartGroupCallHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let name = require_text(frame, 0, "name")?;
        let invited: Vec<String> = require_obj(frame, 1, "invitedUserIds")?;
        let host = participant_of(ctx)?;

        let call = ctx
            .fabric
            .group_calls
            .start(host, name, invited.clone())
            .map_err(HandlerError::conflict)?;

        ctx.fabric
            .groups
            .subscribe(ctx.conn_id, &group::group_call(&call.id));
        ctx.reply(ServerFrame::event(event::GROUP_CALL_STARTED, args![call]));

        // Each online invitee gets the invite exactly once; offline
        // invitees simply miss it (no durable queueing).
        let invite = ServerFrame::event(event::GROUP_CALL_INVITE, args![call]);
        for invitee in invited {
            if invitee != call.host_id && ctx.fabric.presence.is_online(&invitee) {
                ctx.fabric.send_to_user(&invitee, invite.clone());
            }
        }
        Ok(())
    }
}

/// Handler for `JoinGroupCall(callId)`.
pub struct JoinGroupCallHandler;

#[async_trait]
impl Handler for JoinGroupCallHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let call_id = require_str(frame, 0, "callId")?;
        let participant = participant_of(ctx)?;

        let (call, _activated) = ctx
            .fabric
            .group_calls
            .join(call_id, participant.clone())
            .map_err(HandlerError::conflict)?;

        let call_group = group::group_call(call_id);
        ctx.fabric.groups.subscribe(ctx.conn_id, &call_group);
        ctx.fabric.groups.broadcast_except(
            &call_group,
            ServerFrame::event(
                event::GROUP_CALL_PARTICIPANT_JOINED,
                args![call_id, participant],
            ),
            ctx.conn_id,
        );
        ctx.fabric.groups.broadcast(
            &call_group,
            ServerFrame::event(event::GROUP_CALL_UPDATED, args![call]),
        );
        Ok(())
    }
}

/// Handler for `LeaveGroupCall(callId)`.
pub struct LeaveGroupCallHandler;

#[async_trait]
impl Handler for LeaveGroupCallHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let call_id = require_str(frame, 0, "callId")?;
        let user_id = ctx.user_id()?;
        let outcome = ctx
            .fabric
            .group_calls
            .leave(call_id, &user_id)
            .ok_or(HandlerError::NotFound("group call"))?;
        ctx.fabric.announce_group_call_leave(&outcome, ctx.conn_id);
        Ok(())
    }
}

/// Handler for `InviteToGroupCall(callId, targetUserId)`.
pub struct InviteToGroupCallHandler;

#[async_trait]
impl Handler for InviteToGroupCallHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let call_id = require_str(frame, 0, "callId")?;
        let target = require_str(frame, 1, "targetUserId")?;
        let user_id = ctx.user_id()?;

        let call = ctx
            .fabric
            .group_calls
            .invite(call_id, &user_id, target)
            .map_err(HandlerError::conflict)?;

        if ctx.fabric.presence.is_online(target) {
            ctx.fabric.send_to_user(
                target,
                ServerFrame::event(event::GROUP_CALL_INVITE, args![call]),
            );
        }
        Ok(())
    }
}

/// Handler for `DeclineGroupCall(callId)`.
pub struct DeclineGroupCallHandler;

#[async_trait]
impl Handler for DeclineGroupCallHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let call_id = require_str(frame, 0, "callId")?;
        let user_id = ctx.user_id()?;

        if let Some(host) = ctx.fabric.group_calls.decline(call_id, &user_id) {
            ctx.fabric.send_to_user(
                &host,
                ServerFrame::event(
                    event::GROUP_CALL_INVITE_DECLINED,
                    args![call_id, user_id],
                ),
            );
        }
        Ok(())
    }
}

/// Handler for `SendGroupCallAudio(callId, bytes)`.
pub struct SendGroupCallAudioHandler;

#[async_trait]
impl Handler for SendGroupCallAudioHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let call_id = require_str(frame, 0, "callId")?;
        let payload = require_bytes(frame, 1, "audio")?;
        if !ctx.fabric.group_calls.is_member_conn(call_id, ctx.conn_id) {
            return Ok(());
        }
        crate::metrics::AUDIO_FRAMES_RELAYED.inc();
        ctx.fabric.groups.broadcast_except(
            &group::group_call(call_id),
            ServerFrame::event(
                event::RECEIVE_GROUP_CALL_AUDIO,
                vec![
                    call_id.into(),
                    serde_json::Value::String(ctx.conn_id.to_string()),
                    encode_payload(&payload),
                ],
            ),
            ctx.conn_id,
        );
        Ok(())
    }
}

/// Handler for `SendGroupCallSpeakingState(callId, speaking, level)`.
pub struct SendGroupCallSpeakingStateHandler;

#[async_trait]
impl Handler for SendGroupCallSpeakingStateHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let call_id = require_str(frame, 0, "callId")?;
        let speaking = require_bool(frame, 1, "speaking")?;
        let level = require_u32(frame, 2, "level").unwrap_or(0);

        if ctx
            .fabric
            .group_calls
            .set_speaking(call_id, ctx.conn_id, speaking, level)
            .is_some()
        {
            ctx.fabric.groups.broadcast_except(
                &group::group_call(call_id),
                ServerFrame::event(
                    event::GROUP_CALL_SPEAKING_STATE,
                    args![call_id, ctx.conn_id, speaking, level],
                ),
                ctx.conn_id,
            );
        }
        Ok(())
    }
}
