//! Voice channel handlers: membership, state deltas and audio relay.
//!
//! Audio is opaque payload: the hub validates membership and mute
//! state, then fans the frame out to the other members. It never
//! echoes back to the sender and never inspects the bytes.

use async_trait::async_trait;
use palaver_proto::names::{event, group};
use palaver_proto::{args, encode_payload, ClientFrame, ServerFrame, VoiceParticipant};

use super::super::{opt_str, require_bool, require_bytes, require_text, require_u32, Context, Handler};
use crate::error::{HandlerError, HandlerResult};

/// Handler for `JoinVoiceChannel(channelId, userId, username, avatar)`.
///
/// The caller's identity comes from the session, never from the
/// arguments; username/avatar are display hints for the participant
/// entry (multi-device clients may present differently per device).
pub struct JoinVoiceChannelHandler;

#[async_trait]
impl Handler for JoinVoiceChannelHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let channel_id = require_text(frame, 0, "channelId")?;
        let user_id = ctx.user_id()?;
        let snapshot = ctx
            .fabric
            .presence
            .snapshot(&user_id)
            .ok_or(HandlerError::NotAuthenticated)?;
        let username = opt_str(frame, 2)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&snapshot.username)
            .to_string();
        let avatar_url = opt_str(frame, 3)
            .map(str::to_string)
            .or(snapshot.avatar_url);

        // Moving between channels is an implicit leave.
        if ctx.fabric.voice.channel_of(ctx.conn_id).is_some() {
            leave_voice(ctx).await;
        }

        let participant = VoiceParticipant {
            connection_id: ctx.conn_id.to_string(),
            user_id,
            username,
            avatar_url,
            muted: false,
            deafened: false,
            speaking: false,
            audio_level: 0,
            screen_sharing: false,
        };
        ctx.fabric
            .voice
            .join(channel_id, participant.clone())
            .map_err(|_| HandlerError::conflict("Already in a voice channel"))?;

        let voice_group = group::voice(channel_id);
        ctx.fabric.groups.subscribe(ctx.conn_id, &voice_group);
        ctx.fabric.groups.broadcast_except(
            &voice_group,
            ServerFrame::event(event::USER_JOINED_VOICE, args![participant]),
            ctx.conn_id,
        );
        ctx.reply(ServerFrame::event(
            event::VOICE_CHANNEL_USERS,
            args![ctx.fabric.voice.participants(channel_id)],
        ));
        Ok(())
    }
}

/// Handler for `LeaveVoiceChannel()`.
pub struct LeaveVoiceChannelHandler;

#[async_trait]
impl Handler for LeaveVoiceChannelHandler {
    async fn handle(&self, ctx: &Context<'_>, _frame: &ClientFrame) -> HandlerResult {
        leave_voice(ctx).await;
        Ok(())
    }
}

/// Shared leave flow: tear down any screen share first, then drop the
/// participant and announce. Tolerates not being in a channel.
pub(super) async fn leave_voice(ctx: &Context<'_>) {
    if let Some(share) = ctx.fabric.screen.stop(ctx.conn_id) {
        let voice_group = group::voice(&share.channel_id);
        ctx.fabric.voice.set_screen_sharing(ctx.conn_id, false);
        ctx.fabric.groups.broadcast(
            &voice_group,
            ServerFrame::event(event::SCREEN_SHARE_STOPPED, args![ctx.conn_id]),
        );
        ctx.fabric.groups.broadcast(
            &voice_group,
            ServerFrame::event(
                event::USER_SCREEN_SHARE_CHANGED,
                args![ctx.conn_id, false],
            ),
        );
    }
    if let Some((channel_id, participant, _emptied)) = ctx.fabric.voice.leave(ctx.conn_id) {
        let voice_group = group::voice(&channel_id);
        ctx.fabric.groups.unsubscribe(ctx.conn_id, &voice_group);
        ctx.fabric.groups.broadcast(
            &voice_group,
            ServerFrame::event(
                event::USER_LEFT_VOICE,
                args![ctx.conn_id, participant.user_id],
            ),
        );
    }
}

/// Handler for `UpdateVoiceState(muted, deafened)`.
pub struct UpdateVoiceStateHandler;

#[async_trait]
impl Handler for UpdateVoiceStateHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let muted = require_bool(frame, 0, "muted")?;
        let deafened = require_bool(frame, 1, "deafened")?;
        let (channel_id, _participant) = ctx
            .fabric
            .voice
            .set_voice_state(ctx.conn_id, muted, deafened)
            .ok_or(HandlerError::conflict("Not in a voice channel"))?;
        ctx.fabric.groups.broadcast(
            &group::voice(&channel_id),
            ServerFrame::event(
                event::VOICE_STATE_CHANGED,
                args![ctx.conn_id, muted, deafened],
            ),
        );
        Ok(())
    }
}

/// Handler for `UpdateSpeakingState(speaking, level)`.
pub struct UpdateSpeakingStateHandler;

#[async_trait]
impl Handler for UpdateSpeakingStateHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let speaking = require_bool(frame, 0, "speaking")?;
        let level = require_u32(frame, 1, "level").unwrap_or(0);
        let (channel_id, _participant) = ctx
            .fabric
            .voice
            .set_speaking(ctx.conn_id, speaking, level)
            .ok_or(HandlerError::conflict("Not in a voice channel"))?;
        // Speaking deltas go to the others only; the speaker's client
        // already knows.
        ctx.fabric.groups.broadcast_except(
            &group::voice(&channel_id),
            ServerFrame::event(
                event::SPEAKING_STATE_CHANGED,
                args![ctx.conn_id, speaking, level],
            ),
            ctx.conn_id,
        );
        Ok(())
    }
}

/// Handler for `SendAudio(bytes)`.
pub struct SendAudioHandler;

#[async_trait]
impl Handler for SendAudioHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let payload = require_bytes(frame, 0, "audio")?;
        let Some(channel_id) = ctx.fabric.voice.channel_of(ctx.conn_id) else {
            // Stray audio from a connection not in a channel: drop.
            return Ok(());
        };
        if ctx.fabric.voice.is_muted(ctx.conn_id) {
            return Ok(());
        }
        crate::metrics::AUDIO_FRAMES_RELAYED.inc();
        ctx.fabric.groups.broadcast_except(
            &group::voice(&channel_id),
            ServerFrame::event(
                event::RECEIVE_AUDIO,
                vec![
                    serde_json::Value::String(ctx.conn_id.to_string()),
                    encode_payload(&payload),
                ],
            ),
            ctx.conn_id,
        );
        Ok(())
    }
}
