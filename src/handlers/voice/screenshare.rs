//! Screen-share handlers.
//!
//! Frames are policed per sender by the fixed-window byte bucket
//! before any fan-out work happens; rejected frames vanish silently
//! (the sharer's stats record the drop). The per-viewer download
//! window is advisory: an over-budget viewer just misses frames.

use std::time::Instant;

use async_trait::async_trait;
use palaver_proto::names::{event, group};
use palaver_proto::{args, encode_payload, ClientFrame, ScreenQuality, ServerFrame};
use std::sync::Arc;

use super::super::{require_bytes, require_obj, require_str, require_u32, Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::FrameDecision;

fn current_channel(ctx: &Context<'_>) -> Result<String, HandlerError> {
    ctx.fabric
        .voice
        .channel_of(ctx.conn_id)
        .ok_or(HandlerError::conflict("Not in a voice channel"))
}

/// Handler for `StartScreenShare()`.
pub struct StartScreenShareHandler;

#[async_trait]
impl Handler for StartScreenShareHandler {
    async fn handle(&self, ctx: &Context<'_>, _frame: &ClientFrame) -> HandlerResult {
        let channel_id = current_channel(ctx)?;
        let username = ctx.username()?;

        if ctx.fabric.voice.share_count(&channel_id) >= ctx.fabric.limits.max_streams_per_channel {
            return Err(HandlerError::conflict(
                "Too many active screen shares in this channel",
            ));
        }
        if !ctx.fabric.screen.start(ctx.conn_id, &channel_id, &username) {
            return Err(HandlerError::conflict("Already sharing"));
        }
        ctx.fabric.voice.set_screen_sharing(ctx.conn_id, true);

        let voice_group = group::voice(&channel_id);
        ctx.fabric.groups.broadcast(
            &voice_group,
            ServerFrame::event(event::USER_SCREEN_SHARE_CHANGED, args![ctx.conn_id, true]),
        );
        ctx.fabric.groups.broadcast(
            &voice_group,
            ServerFrame::event(
                event::SCREEN_SHARE_STARTED,
                args![ctx.conn_id, username, channel_id],
            ),
        );
        Ok(())
    }
}

/// Handler for `StopScreenShare()`.
pub struct StopScreenShareHandler;

#[async_trait]
impl Handler for StopScreenShareHandler {
    async fn handle(&self, ctx: &Context<'_>, _frame: &ClientFrame) -> HandlerResult {
        let share = ctx
            .fabric
            .screen
            .stop(ctx.conn_id)
            .ok_or(HandlerError::conflict("Not sharing"))?;
        ctx.fabric.voice.set_screen_sharing(ctx.conn_id, false);

        let voice_group = group::voice(&share.channel_id);
        ctx.fabric.groups.broadcast(
            &voice_group,
            ServerFrame::event(event::SCREEN_SHARE_STOPPED, args![ctx.conn_id]),
        );
        ctx.fabric.groups.broadcast(
            &voice_group,
            ServerFrame::event(event::USER_SCREEN_SHARE_CHANGED, args![ctx.conn_id, false]),
        );
        Ok(())
    }
}

/// Handler for `SendScreenFrame(bytes, width, height)`.
pub struct SendScreenFrameHandler;

#[async_trait]
impl Handler for SendScreenFrameHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let payload = require_bytes(frame, 0, "frame")?;
        let width = require_u32(frame, 1, "width")?;
        let height = require_u32(frame, 2, "height")?;

        let now = Instant::now();
        let decision = ctx.fabric.screen.record_frame(
            ctx.conn_id,
            payload.len() as u64,
            width,
            height,
            now,
        );
        match decision {
            None => return Err(HandlerError::conflict("Not sharing")),
            Some(FrameDecision::Drop) => {
                // Over the upload ceiling: silent, counted, not queued.
                crate::metrics::SCREEN_FRAMES_DROPPED.inc();
                return Ok(());
            }
            Some(FrameDecision::Relay) => {}
        }

        let channel_id = current_channel(ctx)?;
        let encoded = encode_payload(&payload);
        let out = Arc::new(ServerFrame::event(
            event::RECEIVE_SCREEN_FRAME,
            vec![
                serde_json::Value::String(ctx.conn_id.to_string()),
                encoded,
                width.into(),
                height.into(),
            ],
        ));

        let bytes = payload.len() as u64;
        for viewer in ctx.fabric.groups.members(&group::voice(&channel_id)) {
            if viewer == ctx.conn_id {
                continue;
            }
            // Advisory download ceiling: drop to this viewer only.
            if !ctx.fabric.screen.admit_download(&viewer, bytes, now) {
                continue;
            }
            ctx.fabric.connections.send_to_conn(&viewer, out.clone());
        }
        crate::metrics::SCREEN_FRAMES_RELAYED.inc();
        Ok(())
    }
}

/// Handler for `JoinScreenShare(sharerConnectionId)`.
pub struct JoinScreenShareHandler;

#[async_trait]
impl Handler for JoinScreenShareHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let sharer = require_str(frame, 0, "sharerConnectionId")?;
        let viewers = ctx
            .fabric
            .screen
            .join_viewer(sharer, ctx.conn_id)
            .ok_or(HandlerError::NotFound("screen share"))?;
        ctx.fabric.send_to_conn(
            sharer,
            ServerFrame::event(event::VIEWER_COUNT_UPDATED, args![viewers]),
        );
        Ok(())
    }
}

/// Handler for `LeaveScreenShare(sharerConnectionId)`.
pub struct LeaveScreenShareHandler;

#[async_trait]
impl Handler for LeaveScreenShareHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let sharer = require_str(frame, 0, "sharerConnectionId")?;
        let viewers = ctx
            .fabric
            .screen
            .leave_viewer(sharer, ctx.conn_id)
            .ok_or(HandlerError::NotFound("screen share"))?;
        ctx.fabric.send_to_conn(
            sharer,
            ServerFrame::event(event::VIEWER_COUNT_UPDATED, args![viewers]),
        );
        Ok(())
    }
}

/// Handler for `GetActiveScreenShares()`.
pub struct GetActiveScreenSharesHandler;

#[async_trait]
impl Handler for GetActiveScreenSharesHandler {
    async fn handle(&self, ctx: &Context<'_>, _frame: &ClientFrame) -> HandlerResult {
        let channel_id = current_channel(ctx)?;
        ctx.reply(ServerFrame::event(
            event::ACTIVE_SCREEN_SHARES,
            args![ctx.fabric.screen.active_in_channel(&channel_id)],
        ));
        Ok(())
    }
}

/// Handler for `RequestScreenQuality(sharerConnectionId, quality)`.
///
/// Pass-through negotiation: the hub records the label and notifies
/// the sharer, who is free to honour or ignore it.
pub struct RequestScreenQualityHandler;

#[async_trait]
impl Handler for RequestScreenQualityHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let sharer = require_str(frame, 0, "sharerConnectionId")?;
        let quality: ScreenQuality = require_obj(frame, 1, "quality")?;
        if !ctx.fabric.screen.set_quality(sharer, quality) {
            return Err(HandlerError::NotFound("screen share"));
        }
        ctx.fabric.send_to_conn(
            sharer,
            ServerFrame::event(
                event::SCREEN_QUALITY_REQUESTED,
                args![ctx.conn_id, quality],
            ),
        );
        Ok(())
    }
}
