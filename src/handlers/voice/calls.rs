//! 1:1 call handlers.
//!
//! Call state lives in the [`CallManager`](crate::state::CallManager);
//! these handlers add the fan-out: every state transition reaches all
//! devices of both users, while media flows only between the two
//! anchoring connections.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use palaver_proto::names::event;
use palaver_proto::{args, encode_payload, ClientFrame, ServerFrame};

use super::super::{require_bool, require_bytes, require_str, require_u32, Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::Fabric;

/// Handler for `StartCall(recipientId)`.
pub struct StartCallHandler;

#[async_trait]
impl Handler for StartCallHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let recipient_id = require_str(frame, 0, "recipientId")?;
        let caller_id = ctx.user_id()?;
        let caller_name = ctx.username()?;

        if !ctx.fabric.presence.is_online(recipient_id) {
            ctx.reply(ServerFrame::event(
                event::CALL_FAILED,
                args!["User is not online"],
            ));
            return Ok(());
        }
        let recipient_name = ctx
            .fabric
            .presence
            .snapshot(recipient_id)
            .map(|s| s.username)
            .unwrap_or_else(|| recipient_id.to_string());

        let call = ctx
            .fabric
            .calls
            .start(
                &caller_id,
                &caller_name,
                ctx.conn_id,
                recipient_id,
                &recipient_name,
            )
            .map_err(HandlerError::conflict)?;

        ctx.fabric.send_to_user(
            &caller_id,
            ServerFrame::event(event::CALL_STARTED, args![call]),
        );
        // Every device of the recipient rings.
        ctx.fabric.send_to_user(
            recipient_id,
            ServerFrame::event(event::INCOMING_CALL, args![call]),
        );

        spawn_ring_timeout(ctx.fabric.clone(), call.id.clone());
        Ok(())
    }
}

/// Schedule the `Ringing -> Missed` transition; the manager aborts the
/// task on any earlier transition.
fn spawn_ring_timeout(fabric: Arc<Fabric>, call_id: String) {
    let timeout = fabric.limits.ring_timeout();
    let handle = tokio::spawn(ring_timeout(fabric.clone(), call_id.clone(), timeout));
    fabric.calls.register_ring_timer(&call_id, handle.abort_handle());
}

async fn ring_timeout(fabric: Arc<Fabric>, call_id: String, timeout: Duration) {
    tokio::time::sleep(timeout).await;
    if let Some(transition) = fabric.calls.timeout_ring(&call_id) {
        let ended = ServerFrame::event(
            event::CALL_ENDED,
            args![transition.call.id, "No answer"],
        );
        fabric.send_to_user(&transition.call.caller_id, ended.clone());
        fabric.send_to_user(&transition.call.recipient_id, ended);
        fabric.schedule_call_purge(call_id);
    }
}

/// Handler for `AnswerCall(callId, accept)`.
pub struct AnswerCallHandler;

#[async_trait]
impl Handler for AnswerCallHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let call_id = require_str(frame, 0, "callId")?;
        let accept = require_bool(frame, 1, "accept")?;
        let user_id = ctx.user_id()?;

        let transition = ctx
            .fabric
            .calls
            .answer(call_id, &user_id, ctx.conn_id, accept)
            .map_err(HandlerError::conflict)?;

        let name = if accept {
            event::CALL_ANSWERED
        } else {
            event::CALL_DECLINED
        };
        // Both endpoints, every device: the recipient's other devices
        // learn the call was picked up elsewhere.
        let frame_out = ServerFrame::event(name, args![transition.call]);
        ctx.fabric
            .send_to_user(&transition.call.caller_id, frame_out.clone());
        ctx.fabric
            .send_to_user(&transition.call.recipient_id, frame_out);

        if !accept {
            ctx.fabric.schedule_call_purge(call_id.to_string());
        }
        Ok(())
    }
}

/// Handler for `EndCall(callId)`.
pub struct EndCallHandler;

#[async_trait]
impl Handler for EndCallHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let call_id = require_str(frame, 0, "callId")?;
        let user_id = ctx.user_id()?;

        let transition = ctx
            .fabric
            .calls
            .end(call_id, &user_id)
            .map_err(HandlerError::conflict)?;

        let ended = ServerFrame::event(event::CALL_ENDED, args![call_id, "Call ended"]);
        ctx.fabric
            .send_to_user(&transition.call.caller_id, ended.clone());
        ctx.fabric
            .send_to_user(&transition.call.recipient_id, ended);
        ctx.fabric.schedule_call_purge(call_id.to_string());
        Ok(())
    }
}

/// Handler for `SendCallAudio(callId, bytes)`.
pub struct SendCallAudioHandler;

#[async_trait]
impl Handler for SendCallAudioHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let call_id = require_str(frame, 0, "callId")?;
        let payload = require_bytes(frame, 1, "audio")?;
        // Forward only when in progress and the sender anchors the
        // call; anything else drops silently (stale frames race hangs).
        if let Some(peer) = ctx.fabric.calls.relay_target(call_id, ctx.conn_id) {
            crate::metrics::AUDIO_FRAMES_RELAYED.inc();
            ctx.fabric.send_to_conn(
                &peer,
                ServerFrame::event(
                    event::RECEIVE_CALL_AUDIO,
                    vec![call_id.into(), encode_payload(&payload)],
                ),
            );
        }
        Ok(())
    }
}

/// Handler for `SendCallSpeakingState(callId, speaking, level)`.
pub struct SendCallSpeakingStateHandler;

#[async_trait]
impl Handler for SendCallSpeakingStateHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let call_id = require_str(frame, 0, "callId")?;
        let speaking = require_bool(frame, 1, "speaking")?;
        let level = require_u32(frame, 2, "level").unwrap_or(0);
        let user_id = ctx.user_id()?;

        if let Some(peer) = ctx.fabric.calls.relay_target(call_id, ctx.conn_id) {
            ctx.fabric.send_to_conn(
                &peer,
                ServerFrame::event(
                    event::CALL_SPEAKING_STATE,
                    args![call_id, user_id, speaking, level],
                ),
            );
        }
        Ok(())
    }
}
