//! WebRTC signalling pass-through.
//!
//! The hub relays SDP and ICE payloads between named peers verbatim,
//! appending only the sender's connection id. No inspection, no state.

use async_trait::async_trait;
use palaver_proto::names::event;
use palaver_proto::{ClientFrame, ServerFrame};

use super::super::{require_str, Context, Handler};
use crate::error::{HandlerError, HandlerResult};

async fn forward(ctx: &Context<'_>, frame: &ClientFrame, name: &str) -> HandlerResult {
    let target_conn = require_str(frame, 0, "targetConnectionId")?;
    let payload = frame
        .arg(1)
        .cloned()
        .ok_or(HandlerError::MissingArgument("payload"))?;
    ctx.fabric.send_to_conn(
        target_conn,
        ServerFrame::event(
            name,
            vec![serde_json::Value::String(ctx.conn_id.to_string()), payload],
        ),
    );
    Ok(())
}

/// Handler for `SendOffer(targetConnectionId, sdp)`.
pub struct SendOfferHandler;

#[async_trait]
impl Handler for SendOfferHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        forward(ctx, frame, event::RECEIVE_OFFER).await
    }
}

/// Handler for `SendAnswer(targetConnectionId, sdp)`.
pub struct SendAnswerHandler;

#[async_trait]
impl Handler for SendAnswerHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        forward(ctx, frame, event::RECEIVE_ANSWER).await
    }
}

/// Handler for `SendIceCandidate(targetConnectionId, candidate)`.
pub struct SendIceCandidateHandler;

#[async_trait]
impl Handler for SendIceCandidateHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        forward(ctx, frame, event::RECEIVE_ICE_CANDIDATE).await
    }
}
