//! Direct-message handlers.
//!
//! Conversations are implicit: the first message between a pair
//! creates one. Read markers reset the per-viewer unread counter and
//! surface as read receipts to the partner. Blocks suppress delivery
//! without revealing themselves: the sender still sees their own echo.

use async_trait::async_trait;
use chrono::Utc;
use palaver_proto::names::event;
use palaver_proto::{args, ClientFrame, DirectMessage, ServerFrame};
use uuid::Uuid;

use super::{require_str, require_text, Context, Handler};
use crate::error::{HandlerError, HandlerResult};

/// Handler for `GetConversations()`.
pub struct GetConversationsHandler;

#[async_trait]
impl Handler for GetConversationsHandler {
    async fn handle(&self, ctx: &Context<'_>, _frame: &ClientFrame) -> HandlerResult {
        let user_id = ctx.user_id()?;
        let conversations = ctx.fabric.repo.conversations_for(&user_id).await?;
        ctx.reply(ServerFrame::event(
            event::CONVERSATIONS,
            args![conversations],
        ));
        Ok(())
    }
}

/// Handler for `GetDMHistory(partnerId)`.
///
/// Fetching history implies reading it: the unread counter resets and
/// the refreshed conversation list follows the history push.
pub struct GetDmHistoryHandler;

#[async_trait]
impl Handler for GetDmHistoryHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let partner_id = require_str(frame, 0, "partnerId")?;
        let user_id = ctx.user_id()?;

        let history = ctx.fabric.repo.dm_history(&user_id, partner_id, 100).await?;
        ctx.reply(ServerFrame::event(
            event::DM_HISTORY,
            args![partner_id, history],
        ));

        mark_read(ctx, &user_id, partner_id).await?;
        Ok(())
    }
}

/// Handler for `SendDirectMessage(recipientId, content)`.
pub struct SendDirectMessageHandler;

#[async_trait]
impl Handler for SendDirectMessageHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let recipient_id = require_str(frame, 0, "recipientId")?;
        let content = require_text(frame, 1, "content")?;
        let user_id = ctx.user_id()?;

        if recipient_id == user_id {
            return Err(HandlerError::conflict("Cannot message yourself"));
        }
        if !ctx.fabric.rate_limiter.check_message_rate(ctx.conn_id) {
            return Err(HandlerError::RateLimited);
        }

        let message = DirectMessage {
            id: Uuid::new_v4().to_string(),
            sender_id: user_id.clone(),
            recipient_id: recipient_id.to_string(),
            content: content.to_string(),
            sent_at: Utc::now(),
            read: false,
        };

        // A block in either direction suppresses persistence and
        // delivery; the sender still sees their own echo so the block
        // stays invisible.
        let blocked = ctx.fabric.repo.is_blocked(recipient_id, &user_id).await?
            || ctx.fabric.repo.is_blocked(&user_id, recipient_id).await?;

        let echo = ServerFrame::event(event::RECEIVE_DIRECT_MESSAGE, args![message]);
        if blocked {
            ctx.fabric.send_to_user(&user_id, echo);
            return Ok(());
        }

        ctx.fabric.repo.save_direct_message(&message).await?;
        ctx.fabric.send_to_user(&user_id, echo.clone());
        ctx.fabric.send_to_user(recipient_id, echo);
        Ok(())
    }
}

/// Handler for `MarkMessagesRead(partnerId)`.
pub struct MarkMessagesReadHandler;

#[async_trait]
impl Handler for MarkMessagesReadHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let partner_id = require_str(frame, 0, "partnerId")?;
        let user_id = ctx.user_id()?;
        mark_read(ctx, &user_id, partner_id).await
    }
}

async fn mark_read(ctx: &Context<'_>, reader_id: &str, partner_id: &str) -> HandlerResult {
    let affected = ctx.fabric.repo.mark_dms_read(reader_id, partner_id).await?;
    if affected > 0 {
        // Read receipt to the author of the now-read messages.
        ctx.fabric.send_to_user(
            partner_id,
            ServerFrame::event(event::MESSAGES_READ, args![reader_id, Utc::now()]),
        );
    }
    let conversations = ctx.fabric.repo.conversations_for(reader_id).await?;
    ctx.fabric.send_to_user(
        reader_id,
        ServerFrame::event(event::CONVERSATIONS, args![conversations]),
    );
    Ok(())
}

/// Handler for `StartTypingDM(recipientId)`.
pub struct StartTypingDmHandler;

#[async_trait]
impl Handler for StartTypingDmHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        typing(ctx, frame, event::USER_TYPING_DM).await
    }
}

/// Handler for `StopTypingDM(recipientId)`.
pub struct StopTypingDmHandler;

#[async_trait]
impl Handler for StopTypingDmHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        typing(ctx, frame, event::USER_STOPPED_TYPING_DM).await
    }
}

async fn typing(ctx: &Context<'_>, frame: &ClientFrame, name: &str) -> HandlerResult {
    let recipient_id = require_str(frame, 0, "recipientId")?;
    let user_id = ctx.user_id()?;
    if !ctx.fabric.rate_limiter.check_typing_rate(ctx.conn_id) {
        return Ok(());
    }
    let blocked = ctx.fabric.repo.is_blocked(recipient_id, &user_id).await?
        || ctx.fabric.repo.is_blocked(&user_id, recipient_id).await?;
    if !blocked {
        ctx.fabric
            .send_to_user(recipient_id, ServerFrame::event(name, args![user_id]));
    }
    Ok(())
}
