//! Chat hub handlers.
//!
//! Channel membership is a group-router subscription; messages are
//! persisted through the repository and fanned out to the owning
//! channel group. Deletions are channel-scoped, never global.

use async_trait::async_trait;
use chrono::Utc;
use palaver_proto::names::{event, group};
use palaver_proto::{
    args, Attachment, ChatMessage, ClientFrame, GroupChat, MessageKind, ProfilePatch, ServerFrame,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{opt_str, require_obj, require_str, require_text, Context, Handler};
use crate::error::{HandlerError, HandlerResult};

/// The fan-out group of a chat target. Group chats address their
/// `group_<id>` set directly; everything else is a named channel.
fn chat_group(channel: &str) -> String {
    if channel.starts_with("group_") {
        channel.to_string()
    } else {
        group::channel(channel)
    }
}

/// Membership gate shared by the messaging handlers.
fn require_member(ctx: &Context<'_>, channel: &str) -> Result<String, HandlerError> {
    let target = chat_group(channel);
    if !ctx.fabric.groups.is_member(ctx.conn_id, &target) {
        return Err(HandlerError::Forbidden("Join the channel first"));
    }
    Ok(target)
}

async fn deliver_message(
    ctx: &Context<'_>,
    channel: &str,
    content: String,
    attachments: Vec<Attachment>,
) -> HandlerResult {
    let user_id = ctx.user_id()?;
    if !ctx.fabric.rate_limiter.check_message_rate(ctx.conn_id) {
        return Err(HandlerError::RateLimited);
    }
    let target = require_member(ctx, channel)?;
    let username = ctx.username()?;

    let message = ChatMessage {
        id: Uuid::new_v4().to_string(),
        channel: channel.to_string(),
        sender_id: user_id,
        sender_name: username,
        content,
        kind: MessageKind::Text,
        sent_at: Utc::now(),
        edited_at: None,
        attachments,
        reactions: Vec::new(),
    };
    ctx.fabric.repo.save_message(&message).await?;
    crate::metrics::CHAT_MESSAGES.inc();

    ctx.fabric.groups.broadcast(
        &target,
        ServerFrame::event(event::RECEIVE_MESSAGE, args![message]),
    );
    Ok(())
}

/// Handler for `JoinChannel(name)`.
pub struct JoinChannelHandler;

#[async_trait]
impl Handler for JoinChannelHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let channel = require_text(frame, 0, "channel")?;
        let user_id = ctx.user_id()?;
        let username = ctx.username()?;

        // Role-gated channels stay invisible and unjoinable.
        let role = ctx.fabric.presence.role_of(&user_id);
        let visible = ctx.fabric.repo.list_channels(role).await?;
        if !visible.iter().any(|c| c == channel) {
            return Err(HandlerError::NotFound("channel"));
        }

        ctx.fabric.groups.subscribe(ctx.conn_id, &chat_group(channel));

        let history = ctx
            .fabric
            .repo
            .channel_history(channel, ctx.fabric.limits.chat_history_limit)
            .await?;
        ctx.reply(ServerFrame::event(
            event::CHAT_HISTORY,
            args![channel, history],
        ));

        ctx.fabric
            .post_system_message(
                channel,
                MessageKind::Join,
                &user_id,
                &username,
                format!("{username} joined {channel}"),
            )
            .await;
        Ok(())
    }
}

/// Handler for `LeaveChannel(name)`.
pub struct LeaveChannelHandler;

#[async_trait]
impl Handler for LeaveChannelHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let channel = require_text(frame, 0, "channel")?;
        let user_id = ctx.user_id()?;
        let username = ctx.username()?;

        // Announce before unsubscribing so the leaver's own devices see
        // the notice too.
        ctx.fabric
            .post_system_message(
                channel,
                MessageKind::Leave,
                &user_id,
                &username,
                format!("{username} left {channel}"),
            )
            .await;
        ctx.fabric
            .groups
            .unsubscribe(ctx.conn_id, &chat_group(channel));
        Ok(())
    }
}

/// Handler for `SendMessage(content, channel?)`.
pub struct SendMessageHandler;

#[async_trait]
impl Handler for SendMessageHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let content = require_text(frame, 0, "content")?.to_string();
        let channel = opt_str(frame, 1).unwrap_or(group::GENERAL).to_string();
        deliver_message(ctx, &channel, content, Vec::new()).await
    }
}

/// Handler for `SendMessageWithAttachments(content, channel, attachments)`.
pub struct SendMessageWithAttachmentsHandler;

#[async_trait]
impl Handler for SendMessageWithAttachmentsHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let content = require_str(frame, 0, "content")?.to_string();
        let channel = require_text(frame, 1, "channel")?.to_string();
        let attachments: Vec<Attachment> = require_obj(frame, 2, "attachments")?;
        // Empty text is fine as long as something is attached.
        if content.trim().is_empty() && attachments.is_empty() {
            return Err(HandlerError::MissingArgument("content"));
        }
        deliver_message(ctx, &channel, content, attachments).await
    }
}

/// Handler for `EditMessage(id, newContent, channel)`.
pub struct EditMessageHandler;

#[async_trait]
impl Handler for EditMessageHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let message_id = require_str(frame, 0, "messageId")?;
        let content = require_text(frame, 1, "newContent")?;
        let channel = require_str(frame, 2, "channel")?;
        let user_id = ctx.user_id()?;

        let message = ctx
            .fabric
            .repo
            .get_message(message_id)
            .await?
            .ok_or(HandlerError::NotFound("message"))?;
        if message.sender_id != user_id {
            return Err(HandlerError::Forbidden("Only the author can edit a message"));
        }
        let window = chrono::Duration::from_std(ctx.fabric.limits.edit_window())
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        if Utc::now() - message.sent_at > window {
            return Err(HandlerError::conflict("Edit window has expired"));
        }

        let updated = ctx
            .fabric
            .repo
            .update_message(message_id, content, Utc::now())
            .await?;
        ctx.fabric.groups.broadcast(
            &chat_group(channel),
            ServerFrame::event(event::MESSAGE_EDITED, args![updated]),
        );
        Ok(())
    }
}

/// Handler for `DeleteMessage(id, channel)`.
pub struct DeleteMessageHandler;

#[async_trait]
impl Handler for DeleteMessageHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let message_id = require_str(frame, 0, "messageId")?;
        let channel = require_str(frame, 1, "channel")?;
        let user_id = ctx.user_id()?;

        let message = ctx
            .fabric
            .repo
            .get_message(message_id)
            .await?
            .ok_or(HandlerError::NotFound("message"))?;
        let role = ctx.fabric.presence.role_of(&user_id);
        if message.sender_id != user_id && !role.can_moderate() {
            return Err(HandlerError::Forbidden(
                "Only the author or a moderator can delete a message",
            ));
        }

        ctx.fabric.repo.delete_message(message_id).await?;
        // Channel-scoped on purpose: other channels never learn of it.
        ctx.fabric.groups.broadcast(
            &chat_group(channel),
            ServerFrame::event(event::MESSAGE_DELETED, args![message_id]),
        );
        Ok(())
    }
}

/// Handler for `SendTyping(channel)`.
pub struct SendTypingHandler;

#[async_trait]
impl Handler for SendTypingHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let channel = require_text(frame, 0, "channel")?;
        let user_id = ctx.user_id()?;
        // Ephemeral and throttled: excess notifications vanish quietly.
        if !ctx.fabric.rate_limiter.check_typing_rate(ctx.conn_id) {
            return Ok(());
        }
        let username = ctx.username()?;
        ctx.fabric.groups.broadcast_except(
            &chat_group(channel),
            ServerFrame::event(event::USER_TYPING, args![channel, user_id, username]),
            ctx.conn_id,
        );
        Ok(())
    }
}

/// Handler for `StopTyping(channel)`.
pub struct StopTypingHandler;

#[async_trait]
impl Handler for StopTypingHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let channel = require_text(frame, 0, "channel")?;
        let user_id = ctx.user_id()?;
        ctx.fabric.groups.broadcast_except(
            &chat_group(channel),
            ServerFrame::event(event::USER_STOPPED_TYPING, args![channel, user_id]),
            ctx.conn_id,
        );
        Ok(())
    }
}

/// Handler for `AddReaction(messageId, emoji)`.
pub struct AddReactionHandler;

#[async_trait]
impl Handler for AddReactionHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        react(ctx, frame, true).await
    }
}

/// Handler for `RemoveReaction(messageId, emoji)`.
pub struct RemoveReactionHandler;

#[async_trait]
impl Handler for RemoveReactionHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        react(ctx, frame, false).await
    }
}

async fn react(ctx: &Context<'_>, frame: &ClientFrame, add: bool) -> HandlerResult {
    let message_id = require_str(frame, 0, "messageId")?;
    let emoji = require_text(frame, 1, "emoji")?;
    let user_id = ctx.user_id()?;

    let updated = if add {
        ctx.fabric
            .repo
            .add_reaction(message_id, emoji, &user_id)
            .await?
    } else {
        ctx.fabric
            .repo
            .remove_reaction(message_id, emoji, &user_id)
            .await?
    };

    let count = updated
        .reactions
        .iter()
        .find(|r| r.emoji == emoji)
        .map(|r| r.count)
        .unwrap_or(0);
    let name = if add {
        event::REACTION_ADDED
    } else {
        event::REACTION_REMOVED
    };
    ctx.fabric.groups.broadcast(
        &chat_group(&updated.channel),
        ServerFrame::event(name, args![message_id, emoji, user_id, count]),
    );
    Ok(())
}

/// Handler for `AcknowledgeMessage(messageId)`.
pub struct AcknowledgeMessageHandler;

#[async_trait]
impl Handler for AcknowledgeMessageHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let message_id = require_str(frame, 0, "messageId")?;
        ctx.user_id()?;
        // Delivery-receipt hook: caller-only, no fan-out.
        ctx.reply(ServerFrame::event(
            event::MESSAGE_ACKNOWLEDGED,
            args![message_id, Utc::now()],
        ));
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupChatRequest {
    name: String,
    member_ids: Vec<String>,
    #[serde(default)]
    icon_path: Option<String>,
}

/// Handler for `CreateGroupChat({name, memberIds, iconPath?})`.
pub struct CreateGroupChatHandler;

#[async_trait]
impl Handler for CreateGroupChatHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let request: CreateGroupChatRequest = require_obj(frame, 0, "groupChat")?;
        if request.name.trim().is_empty() {
            return Err(HandlerError::MissingArgument("name"));
        }
        let creator = ctx.user_id()?;

        let mut member_ids = request.member_ids;
        if !member_ids.iter().any(|m| *m == creator) {
            member_ids.push(creator.clone());
        }

        let chat = GroupChat {
            id: Uuid::new_v4().to_string(),
            name: request.name,
            owner_id: creator,
            member_ids: member_ids.clone(),
            icon_path: request.icon_path,
            created_at: Utc::now(),
        };
        let chat_group_name = group::group_chat(&chat.id);

        // Enrol every currently-connected member; offline members join
        // on their next authentication via the persisted membership.
        let frame_out = ServerFrame::event(event::GROUP_CHAT_CREATED, args![chat]);
        for member in &member_ids {
            for conn in ctx.fabric.presence.connections_of(member) {
                ctx.fabric.groups.subscribe(&conn, &chat_group_name);
                ctx.fabric.send_to_conn(&conn, frame_out.clone());
            }
        }
        Ok(())
    }
}

/// Handler for `UpdateUserProfile(patch)`.
pub struct UpdateUserProfileHandler;

#[async_trait]
impl Handler for UpdateUserProfileHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let patch: ProfilePatch = require_obj(frame, 0, "profile")?;
        let user_id = ctx.user_id()?;

        let snapshot = ctx
            .fabric
            .presence
            .apply_patch(&user_id, &patch)
            .ok_or(HandlerError::NotAuthenticated)?;

        if let Some(username) = &patch.username {
            if let Err(e) = ctx
                .fabric
                .repo
                .upsert_user(crate::repo::UserRecord {
                    user_id: user_id.clone(),
                    username: username.clone(),
                    avatar_url: snapshot.avatar_url.clone(),
                })
                .await
            {
                tracing::warn!(error = %e, "Failed to refresh user directory after profile edit");
            }
        }

        ctx.fabric.groups.broadcast_all(ServerFrame::event(
            event::USER_PROFILE_UPDATED,
            args![snapshot],
        ));
        Ok(())
    }
}
