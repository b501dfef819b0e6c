//! Notification hub handlers.
//!
//! Notifications are produced by other components through the
//! cross-hub broadcast API; these handlers cover the consumer side:
//! paging, read markers and deletion. Every mutation re-pushes the
//! unread counter so all of the user's devices stay in step.

use async_trait::async_trait;
use palaver_proto::names::event;
use palaver_proto::{args, ClientFrame, ServerFrame};

use super::{require_str, require_u32, Context, Handler};
use crate::error::HandlerResult;

async fn push_unread_count(ctx: &Context<'_>, user_id: &str) -> HandlerResult {
    let count = ctx.fabric.repo.unread_notification_count(user_id).await?;
    ctx.fabric.send_to_user(
        user_id,
        ServerFrame::event(event::UNREAD_COUNT, args![count]),
    );
    Ok(())
}

/// Handler for `GetNotifications(unreadOnly?, page, pageSize)`.
pub struct GetNotificationsHandler;

#[async_trait]
impl Handler for GetNotificationsHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let unread_only = frame.bool_arg(0).unwrap_or(false);
        let page = require_u32(frame, 1, "page").unwrap_or(1);
        let page_size = require_u32(frame, 2, "pageSize").unwrap_or(25).clamp(1, 100);
        let user_id = ctx.user_id()?;

        let notifications = ctx
            .fabric
            .repo
            .notifications_for(&user_id, unread_only, page, page_size)
            .await?;
        ctx.reply(ServerFrame::event(
            event::NOTIFICATIONS,
            args![notifications],
        ));
        Ok(())
    }
}

/// Handler for `MarkAsRead(notificationId)`.
pub struct MarkAsReadHandler;

#[async_trait]
impl Handler for MarkAsReadHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let notification_id = require_str(frame, 0, "notificationId")?;
        let user_id = ctx.user_id()?;
        ctx.fabric
            .repo
            .mark_notification_read(&user_id, notification_id)
            .await?;
        push_unread_count(ctx, &user_id).await
    }
}

/// Handler for `MarkAllAsRead()`.
pub struct MarkAllAsReadHandler;

#[async_trait]
impl Handler for MarkAllAsReadHandler {
    async fn handle(&self, ctx: &Context<'_>, _frame: &ClientFrame) -> HandlerResult {
        let user_id = ctx.user_id()?;
        ctx.fabric.repo.mark_all_notifications_read(&user_id).await?;
        push_unread_count(ctx, &user_id).await
    }
}

/// Handler for `DeleteNotification(notificationId)`.
pub struct DeleteNotificationHandler;

#[async_trait]
impl Handler for DeleteNotificationHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let notification_id = require_str(frame, 0, "notificationId")?;
        let user_id = ctx.user_id()?;
        ctx.fabric
            .repo
            .delete_notification(&user_id, notification_id)
            .await?;
        push_unread_count(ctx, &user_id).await
    }
}
