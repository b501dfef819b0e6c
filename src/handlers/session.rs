//! Session handlers: the authentication handshake and keepalive.
//!
//! A connection arrives in handshake state, may only `Authenticate` or
//! `Ping`, and graduates to full hub access on a valid token. The
//! initial-state push after authentication enrols the connection in its
//! default groups and streams each hub's starting view.

use async_trait::async_trait;
use chrono::Utc;
use palaver_proto::names::{event, group};
use palaver_proto::{args, ClientFrame, MessageKind, PresenceStatus, ServerFrame};
use tracing::{info, warn};
use uuid::Uuid;

use super::{friend_entries, require_str, Context, Handler};
use crate::auth::AuthUser;
use crate::error::{AuthFailureKind, HandlerError, HandlerResult};
use crate::repo::UserRecord;

/// Handler for the `Ping` keepalive.
pub struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    async fn handle(&self, ctx: &Context<'_>, _frame: &ClientFrame) -> HandlerResult {
        ctx.reply(ServerFrame::event(
            event::PONG,
            args![Utc::now(), ctx.conn_id],
        ));
        Ok(())
    }
}

/// Handler for `Authenticate(token)`.
pub struct AuthenticateHandler;

#[async_trait]
impl Handler for AuthenticateHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let token = require_str(frame, 0, "token")?;
        let fabric = ctx.fabric;

        if fabric.connections.is_authenticated(ctx.conn_id) {
            crate::metrics::AUTH_FAILURES.inc();
            ctx.reply(AuthFailureKind::InvalidHandshake.to_event());
            return Ok(());
        }

        match fabric.connections.handshake_age(ctx.conn_id) {
            Some(age) if age > fabric.limits.handshake_timeout() => {
                crate::metrics::AUTH_FAILURES.inc();
                ctx.reply(AuthFailureKind::ConnectionExpired.to_event());
                return Ok(());
            }
            Some(_) => {}
            None => {
                ctx.reply(AuthFailureKind::InvalidHandshake.to_event());
                return Ok(());
            }
        }

        let user = match fabric.auth.validate_token(token).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                crate::metrics::AUTH_FAILURES.inc();
                ctx.reply(AuthFailureKind::InvalidToken.to_event());
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "Auth collaborator failure during Authenticate");
                ctx.reply(ServerFrame::event(
                    event::SERVER_ERROR,
                    args!["Authentication service unavailable"],
                ));
                return Ok(());
            }
        };

        // Fresh opaque session per successful authentication.
        let session_id = Uuid::new_v4().to_string();
        if !fabric
            .connections
            .bind_user(ctx.conn_id, &user.user_id, &session_id)
        {
            // Lost a race with a concurrent Authenticate on this
            // connection; the binding is write-once.
            ctx.reply(AuthFailureKind::InvalidHandshake.to_event());
            return Ok(());
        }

        let snapshot = user.to_snapshot(PresenceStatus::Online);
        let first_connection =
            fabric
                .presence
                .add_connection(&user.user_id, ctx.conn_id, snapshot.clone());

        if let Err(e) = fabric
            .repo
            .upsert_user(UserRecord {
                user_id: user.user_id.clone(),
                username: user.username.clone(),
                avatar_url: user.avatar_url.clone(),
            })
            .await
        {
            warn!(error = %e, user = %user.user_id, "Failed to refresh user directory");
        }
        let subscription = fabric.subscriptions.ensure(&user.user_id);
        super::content::enrol_subscription_groups(fabric, ctx.conn_id, &subscription);

        // Default enrolments: the general channel, the personal group,
        // notifications, and the public content feed.
        fabric
            .groups
            .subscribe(ctx.conn_id, &group::channel(group::GENERAL));
        fabric
            .groups
            .subscribe(ctx.conn_id, &group::user(&user.user_id));
        fabric
            .groups
            .subscribe(ctx.conn_id, &group::notifications(&user.user_id));
        fabric.groups.subscribe(ctx.conn_id, group::GLOBAL_FEED);

        ctx.reply(ServerFrame::event(
            event::AUTHENTICATION_SUCCESS,
            args![snapshot, ctx.conn_id, Utc::now(), session_id],
        ));

        info!(
            conn_id = %ctx.conn_id,
            user = %user.user_id,
            session = %session_id,
            "Authenticated"
        );

        push_initial_state(ctx, &user, first_connection).await;
        fabric.auth.set_online_status(&user.user_id, true).await;
        Ok(())
    }
}

/// Handler for `DisconnectUser(targetConnectionId)`.
///
/// Disruptive moderation: closing someone else's connection needs a
/// moderator role. Closing your own (another device, a stuck session)
/// is always permitted.
pub struct DisconnectUserHandler;

#[async_trait]
impl Handler for DisconnectUserHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let target_conn = require_str(frame, 0, "targetConnectionId")?;
        let caller_id = ctx.user_id()?;

        let target_user = ctx
            .fabric
            .connections
            .user_of(target_conn)
            .ok_or(HandlerError::NotFound("connection"))?;
        let self_disconnect = target_user == caller_id;
        if !self_disconnect && !ctx.fabric.presence.role_of(&caller_id).can_moderate() {
            return Err(HandlerError::Forbidden(
                "Disconnecting other users requires a moderator role",
            ));
        }

        info!(
            actor = %caller_id,
            target_conn = %target_conn,
            target_user = %target_user,
            "Moderation disconnect"
        );
        ctx.fabric.disconnect(target_conn).await;
        Ok(())
    }
}

/// Stream each hub's starting view to a freshly authenticated
/// connection. Every push is best-effort: a transient repository
/// failure degrades the initial view, never the connection.
async fn push_initial_state(ctx: &Context<'_>, user: &AuthUser, first_connection: bool) {
    let fabric = ctx.fabric;
    let user_id = &user.user_id;

    // Chat: channels visible to the role, who is online, and the
    // recent history of the default channel.
    match fabric.repo.list_channels(user.role).await {
        Ok(channels) => ctx.reply(ServerFrame::event(event::CHANNEL_LIST, args![channels])),
        Err(e) => warn!(error = %e, "Failed to load channel list"),
    }
    ctx.reply(ServerFrame::event(
        event::ONLINE_USERS,
        args![fabric.presence.online_snapshots()],
    ));
    match fabric
        .repo
        .channel_history(group::GENERAL, fabric.limits.chat_history_limit)
        .await
    {
        Ok(history) => ctx.reply(ServerFrame::event(
            event::CHAT_HISTORY,
            args![group::GENERAL, history],
        )),
        Err(e) => warn!(error = %e, "Failed to load general history"),
    }

    // Friends hub: lists plus online fan-out to friends.
    match friend_entries(fabric, user_id).await {
        Ok(entries) => ctx.reply(ServerFrame::event(event::FRIENDS_LIST, args![entries])),
        Err(e) => warn!(error = %e, "Failed to load friends list"),
    }
    match fabric.repo.pending_for(user_id).await {
        Ok(pending) => ctx.reply(ServerFrame::event(event::PENDING_REQUESTS, args![pending])),
        Err(e) => warn!(error = %e, "Failed to load pending requests"),
    }
    match fabric.repo.outgoing_from(user_id).await {
        Ok(outgoing) => ctx.reply(ServerFrame::event(event::OUTGOING_REQUESTS, args![outgoing])),
        Err(e) => warn!(error = %e, "Failed to load outgoing requests"),
    }
    match fabric.repo.conversations_for(user_id).await {
        Ok(conversations) => {
            ctx.reply(ServerFrame::event(event::CONVERSATIONS, args![conversations]))
        }
        Err(e) => warn!(error = %e, "Failed to load conversations"),
    }

    // Notifications hub: current unread counter.
    match fabric.repo.unread_notification_count(user_id).await {
        Ok(count) => ctx.reply(ServerFrame::event(event::UNREAD_COUNT, args![count])),
        Err(e) => warn!(error = %e, "Failed to load unread count"),
    }

    // Presence announcements only when the user actually came online;
    // a second device attaching is invisible to everyone else.
    if first_connection {
        if let Some(snapshot) = fabric.presence.snapshot(user_id) {
            fabric
                .groups
                .broadcast_all(ServerFrame::event(event::USER_JOINED, args![snapshot]));
        }
        fabric
            .post_system_message(
                group::GENERAL,
                MessageKind::Join,
                user_id,
                &user.username,
                format!("{} joined the chat", user.username),
            )
            .await;

        match fabric.repo.friends_of(user_id).await {
            Ok(friendships) => {
                for friendship in friendships {
                    let other = if friendship.requester_id == *user_id {
                        friendship.addressee_id
                    } else {
                        friendship.requester_id
                    };
                    if fabric.presence.is_online(&other) {
                        fabric.send_to_user(
                            &other,
                            ServerFrame::event(
                                event::FRIEND_ONLINE,
                                args![user_id, user.username],
                            ),
                        );
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to load friends for online fan-out"),
        }
    }
}
