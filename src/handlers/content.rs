//! Content hub handlers.
//!
//! Preferences live in the subscription manager; the derived fan-out
//! state is group membership, kept in step across all of the user's
//! connections. `sync_subscription_groups` is the single place the
//! preference-to-group projection happens.

use async_trait::async_trait;
use palaver_proto::names::{event, group};
use palaver_proto::{args, ClientFrame, ContentSubscription, ServerFrame};
use std::sync::Arc;

use super::{require_obj, require_str, require_text, Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::Fabric;

/// Groups derived from a subscription's preference sets. The public
/// feed is itself preference-gated: opting out of public posts drops
/// the connection from `global_feed`.
fn derived_groups(sub: &ContentSubscription) -> Vec<String> {
    let mut groups = Vec::new();
    if sub.receive_all_public_posts {
        groups.push(group::GLOBAL_FEED.to_string());
    }
    for followed in &sub.followed_user_ids {
        groups.push(group::following(followed));
    }
    for auction in &sub.watched_auction_ids {
        groups.push(group::auction(auction));
    }
    for category in &sub.interested_categories {
        groups.push(group::category(category));
    }
    groups
}

/// Re-derive group membership for every connection of a user after a
/// subscription change.
pub fn sync_subscription_groups(
    fabric: &Arc<Fabric>,
    user_id: &str,
    before: &ContentSubscription,
    after: &ContentSubscription,
) {
    let old_groups = derived_groups(before);
    let new_groups = derived_groups(after);
    for conn_id in fabric.presence.connections_of(user_id) {
        for stale in old_groups.iter().filter(|g| !new_groups.contains(g)) {
            fabric.groups.unsubscribe(&conn_id, stale);
        }
        for fresh in new_groups.iter().filter(|g| !old_groups.contains(g)) {
            fabric.groups.subscribe(&conn_id, fresh);
        }
    }
}

/// Enrol one freshly authenticated connection in its subscription's
/// derived groups (the other connections already are).
pub fn enrol_subscription_groups(fabric: &Arc<Fabric>, conn_id: &str, sub: &ContentSubscription) {
    for derived in derived_groups(sub) {
        fabric.groups.subscribe(conn_id, &derived);
    }
}

fn mutate_subscription(
    ctx: &Context<'_>,
    apply: impl FnOnce(&str) -> bool,
) -> Result<(), HandlerError> {
    let user_id = ctx.user_id()?;
    let before = ctx.fabric.subscriptions.get(&user_id);
    let changed = apply(&user_id);
    if changed {
        let after = ctx.fabric.subscriptions.get(&user_id);
        sync_subscription_groups(ctx.fabric, &user_id, &before, &after);
        ctx.reply(ServerFrame::event(
            event::SUBSCRIPTION_UPDATED,
            args![after],
        ));
    }
    Ok(())
}

/// Handler for `FollowUser(targetUserId)`.
pub struct FollowUserHandler;

#[async_trait]
impl Handler for FollowUserHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let target = require_str(frame, 0, "targetUserId")?.to_string();
        if target == ctx.user_id()? {
            return Err(HandlerError::conflict("Cannot follow yourself"));
        }
        mutate_subscription(ctx, |uid| ctx.fabric.subscriptions.follow(uid, &target))
    }
}

/// Handler for `UnfollowUser(targetUserId)`.
pub struct UnfollowUserHandler;

#[async_trait]
impl Handler for UnfollowUserHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let target = require_str(frame, 0, "targetUserId")?.to_string();
        mutate_subscription(ctx, |uid| ctx.fabric.subscriptions.unfollow(uid, &target))
    }
}

/// Handler for `WatchAuction(auctionId)`.
pub struct WatchAuctionHandler;

#[async_trait]
impl Handler for WatchAuctionHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let auction = require_str(frame, 0, "auctionId")?.to_string();
        mutate_subscription(ctx, |uid| ctx.fabric.subscriptions.watch_auction(uid, &auction))
    }
}

/// Handler for `UnwatchAuction(auctionId)`.
pub struct UnwatchAuctionHandler;

#[async_trait]
impl Handler for UnwatchAuctionHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let auction = require_str(frame, 0, "auctionId")?.to_string();
        mutate_subscription(ctx, |uid| {
            ctx.fabric.subscriptions.unwatch_auction(uid, &auction)
        })
    }
}

/// Handler for `SubscribeToCategory(category)`.
pub struct SubscribeToCategoryHandler;

#[async_trait]
impl Handler for SubscribeToCategoryHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let category = require_text(frame, 0, "category")?.to_string();
        mutate_subscription(ctx, |uid| {
            ctx.fabric.subscriptions.subscribe_category(uid, &category)
        })
    }
}

/// Handler for `UpdateSubscription(subscription)`.
pub struct UpdateSubscriptionHandler;

#[async_trait]
impl Handler for UpdateSubscriptionHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let incoming: ContentSubscription = require_obj(frame, 0, "subscription")?;
        let user_id = ctx.user_id()?;

        let before = ctx.fabric.subscriptions.get(&user_id);
        let after = ctx.fabric.subscriptions.update(&user_id, incoming);
        sync_subscription_groups(ctx.fabric, &user_id, &before, &after);
        ctx.reply(ServerFrame::event(event::SUBSCRIPTION_UPDATED, args![after]));
        Ok(())
    }
}

/// Handler for `GetSubscription()`.
pub struct GetSubscriptionHandler;

#[async_trait]
impl Handler for GetSubscriptionHandler {
    async fn handle(&self, ctx: &Context<'_>, _frame: &ClientFrame) -> HandlerResult {
        let user_id = ctx.user_id()?;
        ctx.reply(ServerFrame::event(
            event::SUBSCRIPTION,
            args![ctx.fabric.subscriptions.get(&user_id)],
        ));
        Ok(())
    }
}
