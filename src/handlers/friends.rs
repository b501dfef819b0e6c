//! Friend hub handlers.
//!
//! The friendship state machine lives in the repository; these
//! handlers drive it and keep both endpoints' views consistent: every
//! mutation re-pushes the affected lists to the caller and to the
//! counter-party before returning.

use async_trait::async_trait;
use palaver_proto::names::event;
use palaver_proto::{args, ClientFrame, FriendEntry, FriendshipStatus, ServerFrame, UserSearchResult};
use std::sync::Arc;
use tracing::debug;

use super::{opt_str, require_bool, require_str, require_text, Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::repo::{RepoError, RepoResult, UserRecord};
use crate::state::Fabric;

/// Build a user's friends list with live presence.
pub async fn friend_entries(fabric: &Arc<Fabric>, user_id: &str) -> RepoResult<Vec<FriendEntry>> {
    let friendships = fabric.repo.friends_of(user_id).await?;
    let mut entries = Vec::with_capacity(friendships.len());
    for friendship in friendships {
        let (other_id, other_name) = if friendship.requester_id == user_id {
            (friendship.addressee_id, friendship.addressee_name)
        } else {
            (friendship.requester_id, friendship.requester_name)
        };
        let avatar_url = fabric
            .repo
            .get_user(&other_id)
            .await?
            .and_then(|r| r.avatar_url);
        entries.push(FriendEntry {
            presence: fabric.presence.presence_of(&other_id),
            user_id: other_id,
            username: other_name,
            avatar_url,
        });
    }
    Ok(entries)
}

/// Re-push a user's friends/pending/outgoing lists to every one of
/// their connections. Best-effort: list staleness from a transient
/// repository failure heals on the next mutation.
async fn push_friend_lists(fabric: &Arc<Fabric>, user_id: &str) {
    if !fabric.presence.is_online(user_id) {
        return;
    }
    if let Ok(entries) = friend_entries(fabric, user_id).await {
        fabric.send_to_user(
            user_id,
            ServerFrame::event(event::FRIENDS_LIST, args![entries]),
        );
    }
    if let Ok(pending) = fabric.repo.pending_for(user_id).await {
        fabric.send_to_user(
            user_id,
            ServerFrame::event(event::PENDING_REQUESTS, args![pending]),
        );
    }
    if let Ok(outgoing) = fabric.repo.outgoing_from(user_id).await {
        fabric.send_to_user(
            user_id,
            ServerFrame::event(event::OUTGOING_REQUESTS, args![outgoing]),
        );
    }
}

async fn directory_record(
    fabric: &Arc<Fabric>,
    user_id: &str,
) -> Result<UserRecord, HandlerError> {
    if let Some(record) = fabric.repo.get_user(user_id).await? {
        return Ok(record);
    }
    // Fall back to the auth collaborator for users never seen online.
    match fabric.auth.get_user_by_id(user_id).await {
        Ok(Some(user)) => Ok(UserRecord {
            user_id: user.user_id,
            username: user.username,
            avatar_url: user.avatar_url,
        }),
        Ok(None) => Err(HandlerError::NotFound("user")),
        Err(e) => {
            debug!(error = %e, "Auth lookup failed");
            Err(HandlerError::Repo(RepoError::Unavailable(e.to_string())))
        }
    }
}

async fn send_request(ctx: &Context<'_>, addressee: UserRecord) -> HandlerResult {
    let caller_id = ctx.user_id()?;
    if addressee.user_id == caller_id {
        return Err(HandlerError::conflict("Cannot befriend yourself"));
    }
    // A block in either direction quietly forbids new requests without
    // revealing which side placed it.
    let blocked = ctx.fabric.repo.is_blocked(&caller_id, &addressee.user_id).await?
        || ctx.fabric.repo.is_blocked(&addressee.user_id, &caller_id).await?;
    if blocked {
        return Err(HandlerError::conflict("Unable to send friend request"));
    }

    let requester = directory_record(ctx.fabric, &caller_id).await?;
    let friendship = match ctx.fabric.repo.create_friendship(&requester, &addressee).await {
        Ok(friendship) => friendship,
        Err(RepoError::Conflict(reason)) => return Err(HandlerError::conflict(reason)),
        Err(e) => return Err(e.into()),
    };

    ctx.fabric.send_to_user(
        &caller_id,
        ServerFrame::event(event::FRIEND_REQUEST_SENT, args![friendship]),
    );
    ctx.fabric.send_to_user(
        &addressee.user_id,
        ServerFrame::event(event::NEW_FRIEND_REQUEST, args![friendship]),
    );
    push_friend_lists(ctx.fabric, &caller_id).await;
    push_friend_lists(ctx.fabric, &addressee.user_id).await;
    Ok(())
}

/// Handler for `SendFriendRequest(username)`.
pub struct SendFriendRequestHandler;

#[async_trait]
impl Handler for SendFriendRequestHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let username = require_text(frame, 0, "username")?;
        let caller_id = ctx.user_id()?;
        let needle = username.to_lowercase();
        let addressee = ctx
            .fabric
            .repo
            .search_users(&caller_id, username, 50)
            .await?
            .into_iter()
            .find(|record| record.username.to_lowercase() == needle)
            .ok_or(HandlerError::NotFound("user"))?;
        send_request(ctx, addressee).await
    }
}

/// Handler for `SendFriendRequestById(userId)`.
pub struct SendFriendRequestByIdHandler;

#[async_trait]
impl Handler for SendFriendRequestByIdHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let target = require_str(frame, 0, "userId")?;
        let addressee = directory_record(ctx.fabric, target).await?;
        send_request(ctx, addressee).await
    }
}

/// Handler for `RespondToFriendRequest(requestId, accept)`.
pub struct RespondToFriendRequestHandler;

#[async_trait]
impl Handler for RespondToFriendRequestHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let request_id = require_str(frame, 0, "requestId")?;
        let accept = require_bool(frame, 1, "accept")?;
        let caller_id = ctx.user_id()?;

        let friendship = ctx
            .fabric
            .repo
            .get_friendship(request_id)
            .await?
            .ok_or(HandlerError::NotFound("friend request"))?;
        if friendship.addressee_id != caller_id {
            return Err(HandlerError::Forbidden(
                "Only the addressee can answer a friend request",
            ));
        }
        if friendship.status != FriendshipStatus::Pending {
            return Err(HandlerError::conflict("Request is no longer pending"));
        }

        let status = if accept {
            FriendshipStatus::Accepted
        } else {
            FriendshipStatus::Declined
        };
        ctx.fabric
            .repo
            .set_friendship_status(request_id, status)
            .await?;

        let name = if accept {
            event::FRIEND_REQUEST_ACCEPTED
        } else {
            event::FRIEND_REQUEST_DECLINED
        };
        ctx.fabric.send_to_user(
            &friendship.requester_id,
            ServerFrame::event(name, args![caller_id]),
        );
        push_friend_lists(ctx.fabric, &caller_id).await;
        push_friend_lists(ctx.fabric, &friendship.requester_id).await;
        Ok(())
    }
}

/// Handler for `CancelFriendRequest(requestId)`.
pub struct CancelFriendRequestHandler;

#[async_trait]
impl Handler for CancelFriendRequestHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let request_id = require_str(frame, 0, "requestId")?;
        let caller_id = ctx.user_id()?;

        let friendship = ctx
            .fabric
            .repo
            .get_friendship(request_id)
            .await?
            .ok_or(HandlerError::NotFound("friend request"))?;
        if friendship.requester_id != caller_id {
            return Err(HandlerError::Forbidden(
                "Only the requester can cancel a friend request",
            ));
        }
        if friendship.status != FriendshipStatus::Pending {
            return Err(HandlerError::conflict("Request is no longer pending"));
        }

        ctx.fabric
            .repo
            .set_friendship_status(request_id, FriendshipStatus::Cancelled)
            .await?;
        push_friend_lists(ctx.fabric, &caller_id).await;
        push_friend_lists(ctx.fabric, &friendship.addressee_id).await;
        Ok(())
    }
}

/// Handler for `RemoveFriend(friendId)`.
pub struct RemoveFriendHandler;

#[async_trait]
impl Handler for RemoveFriendHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let friend_id = require_str(frame, 0, "friendId")?;
        let caller_id = ctx.user_id()?;

        let friendship = ctx
            .fabric
            .repo
            .friendship_between(&caller_id, friend_id)
            .await?
            .filter(|f| f.status == FriendshipStatus::Accepted)
            .ok_or(HandlerError::NotFound("friendship"))?;

        ctx.fabric.repo.remove_friendship(&friendship.id).await?;
        push_friend_lists(ctx.fabric, &caller_id).await;
        push_friend_lists(ctx.fabric, friend_id).await;
        Ok(())
    }
}

/// Handler for `BlockUser(userId, reason?)`.
pub struct BlockUserHandler;

#[async_trait]
impl Handler for BlockUserHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let target_id = require_str(frame, 0, "userId")?;
        let reason = opt_str(frame, 1);
        let caller_id = ctx.user_id()?;

        let blocker = directory_record(ctx.fabric, &caller_id).await?;
        let target = directory_record(ctx.fabric, target_id).await?;
        match ctx.fabric.repo.block_user(&blocker, &target).await {
            Ok(_) => {}
            Err(RepoError::Conflict(msg)) => return Err(HandlerError::conflict(msg)),
            Err(e) => return Err(e.into()),
        }
        debug!(blocker = %caller_id, target = %target_id, reason = ?reason, "User blocked");

        // Both sides see plain list refreshes; the target is never told
        // a block happened.
        push_friend_lists(ctx.fabric, &caller_id).await;
        push_friend_lists(ctx.fabric, target_id).await;
        Ok(())
    }
}

/// Handler for `UnblockUser(userId)`.
pub struct UnblockUserHandler;

#[async_trait]
impl Handler for UnblockUserHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let target_id = require_str(frame, 0, "userId")?;
        let caller_id = ctx.user_id()?;

        match ctx.fabric.repo.unblock_user(&caller_id, target_id).await {
            Ok(()) => {}
            Err(RepoError::NotFound(what)) => return Err(HandlerError::NotFound(what)),
            Err(e) => return Err(e.into()),
        }
        push_friend_lists(ctx.fabric, &caller_id).await;
        Ok(())
    }
}

/// Handler for `SearchUser(query)` / `SearchUsers(query)`.
pub struct SearchUserHandler;

#[async_trait]
impl Handler for SearchUserHandler {
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult {
        let query = require_text(frame, 0, "query")?;
        let caller_id = ctx.user_id()?;

        let friend_ids: Vec<String> = ctx
            .fabric
            .repo
            .friends_of(&caller_id)
            .await?
            .into_iter()
            .map(|f| {
                if f.requester_id == caller_id {
                    f.addressee_id
                } else {
                    f.requester_id
                }
            })
            .collect();

        let results: Vec<UserSearchResult> = ctx
            .fabric
            .repo
            .search_users(&caller_id, query, 25)
            .await?
            .into_iter()
            .map(|record| UserSearchResult {
                is_friend: friend_ids.iter().any(|f| *f == record.user_id),
                user_id: record.user_id,
                username: record.username,
                avatar_url: record.avatar_url,
            })
            .collect();

        ctx.reply(ServerFrame::event(event::SEARCH_RESULTS, args![results]));
        Ok(())
    }
}
