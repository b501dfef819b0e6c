//! Hub method handlers.
//!
//! This module contains the Handler trait and the method registry that
//! dispatches incoming invocations to hub handlers. The registry also
//! enforces handshake-before-use: a connection that has not
//! authenticated may invoke only `Authenticate` and `Ping`.

mod chat;
mod content;
mod dm;
mod friends;
mod notifications;
mod session;
mod voice;

pub use friends::friend_entries;
pub use session::{AuthenticateHandler, PingHandler};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use palaver_proto::names::method;
use palaver_proto::{ClientFrame, ServerFrame};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{HandlerError, HandlerResult};
use crate::state::{Fabric, UserId};

/// Handler context passed to each method handler.
pub struct Context<'a> {
    /// The invoking connection.
    pub conn_id: &'a str,
    /// Shared hub state.
    pub fabric: &'a Arc<Fabric>,
}

impl Context<'_> {
    /// Queue an event back to the invoking connection.
    pub fn reply(&self, frame: ServerFrame) {
        self.fabric.send_to_conn(self.conn_id, frame);
    }

    /// The authenticated user behind this connection.
    pub fn user_id(&self) -> Result<UserId, HandlerError> {
        self.fabric
            .connections
            .user_of(self.conn_id)
            .ok_or(HandlerError::NotAuthenticated)
    }

    /// The caller's cached display name.
    pub fn username(&self) -> Result<String, HandlerError> {
        let user_id = self.user_id()?;
        self.fabric
            .presence
            .snapshot(&user_id)
            .map(|s| s.username)
            .ok_or(HandlerError::NotAuthenticated)
    }
}

/// Trait implemented by all method handlers.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle an incoming invocation.
    async fn handle(&self, ctx: &Context<'_>, frame: &ClientFrame) -> HandlerResult;
}

// ============================================================================
// Argument extraction helpers
// ============================================================================

/// Required string argument.
pub fn require_str<'f>(
    frame: &'f ClientFrame,
    idx: usize,
    name: &'static str,
) -> Result<&'f str, HandlerError> {
    frame.str_arg(idx).ok_or(HandlerError::MissingArgument(name))
}

/// Required non-empty string argument.
pub fn require_text<'f>(
    frame: &'f ClientFrame,
    idx: usize,
    name: &'static str,
) -> Result<&'f str, HandlerError> {
    let value = require_str(frame, idx, name)?;
    if value.trim().is_empty() {
        return Err(HandlerError::MissingArgument(name));
    }
    Ok(value)
}

/// Required boolean argument.
pub fn require_bool(
    frame: &ClientFrame,
    idx: usize,
    name: &'static str,
) -> Result<bool, HandlerError> {
    frame.bool_arg(idx).ok_or(HandlerError::MissingArgument(name))
}

/// Required unsigned integer argument.
pub fn require_u32(
    frame: &ClientFrame,
    idx: usize,
    name: &'static str,
) -> Result<u32, HandlerError> {
    frame
        .uint_arg(idx)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or(HandlerError::MissingArgument(name))
}

/// Required structured argument.
pub fn require_obj<T: DeserializeOwned>(
    frame: &ClientFrame,
    idx: usize,
    name: &'static str,
) -> Result<T, HandlerError> {
    frame.obj_arg(idx).ok_or(HandlerError::MissingArgument(name))
}

/// Required binary (base64) argument.
pub fn require_bytes(
    frame: &ClientFrame,
    idx: usize,
    name: &'static str,
) -> Result<Vec<u8>, HandlerError> {
    frame
        .bytes_arg(idx)
        .ok_or(HandlerError::MissingArgument(name))
}

/// Optional string argument; absent and null are both `None`.
pub fn opt_str<'f>(frame: &'f ClientFrame, idx: usize) -> Option<&'f str> {
    frame.str_arg(idx)
}

// ============================================================================
// Registry
// ============================================================================

/// Registry of method handlers.
pub struct Registry {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a new registry with all handlers registered.
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();

        // Session
        handlers.insert(method::AUTHENTICATE, Box::new(session::AuthenticateHandler));
        handlers.insert(method::PING, Box::new(session::PingHandler));
        handlers.insert(
            method::DISCONNECT_USER,
            Box::new(session::DisconnectUserHandler),
        );

        // Chat
        handlers.insert(method::JOIN_CHANNEL, Box::new(chat::JoinChannelHandler));
        handlers.insert(method::LEAVE_CHANNEL, Box::new(chat::LeaveChannelHandler));
        handlers.insert(method::SEND_MESSAGE, Box::new(chat::SendMessageHandler));
        handlers.insert(
            method::SEND_MESSAGE_WITH_ATTACHMENTS,
            Box::new(chat::SendMessageWithAttachmentsHandler),
        );
        handlers.insert(method::EDIT_MESSAGE, Box::new(chat::EditMessageHandler));
        handlers.insert(method::DELETE_MESSAGE, Box::new(chat::DeleteMessageHandler));
        handlers.insert(method::SEND_TYPING, Box::new(chat::SendTypingHandler));
        handlers.insert(method::STOP_TYPING, Box::new(chat::StopTypingHandler));
        handlers.insert(method::ADD_REACTION, Box::new(chat::AddReactionHandler));
        handlers.insert(
            method::REMOVE_REACTION,
            Box::new(chat::RemoveReactionHandler),
        );
        handlers.insert(
            method::ACKNOWLEDGE_MESSAGE,
            Box::new(chat::AcknowledgeMessageHandler),
        );
        handlers.insert(
            method::CREATE_GROUP_CHAT,
            Box::new(chat::CreateGroupChatHandler),
        );
        handlers.insert(
            method::UPDATE_USER_PROFILE,
            Box::new(chat::UpdateUserProfileHandler),
        );

        // Friends
        handlers.insert(
            method::SEND_FRIEND_REQUEST,
            Box::new(friends::SendFriendRequestHandler),
        );
        handlers.insert(
            method::SEND_FRIEND_REQUEST_BY_ID,
            Box::new(friends::SendFriendRequestByIdHandler),
        );
        handlers.insert(
            method::RESPOND_TO_FRIEND_REQUEST,
            Box::new(friends::RespondToFriendRequestHandler),
        );
        handlers.insert(
            method::CANCEL_FRIEND_REQUEST,
            Box::new(friends::CancelFriendRequestHandler),
        );
        handlers.insert(method::REMOVE_FRIEND, Box::new(friends::RemoveFriendHandler));
        handlers.insert(method::BLOCK_USER, Box::new(friends::BlockUserHandler));
        handlers.insert(method::UNBLOCK_USER, Box::new(friends::UnblockUserHandler));
        handlers.insert(method::SEARCH_USER, Box::new(friends::SearchUserHandler));
        handlers.insert(method::SEARCH_USERS, Box::new(friends::SearchUserHandler));

        // DMs
        handlers.insert(
            method::GET_CONVERSATIONS,
            Box::new(dm::GetConversationsHandler),
        );
        handlers.insert(method::GET_DM_HISTORY, Box::new(dm::GetDmHistoryHandler));
        handlers.insert(
            method::SEND_DIRECT_MESSAGE,
            Box::new(dm::SendDirectMessageHandler),
        );
        handlers.insert(
            method::MARK_MESSAGES_READ,
            Box::new(dm::MarkMessagesReadHandler),
        );
        handlers.insert(method::START_TYPING_DM, Box::new(dm::StartTypingDmHandler));
        handlers.insert(method::STOP_TYPING_DM, Box::new(dm::StopTypingDmHandler));

        // Voice channels
        handlers.insert(
            method::JOIN_VOICE_CHANNEL,
            Box::new(voice::channels::JoinVoiceChannelHandler),
        );
        handlers.insert(
            method::LEAVE_VOICE_CHANNEL,
            Box::new(voice::channels::LeaveVoiceChannelHandler),
        );
        handlers.insert(
            method::UPDATE_VOICE_STATE,
            Box::new(voice::channels::UpdateVoiceStateHandler),
        );
        handlers.insert(
            method::UPDATE_SPEAKING_STATE,
            Box::new(voice::channels::UpdateSpeakingStateHandler),
        );
        handlers.insert(method::SEND_AUDIO, Box::new(voice::channels::SendAudioHandler));

        // Screen share
        handlers.insert(
            method::START_SCREEN_SHARE,
            Box::new(voice::screenshare::StartScreenShareHandler),
        );
        handlers.insert(
            method::STOP_SCREEN_SHARE,
            Box::new(voice::screenshare::StopScreenShareHandler),
        );
        handlers.insert(
            method::SEND_SCREEN_FRAME,
            Box::new(voice::screenshare::SendScreenFrameHandler),
        );
        handlers.insert(
            method::JOIN_SCREEN_SHARE,
            Box::new(voice::screenshare::JoinScreenShareHandler),
        );
        handlers.insert(
            method::LEAVE_SCREEN_SHARE,
            Box::new(voice::screenshare::LeaveScreenShareHandler),
        );
        handlers.insert(
            method::GET_ACTIVE_SCREEN_SHARES,
            Box::new(voice::screenshare::GetActiveScreenSharesHandler),
        );
        handlers.insert(
            method::REQUEST_SCREEN_QUALITY,
            Box::new(voice::screenshare::RequestScreenQualityHandler),
        );

        // Voice rooms
        handlers.insert(
            method::CREATE_VOICE_ROOM,
            Box::new(voice::rooms::CreateVoiceRoomHandler),
        );
        handlers.insert(
            method::JOIN_VOICE_ROOM,
            Box::new(voice::rooms::JoinVoiceRoomHandler),
        );
        handlers.insert(
            method::LEAVE_VOICE_ROOM,
            Box::new(voice::rooms::LeaveVoiceRoomHandler),
        );
        handlers.insert(
            method::CLOSE_VOICE_ROOM,
            Box::new(voice::rooms::CloseVoiceRoomHandler),
        );
        handlers.insert(
            method::KICK_FROM_VOICE_ROOM,
            Box::new(voice::rooms::KickFromVoiceRoomHandler),
        );
        handlers.insert(
            method::PROMOTE_TO_MODERATOR,
            Box::new(voice::rooms::PromoteToModeratorHandler),
        );
        handlers.insert(
            method::GET_PUBLIC_VOICE_ROOMS,
            Box::new(voice::rooms::GetPublicVoiceRoomsHandler),
        );

        // 1:1 calls
        handlers.insert(method::START_CALL, Box::new(voice::calls::StartCallHandler));
        handlers.insert(method::ANSWER_CALL, Box::new(voice::calls::AnswerCallHandler));
        handlers.insert(method::END_CALL, Box::new(voice::calls::EndCallHandler));
        handlers.insert(
            method::SEND_CALL_AUDIO,
            Box::new(voice::calls::SendCallAudioHandler),
        );
        handlers.insert(
            method::SEND_CALL_SPEAKING_STATE,
            Box::new(voice::calls::SendCallSpeakingStateHandler),
        );

        // Group calls
        handlers.insert(
            method::START_GROUP_CALL,
            Box::new(voice::group_calls::StartGroupCallHandler),
        );
        handlers.insert(
            method::JOIN_GROUP_CALL,
            Box::new(voice::group_calls::JoinGroupCallHandler),
        );
        handlers.insert(
            method::LEAVE_GROUP_CALL,
            Box::new(voice::group_calls::LeaveGroupCallHandler),
        );
        handlers.insert(
            method::INVITE_TO_GROUP_CALL,
            Box::new(voice::group_calls::InviteToGroupCallHandler),
        );
        handlers.insert(
            method::DECLINE_GROUP_CALL,
            Box::new(voice::group_calls::DeclineGroupCallHandler),
        );
        handlers.insert(
            method::SEND_GROUP_CALL_AUDIO,
            Box::new(voice::group_calls::SendGroupCallAudioHandler),
        );
        handlers.insert(
            method::SEND_GROUP_CALL_SPEAKING_STATE,
            Box::new(voice::group_calls::SendGroupCallSpeakingStateHandler),
        );

        // WebRTC signalling
        handlers.insert(method::SEND_OFFER, Box::new(voice::signalling::SendOfferHandler));
        handlers.insert(
            method::SEND_ANSWER,
            Box::new(voice::signalling::SendAnswerHandler),
        );
        handlers.insert(
            method::SEND_ICE_CANDIDATE,
            Box::new(voice::signalling::SendIceCandidateHandler),
        );

        // Notifications
        handlers.insert(
            method::GET_NOTIFICATIONS,
            Box::new(notifications::GetNotificationsHandler),
        );
        handlers.insert(
            method::MARK_AS_READ,
            Box::new(notifications::MarkAsReadHandler),
        );
        handlers.insert(
            method::MARK_ALL_AS_READ,
            Box::new(notifications::MarkAllAsReadHandler),
        );
        handlers.insert(
            method::DELETE_NOTIFICATION,
            Box::new(notifications::DeleteNotificationHandler),
        );

        // Content feed
        handlers.insert(method::FOLLOW_USER, Box::new(content::FollowUserHandler));
        handlers.insert(method::UNFOLLOW_USER, Box::new(content::UnfollowUserHandler));
        handlers.insert(method::WATCH_AUCTION, Box::new(content::WatchAuctionHandler));
        handlers.insert(
            method::UNWATCH_AUCTION,
            Box::new(content::UnwatchAuctionHandler),
        );
        handlers.insert(
            method::SUBSCRIBE_TO_CATEGORY,
            Box::new(content::SubscribeToCategoryHandler),
        );
        handlers.insert(
            method::UPDATE_SUBSCRIPTION,
            Box::new(content::UpdateSubscriptionHandler),
        );
        handlers.insert(
            method::GET_SUBSCRIPTION,
            Box::new(content::GetSubscriptionHandler),
        );

        Self { handlers }
    }

    /// Whether a method is callable before authentication.
    fn pre_auth(method_name: &str) -> bool {
        matches!(method_name, method::AUTHENTICATE | method::PING)
    }

    /// Dispatch one invocation. Handler failures are converted to the
    /// method family's typed error event and queued to the caller; the
    /// connection survives everything except transport faults.
    pub async fn dispatch(&self, ctx: &Context<'_>, frame: &ClientFrame) {
        ctx.fabric.connections.touch(ctx.conn_id);

        let result = if !Self::pre_auth(&frame.method)
            && !ctx.fabric.connections.is_authenticated(ctx.conn_id)
        {
            Err(HandlerError::NotAuthenticated)
        } else {
            match self.handlers.get(frame.method.as_str()) {
                Some(handler) => handler.handle(ctx, frame).await,
                None => Err(HandlerError::UnknownMethod(frame.method.clone())),
            }
        };

        if let Err(error) = result {
            debug!(
                conn_id = %ctx.conn_id,
                method = %frame.method,
                code = error.error_code(),
                "Handler error: {error}"
            );
            if let Some(event) = error.to_event(&frame.method) {
                ctx.reply(event);
            }
        }
    }
}
