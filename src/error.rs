//! Unified error handling for palaverd.
//!
//! A centralized error hierarchy for the hub fabric, with conversion to
//! wire error events and metric labeling.

use palaver_proto::names::{event, method};
use palaver_proto::{args, ServerFrame};
use thiserror::Error;

use crate::repo::RepoError;

// ============================================================================
// Authentication errors
// ============================================================================

/// Why an `Authenticate` invocation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureKind {
    /// Token rejected by the auth collaborator.
    InvalidToken,
    /// Connection is not in a state that may authenticate.
    InvalidHandshake,
    /// Handshake is older than the configured window.
    ConnectionExpired,
}

impl AuthFailureKind {
    /// Wire label for the failure kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidToken => "InvalidToken",
            Self::InvalidHandshake => "InvalidHandshake",
            Self::ConnectionExpired => "ConnectionExpired",
        }
    }

    /// Human-readable message accompanying the kind.
    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidToken => "Token was rejected",
            Self::InvalidHandshake => "Connection cannot authenticate in its current state",
            Self::ConnectionExpired => "Handshake expired before authentication",
        }
    }

    /// Build the `AuthenticationFailed` event.
    pub fn to_event(self) -> ServerFrame {
        ServerFrame::event(
            event::AUTHENTICATION_FAILED,
            args![self.as_str(), self.message()],
        )
    }
}

// ============================================================================
// Handler errors (method processing)
// ============================================================================

/// Errors that can occur while handling a method invocation.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Caller has not completed the authentication handshake.
    #[error("not authenticated")]
    NotAuthenticated,

    /// A required positional argument was absent or had the wrong type.
    #[error("missing or invalid argument: {0}")]
    MissingArgument(&'static str),

    /// An argument was present but semantically invalid.
    #[error("{0}")]
    InvalidArgument(&'static str),

    /// The referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Caller lacks the role or ownership the operation requires.
    #[error("{0}")]
    Forbidden(&'static str),

    /// The operation conflicts with current state.
    #[error("{0}")]
    Conflict(String),

    /// Text-path flood limit hit.
    #[error("rate limited")]
    RateLimited,

    /// Method name not in the registry.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// Transient collaborator failure; surfaced as a generic server error.
    #[error("repository error: {0}")]
    Repo(#[from] RepoError),
}

/// Result type for method handlers.
pub type HandlerResult = Result<(), HandlerError>;

impl HandlerError {
    /// Shorthand for conflict errors, which carry runtime reasons.
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict(reason.into())
    }

    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::MissingArgument(_) => "missing_argument",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::RateLimited => "rate_limited",
            Self::UnknownMethod(_) => "unknown_method",
            Self::Repo(_) => "repo_error",
        }
    }

    /// Convert to the typed error event the failing method's hub uses.
    pub fn to_event(&self, method_name: &str) -> Option<ServerFrame> {
        let reason = self.to_string();
        let name = match self {
            Self::NotAuthenticated | Self::UnknownMethod(_) => {
                return Some(ServerFrame::event(
                    event::PRECONDITION_FAILED,
                    args![method_name, reason],
                ));
            }
            Self::Repo(_) => event::SERVER_ERROR,
            _ => error_event_for(method_name),
        };
        Some(ServerFrame::event(name, args![reason]))
    }
}

/// The typed error event each method family reports through.
pub fn error_event_for(method_name: &str) -> &'static str {
    match method_name {
        method::EDIT_MESSAGE | method::DELETE_MESSAGE => event::EDIT_ERROR,
        method::CREATE_GROUP_CHAT => event::GROUP_CHAT_ERROR,
        method::SEND_FRIEND_REQUEST
        | method::SEND_FRIEND_REQUEST_BY_ID
        | method::RESPOND_TO_FRIEND_REQUEST
        | method::CANCEL_FRIEND_REQUEST
        | method::REMOVE_FRIEND
        | method::SEARCH_USER
        | method::SEARCH_USERS => event::FRIEND_ERROR,
        method::BLOCK_USER | method::UNBLOCK_USER => event::BLOCK_ERROR,
        method::GET_CONVERSATIONS
        | method::GET_DM_HISTORY
        | method::SEND_DIRECT_MESSAGE
        | method::MARK_MESSAGES_READ
        | method::START_TYPING_DM
        | method::STOP_TYPING_DM => event::DM_ERROR,
        method::JOIN_VOICE_CHANNEL
        | method::LEAVE_VOICE_CHANNEL
        | method::UPDATE_VOICE_STATE
        | method::UPDATE_SPEAKING_STATE
        | method::SEND_AUDIO
        | method::START_SCREEN_SHARE
        | method::STOP_SCREEN_SHARE
        | method::SEND_SCREEN_FRAME
        | method::JOIN_SCREEN_SHARE
        | method::LEAVE_SCREEN_SHARE
        | method::GET_ACTIVE_SCREEN_SHARES
        | method::REQUEST_SCREEN_QUALITY => event::VOICE_ERROR,
        method::CREATE_VOICE_ROOM
        | method::JOIN_VOICE_ROOM
        | method::LEAVE_VOICE_ROOM
        | method::CLOSE_VOICE_ROOM
        | method::KICK_FROM_VOICE_ROOM
        | method::PROMOTE_TO_MODERATOR
        | method::GET_PUBLIC_VOICE_ROOMS => event::VOICE_ROOM_ERROR,
        method::START_CALL
        | method::ANSWER_CALL
        | method::END_CALL
        | method::SEND_CALL_AUDIO
        | method::SEND_CALL_SPEAKING_STATE => event::CALL_ERROR,
        method::START_GROUP_CALL
        | method::JOIN_GROUP_CALL
        | method::LEAVE_GROUP_CALL
        | method::INVITE_TO_GROUP_CALL
        | method::DECLINE_GROUP_CALL
        | method::SEND_GROUP_CALL_AUDIO
        | method::SEND_GROUP_CALL_SPEAKING_STATE => event::GROUP_CALL_ERROR,
        method::GET_NOTIFICATIONS
        | method::MARK_AS_READ
        | method::MARK_ALL_AS_READ
        | method::DELETE_NOTIFICATION => event::NOTIFICATION_ERROR,
        method::FOLLOW_USER
        | method::UNFOLLOW_USER
        | method::WATCH_AUCTION
        | method::UNWATCH_AUCTION
        | method::SUBSCRIBE_TO_CATEGORY
        | method::UPDATE_SUBSCRIPTION
        | method::GET_SUBSCRIPTION => event::CONTENT_ERROR,
        _ => event::SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(
            HandlerError::NotAuthenticated.error_code(),
            "not_authenticated"
        );
        assert_eq!(
            HandlerError::conflict("Room is full").error_code(),
            "conflict"
        );
        assert_eq!(HandlerError::RateLimited.error_code(), "rate_limited");
    }

    #[test]
    fn unauthenticated_maps_to_precondition_failed() {
        let ev = HandlerError::NotAuthenticated
            .to_event(method::SEND_MESSAGE)
            .unwrap();
        assert_eq!(ev.name, event::PRECONDITION_FAILED);
        assert_eq!(ev.str_arg(0), Some(method::SEND_MESSAGE));
    }

    #[test]
    fn family_error_events() {
        let ev = HandlerError::Forbidden("not the author")
            .to_event(method::EDIT_MESSAGE)
            .unwrap();
        assert_eq!(ev.name, event::EDIT_ERROR);

        let ev = HandlerError::conflict("Room is full")
            .to_event(method::JOIN_VOICE_ROOM)
            .unwrap();
        assert_eq!(ev.name, event::VOICE_ROOM_ERROR);
        assert_eq!(ev.str_arg(0), Some("Room is full"));

        let ev = HandlerError::NotFound("call")
            .to_event(method::ANSWER_CALL)
            .unwrap();
        assert_eq!(ev.name, event::CALL_ERROR);
    }

    #[test]
    fn repo_failures_become_server_error() {
        let ev = HandlerError::Repo(RepoError::Unavailable("backend down".into()))
            .to_event(method::SEND_MESSAGE)
            .unwrap();
        assert_eq!(ev.name, event::SERVER_ERROR);
    }

    #[test]
    fn auth_failure_event_shape() {
        let ev = AuthFailureKind::ConnectionExpired.to_event();
        assert_eq!(ev.name, event::AUTHENTICATION_FAILED);
        assert_eq!(ev.str_arg(0), Some("ConnectionExpired"));
    }
}
