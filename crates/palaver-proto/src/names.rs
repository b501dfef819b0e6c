//! Method and event name constants.
//!
//! The wire contract is stringly named; these constants keep the daemon
//! and test clients honest about spelling. Grouped by hub.

/// Client-to-server method names.
pub mod method {
    #![allow(missing_docs)]

    // Session
    pub const AUTHENTICATE: &str = "Authenticate";
    pub const PING: &str = "Ping";
    pub const DISCONNECT_USER: &str = "DisconnectUser";

    // Chat
    pub const JOIN_CHANNEL: &str = "JoinChannel";
    pub const LEAVE_CHANNEL: &str = "LeaveChannel";
    pub const SEND_MESSAGE: &str = "SendMessage";
    pub const SEND_MESSAGE_WITH_ATTACHMENTS: &str = "SendMessageWithAttachments";
    pub const EDIT_MESSAGE: &str = "EditMessage";
    pub const DELETE_MESSAGE: &str = "DeleteMessage";
    pub const SEND_TYPING: &str = "SendTyping";
    pub const STOP_TYPING: &str = "StopTyping";
    pub const ADD_REACTION: &str = "AddReaction";
    pub const REMOVE_REACTION: &str = "RemoveReaction";
    pub const ACKNOWLEDGE_MESSAGE: &str = "AcknowledgeMessage";
    pub const CREATE_GROUP_CHAT: &str = "CreateGroupChat";
    pub const UPDATE_USER_PROFILE: &str = "UpdateUserProfile";

    // Friends
    pub const SEND_FRIEND_REQUEST: &str = "SendFriendRequest";
    pub const SEND_FRIEND_REQUEST_BY_ID: &str = "SendFriendRequestById";
    pub const RESPOND_TO_FRIEND_REQUEST: &str = "RespondToFriendRequest";
    pub const CANCEL_FRIEND_REQUEST: &str = "CancelFriendRequest";
    pub const REMOVE_FRIEND: &str = "RemoveFriend";
    pub const BLOCK_USER: &str = "BlockUser";
    pub const UNBLOCK_USER: &str = "UnblockUser";
    pub const SEARCH_USER: &str = "SearchUser";
    pub const SEARCH_USERS: &str = "SearchUsers";

    // DMs
    pub const GET_CONVERSATIONS: &str = "GetConversations";
    pub const GET_DM_HISTORY: &str = "GetDMHistory";
    pub const SEND_DIRECT_MESSAGE: &str = "SendDirectMessage";
    pub const MARK_MESSAGES_READ: &str = "MarkMessagesRead";
    pub const START_TYPING_DM: &str = "StartTypingDM";
    pub const STOP_TYPING_DM: &str = "StopTypingDM";

    // Voice channels
    pub const JOIN_VOICE_CHANNEL: &str = "JoinVoiceChannel";
    pub const LEAVE_VOICE_CHANNEL: &str = "LeaveVoiceChannel";
    pub const UPDATE_VOICE_STATE: &str = "UpdateVoiceState";
    pub const UPDATE_SPEAKING_STATE: &str = "UpdateSpeakingState";
    pub const SEND_AUDIO: &str = "SendAudio";

    // Screen share
    pub const START_SCREEN_SHARE: &str = "StartScreenShare";
    pub const STOP_SCREEN_SHARE: &str = "StopScreenShare";
    pub const SEND_SCREEN_FRAME: &str = "SendScreenFrame";
    pub const JOIN_SCREEN_SHARE: &str = "JoinScreenShare";
    pub const LEAVE_SCREEN_SHARE: &str = "LeaveScreenShare";
    pub const GET_ACTIVE_SCREEN_SHARES: &str = "GetActiveScreenShares";
    pub const REQUEST_SCREEN_QUALITY: &str = "RequestScreenQuality";

    // Voice rooms
    pub const CREATE_VOICE_ROOM: &str = "CreateVoiceRoom";
    pub const JOIN_VOICE_ROOM: &str = "JoinVoiceRoom";
    pub const LEAVE_VOICE_ROOM: &str = "LeaveVoiceRoom";
    pub const CLOSE_VOICE_ROOM: &str = "CloseVoiceRoom";
    pub const KICK_FROM_VOICE_ROOM: &str = "KickFromVoiceRoom";
    pub const PROMOTE_TO_MODERATOR: &str = "PromoteToModerator";
    pub const GET_PUBLIC_VOICE_ROOMS: &str = "GetPublicVoiceRooms";

    // 1:1 calls
    pub const START_CALL: &str = "StartCall";
    pub const ANSWER_CALL: &str = "AnswerCall";
    pub const END_CALL: &str = "EndCall";
    pub const SEND_CALL_AUDIO: &str = "SendCallAudio";
    pub const SEND_CALL_SPEAKING_STATE: &str = "SendCallSpeakingState";

    // Group calls
    pub const START_GROUP_CALL: &str = "StartGroupCall";
    pub const JOIN_GROUP_CALL: &str = "JoinGroupCall";
    pub const LEAVE_GROUP_CALL: &str = "LeaveGroupCall";
    pub const INVITE_TO_GROUP_CALL: &str = "InviteToGroupCall";
    pub const DECLINE_GROUP_CALL: &str = "DeclineGroupCall";
    pub const SEND_GROUP_CALL_AUDIO: &str = "SendGroupCallAudio";
    pub const SEND_GROUP_CALL_SPEAKING_STATE: &str = "SendGroupCallSpeakingState";

    // WebRTC signalling
    pub const SEND_OFFER: &str = "SendOffer";
    pub const SEND_ANSWER: &str = "SendAnswer";
    pub const SEND_ICE_CANDIDATE: &str = "SendIceCandidate";

    // Notifications
    pub const GET_NOTIFICATIONS: &str = "GetNotifications";
    pub const MARK_AS_READ: &str = "MarkAsRead";
    pub const MARK_ALL_AS_READ: &str = "MarkAllAsRead";
    pub const DELETE_NOTIFICATION: &str = "DeleteNotification";

    // Content feed
    pub const FOLLOW_USER: &str = "FollowUser";
    pub const UNFOLLOW_USER: &str = "UnfollowUser";
    pub const WATCH_AUCTION: &str = "WatchAuction";
    pub const UNWATCH_AUCTION: &str = "UnwatchAuction";
    pub const SUBSCRIBE_TO_CATEGORY: &str = "SubscribeToCategory";
    pub const UPDATE_SUBSCRIPTION: &str = "UpdateSubscription";
    pub const GET_SUBSCRIPTION: &str = "GetSubscription";
}

/// Server-to-client event names.
pub mod event {
    #![allow(missing_docs)]

    // Session
    pub const CONNECTION_HANDSHAKE: &str = "ConnectionHandshake";
    pub const AUTHENTICATION_SUCCESS: &str = "AuthenticationSuccess";
    pub const AUTHENTICATION_FAILED: &str = "AuthenticationFailed";
    pub const PONG: &str = "Pong";
    pub const PRECONDITION_FAILED: &str = "PreconditionFailed";
    pub const SERVER_ERROR: &str = "ServerError";
    pub const SERVER_SHUTDOWN: &str = "ServerShutdown";

    // Chat
    pub const CHANNEL_LIST: &str = "ChannelList";
    pub const ONLINE_USERS: &str = "OnlineUsers";
    pub const CHAT_HISTORY: &str = "ChatHistory";
    pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";
    pub const MESSAGE_EDITED: &str = "MessageEdited";
    pub const MESSAGE_DELETED: &str = "MessageDeleted";
    pub const EDIT_ERROR: &str = "EditError";
    pub const USER_TYPING: &str = "UserTyping";
    pub const USER_STOPPED_TYPING: &str = "UserStoppedTyping";
    pub const REACTION_ADDED: &str = "ReactionAdded";
    pub const REACTION_REMOVED: &str = "ReactionRemoved";
    pub const MESSAGE_ACKNOWLEDGED: &str = "MessageAcknowledged";
    pub const GROUP_CHAT_CREATED: &str = "GroupChatCreated";
    pub const GROUP_CHAT_ERROR: &str = "GroupChatError";
    pub const USER_PROFILE_UPDATED: &str = "UserProfileUpdated";
    pub const USER_JOINED: &str = "UserJoined";
    pub const USER_LEFT: &str = "UserLeft";

    // Friends
    pub const FRIENDS_LIST: &str = "FriendsList";
    pub const PENDING_REQUESTS: &str = "PendingRequests";
    pub const OUTGOING_REQUESTS: &str = "OutgoingRequests";
    pub const FRIEND_REQUEST_SENT: &str = "FriendRequestSent";
    pub const NEW_FRIEND_REQUEST: &str = "NewFriendRequest";
    pub const FRIEND_REQUEST_ACCEPTED: &str = "FriendRequestAccepted";
    pub const FRIEND_REQUEST_DECLINED: &str = "FriendRequestDeclined";
    pub const FRIEND_ERROR: &str = "FriendError";
    pub const BLOCK_ERROR: &str = "BlockError";
    pub const FRIEND_ONLINE: &str = "FriendOnline";
    pub const FRIEND_OFFLINE: &str = "FriendOffline";
    pub const SEARCH_RESULTS: &str = "SearchResults";

    // DMs
    pub const CONVERSATIONS: &str = "Conversations";
    pub const DM_HISTORY: &str = "DMHistory";
    pub const RECEIVE_DIRECT_MESSAGE: &str = "ReceiveDirectMessage";
    pub const MESSAGES_READ: &str = "MessagesRead";
    pub const USER_TYPING_DM: &str = "UserTypingDM";
    pub const USER_STOPPED_TYPING_DM: &str = "UserStoppedTypingDM";
    pub const DM_ERROR: &str = "DMError";

    // Voice channels
    pub const VOICE_CHANNEL_USERS: &str = "VoiceChannelUsers";
    pub const USER_JOINED_VOICE: &str = "UserJoinedVoice";
    pub const USER_LEFT_VOICE: &str = "UserLeftVoice";
    pub const VOICE_STATE_CHANGED: &str = "VoiceStateChanged";
    pub const SPEAKING_STATE_CHANGED: &str = "SpeakingStateChanged";
    pub const RECEIVE_AUDIO: &str = "ReceiveAudio";
    pub const VOICE_ERROR: &str = "VoiceError";

    // Screen share
    pub const USER_SCREEN_SHARE_CHANGED: &str = "UserScreenShareChanged";
    pub const SCREEN_SHARE_STARTED: &str = "ScreenShareStarted";
    pub const SCREEN_SHARE_STOPPED: &str = "ScreenShareStopped";
    pub const RECEIVE_SCREEN_FRAME: &str = "ReceiveScreenFrame";
    pub const VIEWER_COUNT_UPDATED: &str = "ViewerCountUpdated";
    pub const ACTIVE_SCREEN_SHARES: &str = "ActiveScreenShares";
    pub const SCREEN_QUALITY_REQUESTED: &str = "ScreenQualityRequested";

    // Voice rooms
    pub const VOICE_ROOM_ADDED: &str = "VoiceRoomAdded";
    pub const VOICE_ROOM_JOINED: &str = "VoiceRoomJoined";
    pub const VOICE_ROOM_UPDATED: &str = "VoiceRoomUpdated";
    pub const VOICE_ROOM_REMOVED: &str = "VoiceRoomRemoved";
    pub const VOICE_ROOM_PARTICIPANT_JOINED: &str = "VoiceRoomParticipantJoined";
    pub const VOICE_ROOM_PARTICIPANT_LEFT: &str = "VoiceRoomParticipantLeft";
    pub const VOICE_ROOM_HOST_CHANGED: &str = "VoiceRoomHostChanged";
    pub const VOICE_ROOM_LIST: &str = "VoiceRoomList";
    pub const VOICE_ROOM_ERROR: &str = "VoiceRoomError";
    pub const KICKED_FROM_VOICE_ROOM: &str = "KickedFromVoiceRoom";
    pub const MODERATOR_PROMOTED: &str = "ModeratorPromoted";

    // 1:1 calls
    pub const CALL_STARTED: &str = "CallStarted";
    pub const INCOMING_CALL: &str = "IncomingCall";
    pub const CALL_ANSWERED: &str = "CallAnswered";
    pub const CALL_DECLINED: &str = "CallDeclined";
    pub const CALL_ENDED: &str = "CallEnded";
    pub const CALL_FAILED: &str = "CallFailed";
    pub const CALL_ERROR: &str = "CallError";
    pub const RECEIVE_CALL_AUDIO: &str = "ReceiveCallAudio";
    pub const CALL_SPEAKING_STATE: &str = "CallSpeakingState";

    // Group calls
    pub const GROUP_CALL_STARTED: &str = "GroupCallStarted";
    pub const GROUP_CALL_INVITE: &str = "GroupCallInvite";
    pub const GROUP_CALL_INVITE_DECLINED: &str = "GroupCallInviteDeclined";
    pub const GROUP_CALL_PARTICIPANT_JOINED: &str = "GroupCallParticipantJoined";
    pub const GROUP_CALL_PARTICIPANT_LEFT: &str = "GroupCallParticipantLeft";
    pub const GROUP_CALL_UPDATED: &str = "GroupCallUpdated";
    pub const GROUP_CALL_ENDED: &str = "GroupCallEnded";
    pub const GROUP_CALL_ERROR: &str = "GroupCallError";
    pub const RECEIVE_GROUP_CALL_AUDIO: &str = "ReceiveGroupCallAudio";
    pub const GROUP_CALL_SPEAKING_STATE: &str = "GroupCallSpeakingState";

    // WebRTC signalling
    pub const RECEIVE_OFFER: &str = "ReceiveOffer";
    pub const RECEIVE_ANSWER: &str = "ReceiveAnswer";
    pub const RECEIVE_ICE_CANDIDATE: &str = "ReceiveIceCandidate";

    // Notifications
    pub const NOTIFICATIONS: &str = "Notifications";
    pub const NEW_NOTIFICATION: &str = "NewNotification";
    pub const UNREAD_COUNT: &str = "UnreadCount";
    pub const NOTIFICATION_ERROR: &str = "NotificationError";

    // Content feed
    pub const FEED_EVENT: &str = "FeedEvent";
    pub const PRICE_DROP: &str = "PriceDrop";
    pub const SUBSCRIPTION: &str = "Subscription";
    pub const SUBSCRIPTION_UPDATED: &str = "SubscriptionUpdated";
    pub const CONTENT_ERROR: &str = "ContentError";
}

/// Fan-out group naming helpers.
///
/// Group names are the router's keys; every hub derives them through
/// these functions so the naming scheme lives in one place.
pub mod group {
    /// Chat channel group.
    pub fn channel(name: &str) -> String {
        format!("channel_{name}")
    }

    /// Voice channel group.
    pub fn voice(channel_id: &str) -> String {
        format!("voice_{channel_id}")
    }

    /// Voice room group.
    pub fn room(room_id: &str) -> String {
        format!("room_{room_id}")
    }

    /// Per-user personal group (all of one user's connections).
    pub fn user(user_id: &str) -> String {
        format!("user_{user_id}")
    }

    /// Auction watchers.
    pub fn auction(auction_id: &str) -> String {
        format!("auction_{auction_id}")
    }

    /// Followers of a user.
    pub fn following(user_id: &str) -> String {
        format!("following_{user_id}")
    }

    /// Per-user notification group.
    pub fn notifications(user_id: &str) -> String {
        format!("notifications_{user_id}")
    }

    /// Group-call media group.
    pub fn group_call(call_id: &str) -> String {
        format!("groupcall_{call_id}")
    }

    /// Group-chat fan-out.
    pub fn group_chat(group_id: &str) -> String {
        format!("group_{group_id}")
    }

    /// Category subscribers.
    pub fn category(category: &str) -> String {
        format!("category_{category}")
    }

    /// The everyone-sees-it content feed.
    pub const GLOBAL_FEED: &str = "global_feed";

    /// The default chat channel every user is enrolled in.
    pub const GENERAL: &str = "general";
}
