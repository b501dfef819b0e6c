//! Shared data-transfer objects.
//!
//! These shapes are the external contract: both the daemon and clients
//! serialize them with camelCase field names. Identifiers are opaque
//! strings throughout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authoritative presence state for a user.
///
/// There is exactly one status enum on the wire; any richer client-side
/// display state is derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum PresenceStatus {
    /// At least one live authenticated connection.
    Online,
    /// Connected but marked away.
    Away,
    /// Connected, do-not-disturb.
    Busy,
    /// No live connections.
    #[default]
    Offline,
}

/// Coarse role used for moderation authorisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    /// Regular member.
    #[default]
    User,
    /// Can moderate channels and rooms.
    Moderator,
    /// Full administrative rights.
    Admin,
}

impl Role {
    /// Whether this role may perform disruptive moderation.
    pub fn can_moderate(self) -> bool {
        matches!(self, Role::Moderator | Role::Admin)
    }
}

/// Cached, non-authoritative projection of a user's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    /// Opaque user id.
    pub user_id: String,
    /// Display name.
    pub username: String,
    /// Avatar image URL, if set.
    pub avatar_url: Option<String>,
    /// Profile banner URL, if set.
    pub banner_url: Option<String>,
    /// Moderation role.
    pub role: Role,
    /// Gamified rank label, if the deployment uses one.
    pub rank: Option<String>,
    /// Free-form status message.
    pub status_message: Option<String>,
    /// Profile accent colour (hex string).
    pub accent_color: Option<String>,
    /// Presence derived from live connections.
    pub presence: PresenceStatus,
    /// When this projection was last refreshed.
    pub last_updated: DateTime<Utc>,
}

/// Partial profile update sent by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    /// New display name.
    pub username: Option<String>,
    /// New avatar URL.
    pub avatar_url: Option<String>,
    /// New banner URL.
    pub banner_url: Option<String>,
    /// New status message.
    pub status_message: Option<String>,
    /// New accent colour.
    pub accent_color: Option<String>,
}

// ============================================================================
// Chat
// ============================================================================

/// Classifies a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    /// Ordinary user text.
    #[default]
    Text,
    /// Synthetic join notice.
    Join,
    /// Synthetic leave notice.
    Leave,
    /// Operator announcement.
    Announcement,
    /// Other server-generated message.
    System,
}

/// A file attached to a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Opaque attachment id.
    pub id: String,
    /// Original file name.
    pub file_name: String,
    /// Download URL.
    pub url: String,
    /// MIME type.
    pub content_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
}

/// Aggregated reactions for one emoji on one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    /// The emoji.
    pub emoji: String,
    /// Number of distinct reacting users.
    pub count: u32,
    /// The reacting users.
    pub user_ids: Vec<String>,
}

/// A chat message as delivered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Globally unique message id.
    pub id: String,
    /// Owning channel name.
    pub channel: String,
    /// Author user id; empty for system messages.
    pub sender_id: String,
    /// Author display name at send time.
    pub sender_name: String,
    /// Message body.
    pub content: String,
    /// Message classification.
    pub kind: MessageKind,
    /// Server receive time.
    pub sent_at: DateTime<Utc>,
    /// Set when the message has been edited.
    pub edited_at: Option<DateTime<Utc>>,
    /// Attached files.
    pub attachments: Vec<Attachment>,
    /// Reaction aggregates.
    pub reactions: Vec<Reaction>,
}

/// A newly created group chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupChat {
    /// Opaque group id; the fan-out group is `group_<id>`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Creator user id.
    pub owner_id: String,
    /// All member user ids, creator included.
    pub member_ids: Vec<String>,
    /// Optional icon path.
    pub icon_path: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Friends & DMs
// ============================================================================

/// Friendship lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FriendshipStatus {
    /// Request sent, not yet answered.
    Pending,
    /// Both sides are friends.
    Accepted,
    /// Addressee declined.
    Declined,
    /// One side blocked the other; supersedes everything.
    Blocked,
    /// Requester withdrew the request.
    Cancelled,
}

impl FriendshipStatus {
    /// Terminal states free the unordered pair for a new request.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Declined | Self::Cancelled)
    }
}

/// A friendship record between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friendship {
    /// Opaque friendship id.
    pub id: String,
    /// The user who sent the request.
    pub requester_id: String,
    /// The user who received it.
    pub addressee_id: String,
    /// Requester display name.
    pub requester_name: String,
    /// Addressee display name.
    pub addressee_name: String,
    /// Current lifecycle state.
    pub status: FriendshipStatus,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
}

/// One entry in a friends list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendEntry {
    /// Friend's user id.
    pub user_id: String,
    /// Friend's display name.
    pub username: String,
    /// Friend's avatar, if any.
    pub avatar_url: Option<String>,
    /// Friend's live presence.
    pub presence: PresenceStatus,
}

/// A user search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchResult {
    /// Matched user id.
    pub user_id: String,
    /// Matched display name.
    pub username: String,
    /// Avatar URL, if any.
    pub avatar_url: Option<String>,
    /// Whether the searcher is already friends with this user.
    pub is_friend: bool,
}

/// A direct message between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    /// Opaque message id.
    pub id: String,
    /// Sending user.
    pub sender_id: String,
    /// Receiving user.
    pub recipient_id: String,
    /// Message body.
    pub content: String,
    /// Server receive time.
    pub sent_at: DateTime<Utc>,
    /// Whether the recipient has read it.
    pub read: bool,
}

/// Summary of one DM conversation from one user's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// The other participant.
    pub partner_id: String,
    /// The other participant's display name.
    pub partner_name: String,
    /// The other participant's avatar, if any.
    pub partner_avatar: Option<String>,
    /// Most recent message, if any.
    pub last_message: Option<DirectMessage>,
    /// Unread count for this viewer.
    pub unread_count: u32,
}

// ============================================================================
// Voice
// ============================================================================

/// A user-connection pair inside a voice channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceParticipant {
    /// The participant's connection id (relay address).
    pub connection_id: String,
    /// The participant's user id.
    pub user_id: String,
    /// Display name.
    pub username: String,
    /// Avatar, if any.
    pub avatar_url: Option<String>,
    /// Microphone muted.
    pub muted: bool,
    /// Output deafened (implies muted for relay purposes).
    pub deafened: bool,
    /// Currently speaking.
    pub speaking: bool,
    /// Last reported audio level, 0-100.
    pub audio_level: u32,
    /// Currently sharing a screen.
    pub screen_sharing: bool,
}

/// Negotiable screen-share quality labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScreenQuality {
    /// 854x480 at 30fps.
    #[serde(rename = "480p")]
    Q480,
    /// 1280x720 at 30fps.
    #[default]
    #[serde(rename = "720p")]
    Q720,
    /// 1280x720 at 60fps.
    #[serde(rename = "720p60")]
    Q720F60,
    /// 1920x1080 at 30fps.
    #[serde(rename = "1080p")]
    Q1080,
    /// 1920x1080 at 60fps.
    #[serde(rename = "1080p60")]
    Q1080F60,
    /// 2560x1440 at 30fps.
    #[serde(rename = "1440p")]
    Q1440,
    /// 2560x1440 at 60fps.
    #[serde(rename = "1440p60")]
    Q1440F60,
    /// 3840x2160.
    #[serde(rename = "4K")]
    Q4K,
}

/// An active screen share, as listed to prospective viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenShare {
    /// Sharer's connection id.
    pub sharer_connection_id: String,
    /// Sharer's display name.
    pub username: String,
    /// Voice channel the share lives in.
    pub channel_id: String,
    /// Last frame width.
    pub width: u32,
    /// Last frame height.
    pub height: u32,
    /// Current viewer count.
    pub viewer_count: u32,
    /// Current quality label.
    pub quality: ScreenQuality,
}

/// Voice-room visibility and policy snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceRoom {
    /// Opaque room id.
    pub id: String,
    /// Room name.
    pub name: String,
    /// Room description.
    pub description: String,
    /// Current host user id.
    pub host_id: String,
    /// Whether the room is discoverable.
    pub is_public: bool,
    /// Whether joining requires a password.
    pub has_password: bool,
    /// Participant ceiling (clamped 2..=50 at creation).
    pub max_participants: u32,
    /// Free-form category label.
    pub category: String,
    /// Whether screen sharing is allowed inside.
    pub allow_screen_share: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Live participant count.
    pub participant_count: u32,
    /// Live participants.
    pub participants: Vec<RoomParticipant>,
}

/// A participant inside a voice room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomParticipant {
    /// User id.
    pub user_id: String,
    /// Display name.
    pub username: String,
    /// Avatar, if any.
    pub avatar_url: Option<String>,
    /// Whether this participant currently hosts the room.
    pub is_host: bool,
    /// Whether this participant moderates the room.
    pub is_moderator: bool,
    /// Join time (host-transfer order).
    pub joined_at: DateTime<Utc>,
}

/// A page of public voice rooms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceRoomPage {
    /// Rooms on this page, ordered by occupancy then age.
    pub rooms: Vec<VoiceRoom>,
    /// Requested page (1-based).
    pub page: u32,
    /// Requested page size.
    pub page_size: u32,
    /// Total matching rooms.
    pub total: u32,
}

// ============================================================================
// Calls
// ============================================================================

/// 1:1 call lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallStatus {
    /// Waiting for the recipient to answer.
    Ringing,
    /// Recipient accepted; media not yet flowing.
    Accepted,
    /// Recipient declined.
    Declined,
    /// Media flowing between both endpoints.
    InProgress,
    /// Hung up or torn down.
    Ended,
    /// Rang out without an answer.
    Missed,
}

impl CallStatus {
    /// Whether the call still occupies its participants.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Ringing | Self::Accepted | Self::InProgress)
    }
}

/// A 1:1 call record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    /// Opaque call id.
    pub id: String,
    /// Initiating user.
    pub caller_id: String,
    /// Called user.
    pub recipient_id: String,
    /// Caller display name.
    pub caller_name: String,
    /// Recipient display name.
    pub recipient_name: String,
    /// Current state.
    pub status: CallStatus,
    /// When ringing started.
    pub started_at: DateTime<Utc>,
    /// When the call was accepted.
    pub answered_at: Option<DateTime<Utc>>,
    /// Final duration in seconds, set on end.
    pub duration_secs: Option<u64>,
}

/// Group call lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupCallStatus {
    /// Created; only the host is in.
    Starting,
    /// At least one invitee joined.
    Active,
    /// Torn down.
    Ended,
}

/// A participant in a group call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCallParticipant {
    /// User id.
    pub user_id: String,
    /// Display name.
    pub username: String,
    /// Avatar, if any.
    pub avatar_url: Option<String>,
    /// The connection carrying this participant's media.
    pub connection_id: String,
    /// Microphone muted.
    pub muted: bool,
    /// Output deafened.
    pub deafened: bool,
    /// Currently speaking.
    pub speaking: bool,
    /// Last reported audio level, 0-100.
    pub audio_level: u32,
}

/// A group call record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCall {
    /// Opaque call id; the fan-out group is `groupcall_<id>`.
    pub id: String,
    /// Host user id.
    pub host_id: String,
    /// Display name of the call.
    pub name: String,
    /// Current state.
    pub status: GroupCallStatus,
    /// Live participants.
    pub participants: Vec<GroupCallParticipant>,
}

// ============================================================================
// Notifications & content feed
// ============================================================================

/// A notification delivered to exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Opaque notification id.
    pub id: String,
    /// Target user.
    pub recipient_id: String,
    /// Producer-defined kind label.
    pub kind: String,
    /// Short title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Icon hint, if any.
    pub icon: Option<String>,
    /// Optional deep link.
    pub action_url: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Read time; immutable otherwise.
    pub read_at: Option<DateTime<Utc>>,
}

/// Content-feed event classes routed by the content hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedEventKind {
    /// A new public post.
    NewPost,
    /// A new marketplace listing.
    NewProduct,
    /// A bid on a watched auction.
    AuctionBid,
    /// An auction nearing its end.
    AuctionEnding,
    /// An existing post was edited.
    PostUpdate,
    /// A gallery/image upload.
    ImageUpload,
    /// A reaction to feed content.
    Reaction,
    /// A comment on feed content.
    Comment,
    /// Profile or banner update surfaced to followers.
    PresenceUpdate,
    /// A price drop on a listing.
    PriceDrop,
    /// Generic feed item.
    FeedItem,
}

/// A content-feed event.
///
/// Routing metadata is typed; the payload itself is opaque to the hub
/// and forwarded verbatim to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEvent {
    /// Opaque event id.
    pub id: String,
    /// Event class, drives group routing.
    pub kind: FeedEventKind,
    /// Authoring user, if any (drives `following_<id>` routing).
    pub author_id: Option<String>,
    /// Category label, if any (drives `category_<c>` routing).
    pub category: Option<String>,
    /// Auction id, if any (drives `auction_<id>` routing).
    pub auction_id: Option<String>,
    /// Auction owner, if any (bid events also target the owner).
    pub auction_owner_id: Option<String>,
    /// Opaque producer payload.
    pub payload: serde_json::Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A user's content-feed subscription preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContentSubscription {
    /// Receive every public post.
    pub receive_all_public_posts: bool,
    /// Receive auction updates for watched auctions.
    pub receive_auction_updates: bool,
    /// Receive price-drop events.
    pub receive_price_drops: bool,
    /// Followed author ids.
    pub followed_user_ids: Vec<String>,
    /// Watched auction ids.
    pub watched_auction_ids: Vec<String>,
    /// Subscribed category labels.
    pub interested_categories: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_wire_fields() {
        let snapshot = UserSnapshot {
            user_id: "u1".into(),
            username: "ada".into(),
            avatar_url: None,
            banner_url: None,
            role: Role::Admin,
            rank: None,
            status_message: None,
            accent_color: None,
            presence: PresenceStatus::Online,
            last_updated: Utc::now(),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("userId").is_some());
        assert_eq!(json["role"], "admin");
        assert_eq!(json["presence"], "online");
    }

    #[test]
    fn screen_quality_labels() {
        assert_eq!(
            serde_json::to_string(&ScreenQuality::Q1080F60).unwrap(),
            "\"1080p60\""
        );
        let q: ScreenQuality = serde_json::from_str("\"4K\"").unwrap();
        assert_eq!(q, ScreenQuality::Q4K);
    }

    #[test]
    fn call_status_activity() {
        assert!(CallStatus::Ringing.is_active());
        assert!(CallStatus::InProgress.is_active());
        assert!(!CallStatus::Missed.is_active());
        assert!(!CallStatus::Ended.is_active());
    }

    #[test]
    fn friendship_terminal_states() {
        assert!(FriendshipStatus::Declined.is_terminal());
        assert!(FriendshipStatus::Cancelled.is_terminal());
        assert!(!FriendshipStatus::Pending.is_terminal());
        assert!(!FriendshipStatus::Blocked.is_terminal());
    }
}
