//! Repository collaborator interface.
//!
//! All durable state (messages, friendships, DMs, notifications) is
//! delegated to this trait; the hub fabric owns nothing persistent.
//! Every call is idempotent from the hub's point of view and may fail
//! with a typed error that handlers surface as a generic server error.
//!
//! [`MemoryRepository`] is the shipped implementation, backing dev mode
//! and the test harness.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use palaver_proto::{
    ChatMessage, Conversation, DirectMessage, Friendship, FriendshipStatus, Notification,
    Reaction, Role,
};
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

/// Repository failure taxonomy.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The referenced record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The operation violates a uniqueness or state constraint.
    #[error("{0}")]
    Conflict(&'static str),

    /// Transient backend failure.
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for repository calls.
pub type RepoResult<T> = Result<T, RepoError>;

/// Directory projection of a user, as the repository sees it.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Ordering helper for role-gated channel visibility.
fn role_level(role: Role) -> u8 {
    match role {
        Role::User => 0,
        Role::Moderator => 1,
        Role::Admin => 2,
    }
}

/// Durable-state collaborator consumed by every hub.
#[async_trait]
pub trait Repository: Send + Sync {
    // ------------------------------------------------------------------
    // User directory
    // ------------------------------------------------------------------

    /// Insert or refresh a user's directory projection.
    async fn upsert_user(&self, user: UserRecord) -> RepoResult<()>;

    /// Fetch a directory record.
    async fn get_user(&self, user_id: &str) -> RepoResult<Option<UserRecord>>;

    /// Fuzzy search: id exact match or username substring, excluding the
    /// caller, capped at `limit`.
    async fn search_users(
        &self,
        caller_id: &str,
        query: &str,
        limit: usize,
    ) -> RepoResult<Vec<UserRecord>>;

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    /// Channel names visible to the given role.
    async fn list_channels(&self, role: Role) -> RepoResult<Vec<String>>;

    // ------------------------------------------------------------------
    // Chat messages
    // ------------------------------------------------------------------

    /// Persist a new message.
    async fn save_message(&self, message: &ChatMessage) -> RepoResult<()>;

    /// Fetch one message.
    async fn get_message(&self, message_id: &str) -> RepoResult<Option<ChatMessage>>;

    /// The most recent `limit` messages of a channel, oldest first.
    async fn channel_history(&self, channel: &str, limit: usize) -> RepoResult<Vec<ChatMessage>>;

    /// Replace a message body, stamping the edit time.
    async fn update_message(
        &self,
        message_id: &str,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> RepoResult<ChatMessage>;

    /// Hard-delete a message.
    async fn delete_message(&self, message_id: &str) -> RepoResult<()>;

    /// Record a reaction; at most one per (user, message, emoji).
    async fn add_reaction(
        &self,
        message_id: &str,
        emoji: &str,
        user_id: &str,
    ) -> RepoResult<ChatMessage>;

    /// Remove a previously recorded reaction.
    async fn remove_reaction(
        &self,
        message_id: &str,
        emoji: &str,
        user_id: &str,
    ) -> RepoResult<ChatMessage>;

    // ------------------------------------------------------------------
    // Friendships & blocks
    // ------------------------------------------------------------------

    /// Create a pending friendship. Fails with `Conflict` when a
    /// non-terminal record already exists for the unordered pair.
    async fn create_friendship(
        &self,
        requester: &UserRecord,
        addressee: &UserRecord,
    ) -> RepoResult<Friendship>;

    /// Fetch a friendship by id.
    async fn get_friendship(&self, friendship_id: &str) -> RepoResult<Option<Friendship>>;

    /// Transition a friendship's status.
    async fn set_friendship_status(
        &self,
        friendship_id: &str,
        status: FriendshipStatus,
    ) -> RepoResult<Friendship>;

    /// Remove a friendship record entirely.
    async fn remove_friendship(&self, friendship_id: &str) -> RepoResult<()>;

    /// The non-terminal record for an unordered pair, if any.
    async fn friendship_between(&self, a: &str, b: &str) -> RepoResult<Option<Friendship>>;

    /// Accepted friendships involving the user.
    async fn friends_of(&self, user_id: &str) -> RepoResult<Vec<Friendship>>;

    /// Incoming pending requests.
    async fn pending_for(&self, user_id: &str) -> RepoResult<Vec<Friendship>>;

    /// Outgoing pending requests.
    async fn outgoing_from(&self, user_id: &str) -> RepoResult<Vec<Friendship>>;

    /// Block a user, superseding any existing pair record.
    async fn block_user(
        &self,
        blocker: &UserRecord,
        target: &UserRecord,
    ) -> RepoResult<Friendship>;

    /// Remove an existing block held by `blocker_id` against `target_id`.
    async fn unblock_user(&self, blocker_id: &str, target_id: &str) -> RepoResult<()>;

    /// Whether `blocker_id` has blocked `target_id` (directional).
    async fn is_blocked(&self, blocker_id: &str, target_id: &str) -> RepoResult<bool>;

    // ------------------------------------------------------------------
    // Direct messages
    // ------------------------------------------------------------------

    /// Persist a direct message.
    async fn save_direct_message(&self, dm: &DirectMessage) -> RepoResult<()>;

    /// Conversation history between two users, oldest first.
    async fn dm_history(&self, a: &str, b: &str, limit: usize) -> RepoResult<Vec<DirectMessage>>;

    /// Conversation summaries for a user, most recent first.
    async fn conversations_for(&self, user_id: &str) -> RepoResult<Vec<Conversation>>;

    /// Mark everything from `partner_id` to `reader_id` read; returns
    /// the number of messages affected.
    async fn mark_dms_read(&self, reader_id: &str, partner_id: &str) -> RepoResult<u32>;

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    /// Persist a notification.
    async fn save_notification(&self, notification: &Notification) -> RepoResult<()>;

    /// Page through a user's notifications, newest first.
    async fn notifications_for(
        &self,
        user_id: &str,
        unread_only: bool,
        page: u32,
        page_size: u32,
    ) -> RepoResult<Vec<Notification>>;

    /// Stamp one notification read.
    async fn mark_notification_read(&self, user_id: &str, notification_id: &str) -> RepoResult<()>;

    /// Stamp all of a user's notifications read; returns the count.
    async fn mark_all_notifications_read(&self, user_id: &str) -> RepoResult<u32>;

    /// Delete one notification.
    async fn delete_notification(&self, user_id: &str, notification_id: &str) -> RepoResult<()>;

    /// Unread notification count.
    async fn unread_notification_count(&self, user_id: &str) -> RepoResult<u32>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// A channel definition with role-gated visibility.
#[derive(Debug, Clone)]
struct ChannelDef {
    name: String,
    min_role: Role,
}

/// DashMap-backed repository for dev mode and tests.
///
/// Lock discipline matches the rest of the fabric: short synchronous
/// critical sections, no awaits while holding a guard.
pub struct MemoryRepository {
    channels: RwLock<Vec<ChannelDef>>,
    messages: DashMap<String, ChatMessage>,
    channel_index: DashMap<String, Vec<String>>,
    friendships: DashMap<String, Friendship>,
    dms: RwLock<Vec<DirectMessage>>,
    notifications: DashMap<String, Notification>,
    users: DashMap<String, UserRecord>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    /// Repository pre-seeded with the stock channel set.
    pub fn new() -> Self {
        let channels = vec![
            ChannelDef {
                name: "general".into(),
                min_role: Role::User,
            },
            ChannelDef {
                name: "tech".into(),
                min_role: Role::User,
            },
            ChannelDef {
                name: "marketplace".into(),
                min_role: Role::User,
            },
            ChannelDef {
                name: "music".into(),
                min_role: Role::User,
            },
            ChannelDef {
                name: "staff".into(),
                min_role: Role::Moderator,
            },
        ];
        Self {
            channels: RwLock::new(channels),
            messages: DashMap::new(),
            channel_index: DashMap::new(),
            friendships: DashMap::new(),
            dms: RwLock::new(Vec::new()),
            notifications: DashMap::new(),
            users: DashMap::new(),
        }
    }

    fn pair_matches(f: &Friendship, a: &str, b: &str) -> bool {
        (f.requester_id == a && f.addressee_id == b) || (f.requester_id == b && f.addressee_id == a)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn upsert_user(&self, user: UserRecord) -> RepoResult<()> {
        self.users.insert(user.user_id.clone(), user);
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> RepoResult<Option<UserRecord>> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn search_users(
        &self,
        caller_id: &str,
        query: &str,
        limit: usize,
    ) -> RepoResult<Vec<UserRecord>> {
        let needle = query.to_lowercase();
        let mut hits: Vec<UserRecord> = self
            .users
            .iter()
            .filter(|entry| entry.user_id != caller_id)
            .filter(|entry| {
                entry.user_id == query || entry.username.to_lowercase().contains(&needle)
            })
            .map(|entry| entry.clone())
            .collect();
        hits.sort_by(|a, b| a.username.cmp(&b.username));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn list_channels(&self, role: Role) -> RepoResult<Vec<String>> {
        Ok(self
            .channels
            .read()
            .iter()
            .filter(|c| role_level(role) >= role_level(c.min_role))
            .map(|c| c.name.clone())
            .collect())
    }

    async fn save_message(&self, message: &ChatMessage) -> RepoResult<()> {
        self.channel_index
            .entry(message.channel.clone())
            .or_default()
            .push(message.id.clone());
        self.messages.insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn get_message(&self, message_id: &str) -> RepoResult<Option<ChatMessage>> {
        Ok(self.messages.get(message_id).map(|m| m.clone()))
    }

    async fn channel_history(&self, channel: &str, limit: usize) -> RepoResult<Vec<ChatMessage>> {
        let ids = match self.channel_index.get(channel) {
            Some(ids) => ids.clone(),
            None => return Ok(Vec::new()),
        };
        let start = ids.len().saturating_sub(limit);
        Ok(ids[start..]
            .iter()
            .filter_map(|id| self.messages.get(id).map(|m| m.clone()))
            .collect())
    }

    async fn update_message(
        &self,
        message_id: &str,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> RepoResult<ChatMessage> {
        let mut entry = self
            .messages
            .get_mut(message_id)
            .ok_or(RepoError::NotFound("message"))?;
        entry.content = content.to_string();
        entry.edited_at = Some(edited_at);
        Ok(entry.clone())
    }

    async fn delete_message(&self, message_id: &str) -> RepoResult<()> {
        let (_, removed) = self
            .messages
            .remove(message_id)
            .ok_or(RepoError::NotFound("message"))?;
        if let Some(mut ids) = self.channel_index.get_mut(&removed.channel) {
            ids.retain(|id| id != message_id);
        }
        Ok(())
    }

    async fn add_reaction(
        &self,
        message_id: &str,
        emoji: &str,
        user_id: &str,
    ) -> RepoResult<ChatMessage> {
        let mut entry = self
            .messages
            .get_mut(message_id)
            .ok_or(RepoError::NotFound("message"))?;
        match entry.reactions.iter_mut().find(|r| r.emoji == emoji) {
            Some(reaction) => {
                // Idempotent per (user, message, emoji).
                if !reaction.user_ids.iter().any(|u| u == user_id) {
                    reaction.user_ids.push(user_id.to_string());
                    reaction.count += 1;
                }
            }
            None => entry.reactions.push(Reaction {
                emoji: emoji.to_string(),
                count: 1,
                user_ids: vec![user_id.to_string()],
            }),
        }
        Ok(entry.clone())
    }

    async fn remove_reaction(
        &self,
        message_id: &str,
        emoji: &str,
        user_id: &str,
    ) -> RepoResult<ChatMessage> {
        let mut entry = self
            .messages
            .get_mut(message_id)
            .ok_or(RepoError::NotFound("message"))?;
        if let Some(reaction) = entry.reactions.iter_mut().find(|r| r.emoji == emoji) {
            let before = reaction.user_ids.len();
            reaction.user_ids.retain(|u| u != user_id);
            if reaction.user_ids.len() < before {
                reaction.count -= 1;
            }
        }
        entry.reactions.retain(|r| r.count > 0);
        Ok(entry.clone())
    }

    async fn create_friendship(
        &self,
        requester: &UserRecord,
        addressee: &UserRecord,
    ) -> RepoResult<Friendship> {
        if requester.user_id == addressee.user_id {
            return Err(RepoError::Conflict("cannot befriend yourself"));
        }
        let live = self.friendships.iter().any(|f| {
            Self::pair_matches(&f, &requester.user_id, &addressee.user_id)
                && !f.status.is_terminal()
        });
        if live {
            return Err(RepoError::Conflict("friendship already exists"));
        }
        let friendship = Friendship {
            id: Uuid::new_v4().to_string(),
            requester_id: requester.user_id.clone(),
            addressee_id: addressee.user_id.clone(),
            requester_name: requester.username.clone(),
            addressee_name: addressee.username.clone(),
            status: FriendshipStatus::Pending,
            created_at: Utc::now(),
        };
        self.friendships
            .insert(friendship.id.clone(), friendship.clone());
        Ok(friendship)
    }

    async fn get_friendship(&self, friendship_id: &str) -> RepoResult<Option<Friendship>> {
        Ok(self.friendships.get(friendship_id).map(|f| f.clone()))
    }

    async fn set_friendship_status(
        &self,
        friendship_id: &str,
        status: FriendshipStatus,
    ) -> RepoResult<Friendship> {
        let mut entry = self
            .friendships
            .get_mut(friendship_id)
            .ok_or(RepoError::NotFound("friendship"))?;
        entry.status = status;
        Ok(entry.clone())
    }

    async fn remove_friendship(&self, friendship_id: &str) -> RepoResult<()> {
        self.friendships
            .remove(friendship_id)
            .map(|_| ())
            .ok_or(RepoError::NotFound("friendship"))
    }

    async fn friendship_between(&self, a: &str, b: &str) -> RepoResult<Option<Friendship>> {
        Ok(self
            .friendships
            .iter()
            .find(|f| Self::pair_matches(f, a, b) && !f.status.is_terminal())
            .map(|f| f.clone()))
    }

    async fn friends_of(&self, user_id: &str) -> RepoResult<Vec<Friendship>> {
        Ok(self
            .friendships
            .iter()
            .filter(|f| {
                f.status == FriendshipStatus::Accepted
                    && (f.requester_id == user_id || f.addressee_id == user_id)
            })
            .map(|f| f.clone())
            .collect())
    }

    async fn pending_for(&self, user_id: &str) -> RepoResult<Vec<Friendship>> {
        Ok(self
            .friendships
            .iter()
            .filter(|f| f.status == FriendshipStatus::Pending && f.addressee_id == user_id)
            .map(|f| f.clone())
            .collect())
    }

    async fn outgoing_from(&self, user_id: &str) -> RepoResult<Vec<Friendship>> {
        Ok(self
            .friendships
            .iter()
            .filter(|f| f.status == FriendshipStatus::Pending && f.requester_id == user_id)
            .map(|f| f.clone())
            .collect())
    }

    async fn block_user(
        &self,
        blocker: &UserRecord,
        target: &UserRecord,
    ) -> RepoResult<Friendship> {
        if blocker.user_id == target.user_id {
            return Err(RepoError::Conflict("cannot block yourself"));
        }
        // Blocking supersedes whatever existed for the pair.
        let stale: Vec<String> = self
            .friendships
            .iter()
            .filter(|f| Self::pair_matches(f, &blocker.user_id, &target.user_id))
            .map(|f| f.id.clone())
            .collect();
        for id in stale {
            self.friendships.remove(&id);
        }
        let block = Friendship {
            id: Uuid::new_v4().to_string(),
            requester_id: blocker.user_id.clone(),
            addressee_id: target.user_id.clone(),
            requester_name: blocker.username.clone(),
            addressee_name: target.username.clone(),
            status: FriendshipStatus::Blocked,
            created_at: Utc::now(),
        };
        self.friendships.insert(block.id.clone(), block.clone());
        Ok(block)
    }

    async fn unblock_user(&self, blocker_id: &str, target_id: &str) -> RepoResult<()> {
        let id = self
            .friendships
            .iter()
            .find(|f| {
                f.status == FriendshipStatus::Blocked
                    && f.requester_id == blocker_id
                    && f.addressee_id == target_id
            })
            .map(|f| f.id.clone())
            .ok_or(RepoError::NotFound("block"))?;
        self.friendships.remove(&id);
        Ok(())
    }

    async fn is_blocked(&self, blocker_id: &str, target_id: &str) -> RepoResult<bool> {
        Ok(self.friendships.iter().any(|f| {
            f.status == FriendshipStatus::Blocked
                && f.requester_id == blocker_id
                && f.addressee_id == target_id
        }))
    }

    async fn save_direct_message(&self, dm: &DirectMessage) -> RepoResult<()> {
        self.dms.write().push(dm.clone());
        Ok(())
    }

    async fn dm_history(&self, a: &str, b: &str, limit: usize) -> RepoResult<Vec<DirectMessage>> {
        let dms = self.dms.read();
        let mut history: Vec<DirectMessage> = dms
            .iter()
            .filter(|m| {
                (m.sender_id == a && m.recipient_id == b)
                    || (m.sender_id == b && m.recipient_id == a)
            })
            .cloned()
            .collect();
        let start = history.len().saturating_sub(limit);
        history.drain(..start);
        Ok(history)
    }

    async fn conversations_for(&self, user_id: &str) -> RepoResult<Vec<Conversation>> {
        let dms = self.dms.read();
        let mut partners: Vec<String> = Vec::new();
        for dm in dms.iter() {
            let partner = if dm.sender_id == user_id {
                &dm.recipient_id
            } else if dm.recipient_id == user_id {
                &dm.sender_id
            } else {
                continue;
            };
            if !partners.iter().any(|p| p == partner) {
                partners.push(partner.clone());
            }
        }

        let mut conversations = Vec::with_capacity(partners.len());
        for partner in partners {
            let last_message = dms
                .iter()
                .rev()
                .find(|m| {
                    (m.sender_id == user_id && m.recipient_id == partner)
                        || (m.sender_id == partner && m.recipient_id == user_id)
                })
                .cloned();
            let unread_count = dms
                .iter()
                .filter(|m| m.sender_id == partner && m.recipient_id == user_id && !m.read)
                .count() as u32;
            let record = self.users.get(&partner);
            conversations.push(Conversation {
                partner_id: partner.clone(),
                partner_name: record
                    .as_ref()
                    .map(|r| r.username.clone())
                    .unwrap_or_else(|| partner.clone()),
                partner_avatar: record.as_ref().and_then(|r| r.avatar_url.clone()),
                last_message,
                unread_count,
            });
        }
        conversations.sort_by(|a, b| {
            let at = a.last_message.as_ref().map(|m| m.sent_at);
            let bt = b.last_message.as_ref().map(|m| m.sent_at);
            bt.cmp(&at)
        });
        Ok(conversations)
    }

    async fn mark_dms_read(&self, reader_id: &str, partner_id: &str) -> RepoResult<u32> {
        let mut dms = self.dms.write();
        let mut affected = 0;
        for dm in dms.iter_mut() {
            if dm.sender_id == partner_id && dm.recipient_id == reader_id && !dm.read {
                dm.read = true;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn save_notification(&self, notification: &Notification) -> RepoResult<()> {
        self.notifications
            .insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn notifications_for(
        &self,
        user_id: &str,
        unread_only: bool,
        page: u32,
        page_size: u32,
    ) -> RepoResult<Vec<Notification>> {
        let mut list: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.recipient_id == user_id)
            .filter(|n| !unread_only || n.read_at.is_none())
            .map(|n| n.clone())
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let page = page.max(1);
        let start = ((page - 1) * page_size) as usize;
        Ok(list
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect())
    }

    async fn mark_notification_read(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> RepoResult<()> {
        let mut entry = self
            .notifications
            .get_mut(notification_id)
            .ok_or(RepoError::NotFound("notification"))?;
        if entry.recipient_id != user_id {
            return Err(RepoError::NotFound("notification"));
        }
        if entry.read_at.is_none() {
            entry.read_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_all_notifications_read(&self, user_id: &str) -> RepoResult<u32> {
        let mut affected = 0;
        for mut entry in self.notifications.iter_mut() {
            if entry.recipient_id == user_id && entry.read_at.is_none() {
                entry.read_at = Some(Utc::now());
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete_notification(&self, user_id: &str, notification_id: &str) -> RepoResult<()> {
        let owned = self
            .notifications
            .get(notification_id)
            .map(|n| n.recipient_id == user_id)
            .unwrap_or(false);
        if !owned {
            return Err(RepoError::NotFound("notification"));
        }
        self.notifications.remove(notification_id);
        Ok(())
    }

    async fn unread_notification_count(&self, user_id: &str) -> RepoResult<u32> {
        Ok(self
            .notifications
            .iter()
            .filter(|n| n.recipient_id == user_id && n.read_at.is_none())
            .count() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_proto::MessageKind;

    fn user(id: &str, name: &str) -> UserRecord {
        UserRecord {
            user_id: id.into(),
            username: name.into(),
            avatar_url: None,
        }
    }

    fn message(id: &str, channel: &str, sender: &str) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            channel: channel.into(),
            sender_id: sender.into(),
            sender_name: sender.into(),
            content: "hello".into(),
            kind: MessageKind::Text,
            sent_at: Utc::now(),
            edited_at: None,
            attachments: Vec::new(),
            reactions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn reaction_add_is_idempotent_per_user() {
        let repo = MemoryRepository::new();
        repo.save_message(&message("m1", "general", "u1"))
            .await
            .unwrap();

        repo.add_reaction("m1", "🔥", "u2").await.unwrap();
        let after = repo.add_reaction("m1", "🔥", "u2").await.unwrap();
        assert_eq!(after.reactions.len(), 1);
        assert_eq!(after.reactions[0].count, 1);

        let after = repo.remove_reaction("m1", "🔥", "u2").await.unwrap();
        assert!(after.reactions.is_empty());
    }

    #[tokio::test]
    async fn second_request_for_pair_conflicts() {
        let repo = MemoryRepository::new();
        let (a, b) = (user("a", "ada"), user("b", "bob"));
        repo.create_friendship(&a, &b).await.unwrap();
        // Same pair, either direction, must conflict while non-terminal.
        assert!(matches!(
            repo.create_friendship(&b, &a).await,
            Err(RepoError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn declined_request_frees_the_pair() {
        let repo = MemoryRepository::new();
        let (a, b) = (user("a", "ada"), user("b", "bob"));
        let f = repo.create_friendship(&a, &b).await.unwrap();
        repo.set_friendship_status(&f.id, FriendshipStatus::Declined)
            .await
            .unwrap();
        assert!(repo.create_friendship(&a, &b).await.is_ok());
    }

    #[tokio::test]
    async fn block_supersedes_and_is_directional() {
        let repo = MemoryRepository::new();
        let (a, b) = (user("a", "ada"), user("b", "bob"));
        let f = repo.create_friendship(&a, &b).await.unwrap();
        repo.set_friendship_status(&f.id, FriendshipStatus::Accepted)
            .await
            .unwrap();

        repo.block_user(&a, &b).await.unwrap();
        assert!(repo.friends_of("a").await.unwrap().is_empty());
        assert!(repo.is_blocked("a", "b").await.unwrap());
        assert!(!repo.is_blocked("b", "a").await.unwrap());

        repo.unblock_user("a", "b").await.unwrap();
        assert!(!repo.is_blocked("a", "b").await.unwrap());
    }

    #[tokio::test]
    async fn dm_read_markers_and_conversations() {
        let repo = MemoryRepository::new();
        repo.upsert_user(user("a", "ada")).await.unwrap();
        repo.upsert_user(user("b", "bob")).await.unwrap();

        for i in 0..3 {
            repo.save_direct_message(&DirectMessage {
                id: format!("dm{i}"),
                sender_id: "b".into(),
                recipient_id: "a".into(),
                content: "hey".into(),
                sent_at: Utc::now(),
                read: false,
            })
            .await
            .unwrap();
        }

        let convos = repo.conversations_for("a").await.unwrap();
        assert_eq!(convos.len(), 1);
        assert_eq!(convos[0].partner_name, "bob");
        assert_eq!(convos[0].unread_count, 3);

        assert_eq!(repo.mark_dms_read("a", "b").await.unwrap(), 3);
        let convos = repo.conversations_for("a").await.unwrap();
        assert_eq!(convos[0].unread_count, 0);
    }

    #[tokio::test]
    async fn channel_visibility_is_role_gated() {
        let repo = MemoryRepository::new();
        let user_channels = repo.list_channels(Role::User).await.unwrap();
        assert!(!user_channels.contains(&"staff".to_string()));
        let mod_channels = repo.list_channels(Role::Moderator).await.unwrap();
        assert!(mod_channels.contains(&"staff".to_string()));
    }

    #[tokio::test]
    async fn history_returns_recent_window_in_order() {
        let repo = MemoryRepository::new();
        for i in 0..10 {
            repo.save_message(&message(&format!("m{i}"), "general", "u1"))
                .await
                .unwrap();
        }
        let history = repo.channel_history("general", 4).await.unwrap();
        let ids: Vec<&str> = history.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m6", "m7", "m8", "m9"]);
    }

    #[tokio::test]
    async fn search_excludes_caller() {
        let repo = MemoryRepository::new();
        repo.upsert_user(user("a", "ada")).await.unwrap();
        repo.upsert_user(user("b", "adabot")).await.unwrap();
        let hits = repo.search_users("a", "ada", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].user_id, "b");
    }
}
