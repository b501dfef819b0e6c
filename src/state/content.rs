//! Content-feed subscriptions and event routing.
//!
//! Subscriptions are in-memory per-user preference sets; the derived
//! fan-out state (which groups a connection joins) lives in the group
//! router. Routing is a pure function from event metadata to group
//! names so producers and tests agree on it.

use dashmap::DashMap;
use palaver_proto::names::group;
use palaver_proto::{ContentSubscription, FeedEvent, FeedEventKind};

use super::connections::UserId;

/// Per-user content subscription table.
#[derive(Default)]
pub struct SubscriptionManager {
    subs: DashMap<UserId, ContentSubscription>,
}

impl SubscriptionManager {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a default subscription exists (called on authenticate).
    pub fn ensure(&self, user_id: &str) -> ContentSubscription {
        self.subs
            .entry(user_id.to_string())
            .or_insert_with(|| ContentSubscription {
                receive_all_public_posts: true,
                receive_auction_updates: true,
                receive_price_drops: true,
                ..Default::default()
            })
            .clone()
    }

    /// Current subscription, defaulting lazily.
    pub fn get(&self, user_id: &str) -> ContentSubscription {
        self.ensure(user_id)
    }

    /// Replace a subscription wholesale, de-duplicating its sets.
    pub fn update(&self, user_id: &str, mut sub: ContentSubscription) -> ContentSubscription {
        dedup(&mut sub.followed_user_ids);
        dedup(&mut sub.watched_auction_ids);
        dedup(&mut sub.interested_categories);
        self.subs.insert(user_id.to_string(), sub.clone());
        sub
    }

    /// Follow an author. Returns `false` when already followed.
    pub fn follow(&self, user_id: &str, target: &str) -> bool {
        self.mutate(user_id, |sub| {
            if sub.followed_user_ids.iter().any(|u| u == target) {
                false
            } else {
                sub.followed_user_ids.push(target.to_string());
                true
            }
        })
    }

    /// Unfollow an author. Returns `false` when not followed.
    pub fn unfollow(&self, user_id: &str, target: &str) -> bool {
        self.mutate(user_id, |sub| {
            let before = sub.followed_user_ids.len();
            sub.followed_user_ids.retain(|u| u != target);
            sub.followed_user_ids.len() < before
        })
    }

    /// Watch an auction. Returns `false` when already watched.
    pub fn watch_auction(&self, user_id: &str, auction_id: &str) -> bool {
        self.mutate(user_id, |sub| {
            if sub.watched_auction_ids.iter().any(|a| a == auction_id) {
                false
            } else {
                sub.watched_auction_ids.push(auction_id.to_string());
                true
            }
        })
    }

    /// Stop watching an auction.
    pub fn unwatch_auction(&self, user_id: &str, auction_id: &str) -> bool {
        self.mutate(user_id, |sub| {
            let before = sub.watched_auction_ids.len();
            sub.watched_auction_ids.retain(|a| a != auction_id);
            sub.watched_auction_ids.len() < before
        })
    }

    /// Subscribe to a category. Returns `false` when already subscribed.
    pub fn subscribe_category(&self, user_id: &str, category: &str) -> bool {
        self.mutate(user_id, |sub| {
            if sub.interested_categories.iter().any(|c| c == category) {
                false
            } else {
                sub.interested_categories.push(category.to_string());
                true
            }
        })
    }

    /// Drop a user's subscription (nothing keeps it after their last
    /// disconnect; re-created on next authenticate).
    pub fn remove(&self, user_id: &str) {
        self.subs.remove(user_id);
    }

    fn mutate<R>(&self, user_id: &str, apply: impl FnOnce(&mut ContentSubscription) -> R) -> R {
        let mut entry = self
            .subs
            .entry(user_id.to_string())
            .or_insert_with(|| ContentSubscription {
                receive_all_public_posts: true,
                receive_auction_updates: true,
                receive_price_drops: true,
                ..Default::default()
            });
        apply(&mut entry)
    }
}

fn dedup(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

/// The fan-out groups a feed event targets.
pub fn route_groups(event: &FeedEvent) -> Vec<String> {
    let mut groups = Vec::new();
    let author = event.author_id.as_deref();
    let category = event.category.as_deref();
    let auction = event.auction_id.as_deref();

    match event.kind {
        FeedEventKind::NewPost | FeedEventKind::NewProduct => {
            groups.push(group::GLOBAL_FEED.to_string());
            if let Some(author) = author {
                groups.push(group::following(author));
            }
            if let Some(category) = category {
                groups.push(group::category(category));
            }
        }
        FeedEventKind::AuctionBid => {
            if let Some(auction) = auction {
                groups.push(group::auction(auction));
            }
            if let Some(owner) = event.auction_owner_id.as_deref() {
                groups.push(group::user(owner));
            }
            groups.push(group::GLOBAL_FEED.to_string());
        }
        FeedEventKind::AuctionEnding => {
            if let Some(auction) = auction {
                groups.push(group::auction(auction));
            }
            groups.push(group::GLOBAL_FEED.to_string());
        }
        FeedEventKind::PriceDrop => {
            if let Some(auction) = auction {
                groups.push(group::auction(auction));
            }
            if let Some(category) = category {
                groups.push(group::category(category));
            }
            groups.push(group::GLOBAL_FEED.to_string());
        }
        FeedEventKind::PostUpdate
        | FeedEventKind::ImageUpload
        | FeedEventKind::Reaction
        | FeedEventKind::Comment
        | FeedEventKind::PresenceUpdate => {
            if let Some(author) = author {
                groups.push(group::following(author));
            }
        }
        FeedEventKind::FeedItem => {
            groups.push(group::GLOBAL_FEED.to_string());
            if let Some(author) = author {
                groups.push(group::following(author));
            }
        }
    }

    dedup(&mut groups);
    groups
}
