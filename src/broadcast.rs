//! Cross-hub broadcast API.
//!
//! Other components (REST controllers, timers, the marketplace engine)
//! push events into the hubs without a live connection context through
//! this handle. It is plain injected state: cloneable, no globals, no
//! hidden coupling.

use std::sync::Arc;

use palaver_proto::names::{event, group};
use palaver_proto::{args, FeedEvent, FeedEventKind, Notification, ServerFrame, UserSnapshot};
use tracing::warn;

use crate::state::{route_groups, Fabric};

/// Process-wide push interface, parameterised by the fabric handle.
#[derive(Clone)]
pub struct Broadcaster {
    fabric: Arc<Fabric>,
}

impl Broadcaster {
    /// Handle bound to a fabric.
    pub fn new(fabric: Arc<Fabric>) -> Self {
        Self { fabric }
    }

    /// Refresh a user's cached snapshot and announce it to everyone.
    pub fn broadcast_profile_update(&self, snapshot: UserSnapshot) {
        self.fabric
            .presence
            .replace_snapshot(&snapshot.user_id, snapshot.clone());
        self.fabric.groups.broadcast_all(ServerFrame::event(
            event::USER_PROFILE_UPDATED,
            args![snapshot],
        ));
    }

    /// Persist and deliver a notification, bumping the unread counter
    /// on every one of the recipient's devices.
    pub async fn send_notification_to_user(&self, user_id: &str, notification: Notification) {
        if let Err(e) = self.fabric.repo.save_notification(&notification).await {
            warn!(error = %e, user = %user_id, "Failed to persist notification");
            return;
        }
        let target = group::notifications(user_id);
        self.fabric.groups.broadcast(
            &target,
            ServerFrame::event(event::NEW_NOTIFICATION, args![notification]),
        );
        match self.fabric.repo.unread_notification_count(user_id).await {
            Ok(count) => self.fabric.groups.broadcast(
                &target,
                ServerFrame::event(event::UNREAD_COUNT, args![count]),
            ),
            Err(e) => warn!(error = %e, "Failed to read unread count"),
        }
    }

    /// Route a feed event to its groups. Price drops carry their own
    /// event name; everything else arrives as `FeedEvent`. Target
    /// groups overlap (a follower may also watch the auction), so the
    /// fan-out set is de-duplicated per connection: each recipient sees
    /// the event exactly once.
    pub fn broadcast_feed_event(&self, feed_event: FeedEvent) {
        let name = if feed_event.kind == FeedEventKind::PriceDrop {
            event::PRICE_DROP
        } else {
            event::FEED_EVENT
        };
        let frame = Arc::new(ServerFrame::event(name, args![feed_event]));
        let mut seen = std::collections::HashSet::new();
        for target in route_groups(&feed_event) {
            for conn_id in self.fabric.groups.members(&target) {
                if seen.insert(conn_id.clone()) {
                    self.fabric.connections.send_to_conn(&conn_id, frame.clone());
                }
            }
        }
    }

    /// A new public post.
    pub fn broadcast_new_post(&self, feed_event: FeedEvent) {
        self.broadcast_feed_event(FeedEvent {
            kind: FeedEventKind::NewPost,
            ..feed_event
        });
    }

    /// A new marketplace listing.
    pub fn broadcast_new_product(&self, feed_event: FeedEvent) {
        self.broadcast_feed_event(FeedEvent {
            kind: FeedEventKind::NewProduct,
            ..feed_event
        });
    }

    /// A bid on an auction.
    pub fn broadcast_auction_bid(&self, feed_event: FeedEvent) {
        self.broadcast_feed_event(FeedEvent {
            kind: FeedEventKind::AuctionBid,
            ..feed_event
        });
    }

    /// An auction close to ending.
    pub fn broadcast_auction_ending(&self, feed_event: FeedEvent) {
        self.broadcast_feed_event(FeedEvent {
            kind: FeedEventKind::AuctionEnding,
            ..feed_event
        });
    }

    /// An edit to an existing post.
    pub fn broadcast_post_update(&self, feed_event: FeedEvent) {
        self.broadcast_feed_event(FeedEvent {
            kind: FeedEventKind::PostUpdate,
            ..feed_event
        });
    }

    /// An image upload surfaced to followers.
    pub fn broadcast_image_upload(&self, feed_event: FeedEvent) {
        self.broadcast_feed_event(FeedEvent {
            kind: FeedEventKind::ImageUpload,
            ..feed_event
        });
    }

    /// A reaction to feed content.
    pub fn broadcast_reaction(&self, feed_event: FeedEvent) {
        self.broadcast_feed_event(FeedEvent {
            kind: FeedEventKind::Reaction,
            ..feed_event
        });
    }

    /// A comment on feed content.
    pub fn broadcast_comment(&self, feed_event: FeedEvent) {
        self.broadcast_feed_event(FeedEvent {
            kind: FeedEventKind::Comment,
            ..feed_event
        });
    }

    /// A profile/banner change surfaced to followers.
    pub fn broadcast_presence_update(&self, feed_event: FeedEvent) {
        self.broadcast_feed_event(FeedEvent {
            kind: FeedEventKind::PresenceUpdate,
            ..feed_event
        });
    }

    /// A price drop on a listing.
    pub fn broadcast_price_drop(&self, feed_event: FeedEvent) {
        self.broadcast_feed_event(FeedEvent {
            kind: FeedEventKind::PriceDrop,
            ..feed_event
        });
    }

    /// A generic feed item.
    pub fn broadcast_feed_item(&self, feed_event: FeedEvent) {
        self.broadcast_feed_event(FeedEvent {
            kind: FeedEventKind::FeedItem,
            ..feed_event
        });
    }
}
