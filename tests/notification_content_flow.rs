//! Notification delivery and content-feed routing through the
//! cross-hub broadcast API.

mod common;

use chrono::Utc;
use common::{args, TestHub};
use palaver_proto::names::{event, method};
use palaver_proto::{ContentSubscription, FeedEvent, FeedEventKind, Notification};
use palaverd::broadcast::Broadcaster;
use palaverd::repo::Repository;
use uuid::Uuid;

fn notification(recipient: &str, title: &str) -> Notification {
    Notification {
        id: Uuid::new_v4().to_string(),
        recipient_id: recipient.to_string(),
        kind: "marketplace".into(),
        title: title.into(),
        message: "something happened".into(),
        icon: None,
        action_url: None,
        created_at: Utc::now(),
        read_at: None,
    }
}

fn feed_event(kind: FeedEventKind, author: Option<&str>) -> FeedEvent {
    FeedEvent {
        id: Uuid::new_v4().to_string(),
        kind,
        author_id: author.map(str::to_string),
        category: Some("vinyl".into()),
        auction_id: Some("a1".into()),
        auction_owner_id: Some("owner".into()),
        payload: serde_json::json!({"title": "rare pressing"}),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn notifications_reach_every_device_with_counters() {
    let hub = TestHub::new();
    let phone = hub.connect("u1", "ada").await;
    let desktop = hub.connect("u1", "ada").await;
    let other = hub.connect("u2", "bob").await;
    for client in [&phone, &desktop, &other] {
        client.drain();
    }

    let broadcaster = Broadcaster::new(hub.fabric.clone());
    broadcaster
        .send_notification_to_user("u1", notification("u1", "Outbid!"))
        .await;

    for device in [&phone, &desktop] {
        let delivered: Notification = device
            .expect_event(event::NEW_NOTIFICATION)
            .await
            .obj_arg(0)
            .unwrap();
        assert_eq!(delivered.title, "Outbid!");
        let count = device.expect_event(event::UNREAD_COUNT).await;
        assert_eq!(count.arg(0).unwrap(), 1);
    }
    other.assert_no_event(event::NEW_NOTIFICATION);
}

#[tokio::test]
async fn read_markers_and_deletion_update_the_counter() {
    let hub = TestHub::new();
    let client = hub.connect("u1", "ada").await;
    client.drain();

    let broadcaster = Broadcaster::new(hub.fabric.clone());
    let first = notification("u1", "one");
    broadcaster
        .send_notification_to_user("u1", first.clone())
        .await;
    broadcaster
        .send_notification_to_user("u1", notification("u1", "two"))
        .await;
    client.drain();

    client
        .invoke(method::GET_NOTIFICATIONS, args![true, 1, 10])
        .await;
    let listed: Vec<Notification> = client
        .expect_event(event::NOTIFICATIONS)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(listed.len(), 2);

    client.invoke(method::MARK_AS_READ, args![first.id]).await;
    let count = client.expect_event(event::UNREAD_COUNT).await;
    assert_eq!(count.arg(0).unwrap(), 1);

    client.invoke(method::MARK_ALL_AS_READ, args![]).await;
    let count = client.expect_event(event::UNREAD_COUNT).await;
    assert_eq!(count.arg(0).unwrap(), 0);

    client
        .invoke(method::DELETE_NOTIFICATION, args![first.id])
        .await;
    client.expect_event(event::UNREAD_COUNT).await;
    assert_eq!(
        hub.repo
            .notifications_for("u1", false, 1, 10)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn new_posts_fan_out_to_the_global_feed() {
    let hub = TestHub::new();
    let reader = hub.connect("u1", "ada").await;
    reader.drain();

    let broadcaster = Broadcaster::new(hub.fabric.clone());
    broadcaster.broadcast_new_post(feed_event(FeedEventKind::NewPost, Some("author")));

    let item: FeedEvent = reader
        .expect_event(event::FEED_EVENT)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(item.kind, FeedEventKind::NewPost);
    // Exactly once despite overlapping target groups.
    reader.assert_no_event(event::FEED_EVENT);
}

#[tokio::test]
async fn follower_only_events_respect_subscriptions() {
    let hub = TestHub::new();
    let follower = hub.connect("u1", "ada").await;
    let stranger = hub.connect("u2", "bob").await;
    follower.drain();
    stranger.drain();

    follower.invoke(method::FOLLOW_USER, args!["author"]).await;
    follower.expect_event(event::SUBSCRIPTION_UPDATED).await;

    let broadcaster = Broadcaster::new(hub.fabric.clone());
    broadcaster.broadcast_comment(feed_event(FeedEventKind::Comment, Some("author")));

    let item: FeedEvent = follower
        .expect_event(event::FEED_EVENT)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(item.kind, FeedEventKind::Comment);
    stranger.assert_no_event(event::FEED_EVENT);

    // Unfollow stops the stream.
    follower.invoke(method::UNFOLLOW_USER, args!["author"]).await;
    follower.drain();
    broadcaster.broadcast_comment(feed_event(FeedEventKind::Comment, Some("author")));
    follower.assert_no_event(event::FEED_EVENT);
}

#[tokio::test]
async fn price_drops_use_their_own_event_name() {
    let hub = TestHub::new();
    let reader = hub.connect("u1", "ada").await;
    reader.drain();

    let broadcaster = Broadcaster::new(hub.fabric.clone());
    broadcaster.broadcast_price_drop(feed_event(FeedEventKind::PriceDrop, None));

    let drop_event = reader.expect_event(event::PRICE_DROP).await;
    let item: FeedEvent = drop_event.obj_arg(0).unwrap();
    assert_eq!(item.kind, FeedEventKind::PriceDrop);
}

#[tokio::test]
async fn auction_watchers_and_owner_get_bids() {
    let hub = TestHub::new();
    let watcher = hub.connect("u1", "ada").await;
    let owner = hub.connect("owner", "oda").await;
    watcher.drain();
    owner.drain();

    watcher.invoke(method::WATCH_AUCTION, args!["a1"]).await;
    watcher.expect_event(event::SUBSCRIPTION_UPDATED).await;

    let broadcaster = Broadcaster::new(hub.fabric.clone());
    broadcaster.broadcast_auction_bid(feed_event(FeedEventKind::AuctionBid, Some("bidder")));

    // Watcher via auction_<id>, owner via the personal group; both
    // also sit in the global feed, but the event arrives exactly once.
    for client in [&watcher, &owner] {
        let bids = client.collect_events(event::FEED_EVENT);
        assert_eq!(bids.len(), 1);
    }
}

#[tokio::test]
async fn subscription_updates_replace_and_dedup() {
    let hub = TestHub::new();
    let client = hub.connect("u1", "ada").await;
    client.drain();

    client
        .invoke(
            method::UPDATE_SUBSCRIPTION,
            args![serde_json::json!({
                "receiveAllPublicPosts": true,
                "receiveAuctionUpdates": true,
                "receivePriceDrops": false,
                "followedUserIds": ["a", "a", "b"],
                "watchedAuctionIds": [],
                "interestedCategories": ["vinyl"]
            })],
        )
        .await;
    let updated: ContentSubscription = client
        .expect_event(event::SUBSCRIPTION_UPDATED)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(updated.followed_user_ids, vec!["a", "b"]);

    client.invoke(method::GET_SUBSCRIPTION, args![]).await;
    let current: ContentSubscription = client
        .expect_event(event::SUBSCRIPTION)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(current.interested_categories, vec!["vinyl"]);
    assert!(!current.receive_price_drops);
}
