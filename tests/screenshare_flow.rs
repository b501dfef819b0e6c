//! Screen-share flows: lifecycle, bandwidth policing, viewer
//! tracking, quality negotiation.

mod common;

use common::{args, TestHub};
use palaver_proto::names::{event, method};
use palaver_proto::{encode_payload, ScreenShare};

async fn join_voice(client: &common::TestClient, channel: &str) {
    client
        .invoke(method::JOIN_VOICE_CHANNEL, args![channel])
        .await;
    client.expect_event(event::VOICE_CHANNEL_USERS).await;
    client.drain();
}

#[tokio::test]
async fn share_lifecycle_announces_to_channel() {
    let hub = TestHub::new();
    let sharer = hub.connect("u1", "ada").await;
    let viewer = hub.connect("u2", "bob").await;
    sharer.drain();
    viewer.drain();
    join_voice(&sharer, "v1").await;
    join_voice(&viewer, "v1").await;
    sharer.drain();
    viewer.drain();

    sharer.invoke(method::START_SCREEN_SHARE, args![]).await;
    let changed = viewer.expect_event(event::USER_SCREEN_SHARE_CHANGED).await;
    assert_eq!(changed.str_arg(0), Some(sharer.conn_id.as_str()));
    assert_eq!(changed.arg(1).unwrap(), true);
    let started = viewer.expect_event(event::SCREEN_SHARE_STARTED).await;
    assert_eq!(started.str_arg(2), Some("v1"));

    // Double-start is refused.
    sharer.invoke(method::START_SCREEN_SHARE, args![]).await;
    sharer.expect_event(event::VOICE_ERROR).await;

    sharer.invoke(method::STOP_SCREEN_SHARE, args![]).await;
    viewer.expect_event(event::SCREEN_SHARE_STOPPED).await;
    let changed = viewer.expect_event(event::USER_SCREEN_SHARE_CHANGED).await;
    assert_eq!(changed.arg(1).unwrap(), false);
}

#[tokio::test]
async fn upload_window_admits_and_drops_exactly() {
    // 30 KiB/s ceiling with 1000-byte frames: 30 admitted per window.
    let hub = TestHub::with_config(|config| {
        config.limits.upload_bytes_per_sec = 30 * 1024;
    });
    let sharer = hub.connect("u1", "ada").await;
    let v2 = hub.connect("u2", "bob").await;
    let v3 = hub.connect("u3", "eve").await;
    for client in [&sharer, &v2, &v3] {
        client.drain();
    }
    join_voice(&sharer, "v1").await;
    join_voice(&v2, "v1").await;
    join_voice(&v3, "v1").await;
    sharer.invoke(method::START_SCREEN_SHARE, args![]).await;
    for client in [&sharer, &v2, &v3] {
        client.drain();
    }

    let frame = encode_payload(&vec![0xABu8; 1000]);
    for _ in 0..40 {
        sharer
            .invoke(
                method::SEND_SCREEN_FRAME,
                vec![frame.clone(), 800.into(), 600.into()],
            )
            .await;
    }

    // floor(30720 / 1000) = 30 frames fit; the remaining 10 drop.
    for viewer in [&v2, &v3] {
        let frames = viewer.collect_events(event::RECEIVE_SCREEN_FRAME);
        assert_eq!(frames.len(), 30);
        assert_eq!(frames[0].str_arg(0), Some(sharer.conn_id.as_str()));
        assert_eq!(frames[0].arg(2).unwrap(), 800);
        assert_eq!(frames[0].arg(3).unwrap(), 600);
    }
    // The sender never receives its own frames.
    sharer.assert_no_event(event::RECEIVE_SCREEN_FRAME);

    let share = hub.fabric.screen.share_of(&sharer.conn_id).unwrap();
    assert_eq!(share.frames_sent, 30);
    assert_eq!(share.frames_dropped, 10);
    assert_eq!(share.bytes_sent, 30_000);
    assert_eq!((share.width, share.height), (800, 600));
}

#[tokio::test]
async fn viewer_tracking_updates_the_sharer() {
    let hub = TestHub::new();
    let sharer = hub.connect("u1", "ada").await;
    let viewer = hub.connect("u2", "bob").await;
    sharer.drain();
    viewer.drain();
    join_voice(&sharer, "v1").await;
    join_voice(&viewer, "v1").await;
    sharer.invoke(method::START_SCREEN_SHARE, args![]).await;
    sharer.drain();
    viewer.drain();

    viewer
        .invoke(method::JOIN_SCREEN_SHARE, args![sharer.conn_id])
        .await;
    let count = sharer.expect_event(event::VIEWER_COUNT_UPDATED).await;
    assert_eq!(count.arg(0).unwrap(), 1);

    viewer.invoke(method::GET_ACTIVE_SCREEN_SHARES, args![]).await;
    let shares: Vec<ScreenShare> = viewer
        .expect_event(event::ACTIVE_SCREEN_SHARES)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(shares.len(), 1);
    assert_eq!(shares[0].viewer_count, 1);

    viewer
        .invoke(method::LEAVE_SCREEN_SHARE, args![sharer.conn_id])
        .await;
    let count = sharer.expect_event(event::VIEWER_COUNT_UPDATED).await;
    assert_eq!(count.arg(0).unwrap(), 0);
}

#[tokio::test]
async fn quality_requests_pass_through_to_the_sharer() {
    let hub = TestHub::new();
    let sharer = hub.connect("u1", "ada").await;
    let viewer = hub.connect("u2", "bob").await;
    sharer.drain();
    viewer.drain();
    join_voice(&sharer, "v1").await;
    join_voice(&viewer, "v1").await;
    sharer.invoke(method::START_SCREEN_SHARE, args![]).await;
    sharer.drain();
    viewer.drain();

    viewer
        .invoke(
            method::REQUEST_SCREEN_QUALITY,
            args![sharer.conn_id, "1080p60"],
        )
        .await;
    let requested = sharer.expect_event(event::SCREEN_QUALITY_REQUESTED).await;
    assert_eq!(requested.str_arg(0), Some(viewer.conn_id.as_str()));
    assert_eq!(requested.str_arg(1), Some("1080p60"));

    viewer.invoke(method::GET_ACTIVE_SCREEN_SHARES, args![]).await;
    let shares: Vec<ScreenShare> = viewer
        .expect_event(event::ACTIVE_SCREEN_SHARES)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(
        shares[0].quality,
        palaver_proto::ScreenQuality::Q1080F60
    );
}

#[tokio::test]
async fn stream_cap_per_channel_is_enforced() {
    let hub = TestHub::with_config(|config| {
        config.limits.max_streams_per_channel = 1;
    });
    let first = hub.connect("u1", "ada").await;
    let second = hub.connect("u2", "bob").await;
    first.drain();
    second.drain();
    join_voice(&first, "v1").await;
    join_voice(&second, "v1").await;
    first.invoke(method::START_SCREEN_SHARE, args![]).await;
    first.drain();
    second.drain();

    second.invoke(method::START_SCREEN_SHARE, args![]).await;
    second.expect_event(event::VOICE_ERROR).await;
}

#[tokio::test]
async fn sharer_disconnect_notifies_channel_and_viewers() {
    let hub = TestHub::new();
    let sharer = hub.connect("u1", "ada").await;
    let v2 = hub.connect("u2", "bob").await;
    let v3 = hub.connect("u3", "eve").await;
    for client in [&sharer, &v2, &v3] {
        client.drain();
    }
    join_voice(&sharer, "v1").await;
    join_voice(&v2, "v1").await;
    join_voice(&v3, "v1").await;
    sharer.invoke(method::START_SCREEN_SHARE, args![]).await;
    for client in [&sharer, &v2, &v3] {
        client.drain();
    }

    sharer.disconnect().await;
    for viewer in [&v2, &v3] {
        let stopped = viewer.expect_event(event::SCREEN_SHARE_STOPPED).await;
        assert_eq!(stopped.str_arg(0), Some(sharer.conn_id.as_str()));
        let changed = viewer.expect_event(event::USER_SCREEN_SHARE_CHANGED).await;
        assert_eq!(changed.arg(1).unwrap(), false);
    }
    assert!(hub.fabric.screen.share_of(&sharer.conn_id).is_none());
}
