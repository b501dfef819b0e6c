//! Disconnect cleanup: after a connection drops, none of its
//! identifiers survive in any registry, and departure announcements
//! fire only for the user's last connection.

mod common;

use common::{args, TestHub};
use palaver_proto::names::{event, method};
use palaver_proto::{ChatMessage, Friendship, MessageKind, VoiceRoom};

#[tokio::test]
async fn disconnect_purges_every_registry() {
    let hub = TestHub::new();
    let doomed = hub.connect("u1", "ada").await;
    let friend = hub.connect("u2", "bob").await;
    let bystander = hub.connect("u3", "eve").await;
    for client in [&doomed, &friend, &bystander] {
        client.drain();
    }

    // Befriend so the offline fan-out is observable.
    doomed
        .invoke(method::SEND_FRIEND_REQUEST_BY_ID, args!["u2"])
        .await;
    let request: Friendship = friend
        .expect_event(event::NEW_FRIEND_REQUEST)
        .await
        .obj_arg(0)
        .unwrap();
    friend
        .invoke(method::RESPOND_TO_FRIEND_REQUEST, args![request.id, true])
        .await;

    // Occupy every voice registry: channel, share, viewers, call.
    doomed.invoke(method::JOIN_VOICE_CHANNEL, args!["v1"]).await;
    bystander
        .invoke(method::JOIN_VOICE_CHANNEL, args!["v1"])
        .await;
    doomed.invoke(method::START_SCREEN_SHARE, args![]).await;
    bystander.invoke(method::START_SCREEN_SHARE, args![]).await;
    // The doomed connection also watches the bystander's share.
    doomed
        .invoke(method::JOIN_SCREEN_SHARE, args![bystander.conn_id])
        .await;
    doomed.invoke(method::START_CALL, args!["u2"]).await;
    for client in [&doomed, &friend, &bystander] {
        client.drain();
    }

    doomed.disconnect().await;

    // Registries no longer know the connection.
    let conn = doomed.conn_id.as_str();
    assert!(hub.fabric.connections.user_of(conn).is_none());
    assert!(hub.fabric.voice.channel_of(conn).is_none());
    assert!(hub
        .fabric
        .voice
        .participants("v1")
        .iter()
        .all(|p| p.connection_id != conn));
    assert!(hub.fabric.screen.share_of(conn).is_none());
    let bystander_share = hub.fabric.screen.share_of(&bystander.conn_id).unwrap();
    assert!(!bystander_share.viewers.contains(conn));
    assert!(hub.fabric.calls.active_call_of("u1").is_none());
    assert!(hub.fabric.groups.groups_of(conn).is_empty());
    assert!(!hub.fabric.presence.is_online("u1"));

    // Channel members saw the share stop, then the sharer whose
    // audience shrank got the new viewer count, then the participant
    // left the channel. The cleanup order is part of the contract.
    bystander.expect_event(event::SCREEN_SHARE_STOPPED).await;
    let count = bystander.expect_event(event::VIEWER_COUNT_UPDATED).await;
    assert_eq!(count.arg(0).unwrap(), 0);
    bystander.expect_event(event::USER_LEFT_VOICE).await;

    // The call peer was told, the friend saw the user go offline, and
    // the room fan-outs reached everyone.
    let ended = friend.expect_event(event::CALL_ENDED).await;
    assert_eq!(ended.str_arg(1), Some("User disconnected"));
    let offline = friend.expect_event(event::FRIEND_OFFLINE).await;
    assert_eq!(offline.str_arg(0), Some("u1"));
    friend.expect_event(event::USER_LEFT).await;

    // Departure posts a system Leave message to general.
    let leave: ChatMessage = friend
        .expect_event(event::RECEIVE_MESSAGE)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(leave.kind, MessageKind::Leave);
    assert_eq!(leave.sender_id, "u1");
}

#[tokio::test]
async fn half_authenticated_connections_clean_up_quietly() {
    let hub = TestHub::new();
    let watcher = hub.connect("u9", "nat").await;
    watcher.drain();

    let ghost = hub.connect_raw();
    ghost.disconnect().await;

    assert!(hub.fabric.connections.user_of(&ghost.conn_id).is_none());
    watcher.assert_no_event(event::USER_LEFT);
    watcher.assert_no_event(event::RECEIVE_MESSAGE);
}

#[tokio::test]
async fn room_host_disconnect_transfers_or_closes() {
    let hub = TestHub::new();
    let host = hub.connect("u1", "ada").await;
    let guest = hub.connect("u2", "bob").await;
    host.drain();
    guest.drain();

    host.invoke(
        method::CREATE_VOICE_ROOM,
        args![serde_json::json!({"name": "drop-test", "isPublic": true, "maxParticipants": 5})],
    )
    .await;
    let room: VoiceRoom = host
        .expect_event(event::VOICE_ROOM_JOINED)
        .await
        .obj_arg(0)
        .unwrap();
    guest.invoke(method::JOIN_VOICE_ROOM, args![room.id]).await;
    guest.expect_event(event::VOICE_ROOM_JOINED).await;
    host.drain();
    guest.drain();

    host.disconnect().await;
    let changed = guest.expect_event(event::VOICE_ROOM_HOST_CHANGED).await;
    assert_eq!(changed.str_arg(1), Some("u2"));
    assert_eq!(hub.fabric.rooms.room(&room.id).unwrap().host_id, "u2");

    // Last participant dropping closes the room entirely.
    guest.disconnect().await;
    assert!(hub.fabric.rooms.room(&room.id).is_none());
}
