//! Voice room flows: creation, capacity, passwords, host transfer,
//! moderation, discovery.

mod common;

use common::{args, TestHub};
use palaver_proto::names::{event, method};
use palaver_proto::{VoiceRoom, VoiceRoomPage};
use serde_json::json;

async fn create_room(
    client: &common::TestClient,
    name: &str,
    overrides: serde_json::Value,
) -> VoiceRoom {
    let mut request = json!({
        "name": name,
        "isPublic": true,
        "maxParticipants": 10,
        "category": "hangout",
        "allowScreenShare": true,
    });
    if let (Some(base), Some(extra)) = (request.as_object_mut(), overrides.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    client.invoke(method::CREATE_VOICE_ROOM, args![request]).await;
    client
        .expect_event(event::VOICE_ROOM_JOINED)
        .await
        .obj_arg(0)
        .unwrap()
}

#[tokio::test]
async fn public_rooms_are_announced_and_capacity_clamped() {
    let hub = TestHub::new();
    let host = hub.connect("u1", "ada").await;
    let other = hub.connect("u2", "bob").await;
    host.drain();
    other.drain();

    let room = create_room(&host, "lounge", json!({"maxParticipants": 500})).await;
    assert_eq!(room.host_id, "u1");
    assert_eq!(room.max_participants, 50);
    assert_eq!(room.participant_count, 1);

    let announced: VoiceRoom = other
        .expect_event(event::VOICE_ROOM_ADDED)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(announced.id, room.id);
}

#[tokio::test]
async fn join_respects_capacity_with_typed_error() {
    let hub = TestHub::new();
    let host = hub.connect("u1", "ada").await;
    let room = create_room(&host, "small", json!({"maxParticipants": 3})).await;
    host.drain();

    let u2 = hub.connect("u2", "bob").await;
    let u3 = hub.connect("u3", "eve").await;
    let u4 = hub.connect("u4", "mal").await;
    for client in [&u2, &u3, &u4] {
        client.drain();
    }

    u2.invoke(method::JOIN_VOICE_ROOM, args![room.id]).await;
    u2.expect_event(event::VOICE_ROOM_JOINED).await;
    u3.invoke(method::JOIN_VOICE_ROOM, args![room.id]).await;
    u3.expect_event(event::VOICE_ROOM_JOINED).await;

    u4.invoke(method::JOIN_VOICE_ROOM, args![room.id]).await;
    let error = u4.expect_event(event::VOICE_ROOM_ERROR).await;
    assert_eq!(error.str_arg(0), Some("Room is full"));

    let current = hub.fabric.rooms.room(&room.id).unwrap();
    assert_eq!(current.participant_count, 3);
}

#[tokio::test]
async fn password_rooms_require_the_right_password() {
    let hub = TestHub::new();
    let host = hub.connect("u1", "ada").await;
    let room = create_room(
        &host,
        "vault",
        json!({"isPublic": false, "password": "sesame"}),
    )
    .await;
    host.drain();
    let guest = hub.connect("u2", "bob").await;
    guest.drain();

    guest.invoke(method::JOIN_VOICE_ROOM, args![room.id]).await;
    let error = guest.expect_event(event::VOICE_ROOM_ERROR).await;
    assert_eq!(error.str_arg(0), Some("Room requires a password"));

    guest
        .invoke(method::JOIN_VOICE_ROOM, args![room.id, "wrong"])
        .await;
    let error = guest.expect_event(event::VOICE_ROOM_ERROR).await;
    assert_eq!(error.str_arg(0), Some("Incorrect password"));

    guest
        .invoke(method::JOIN_VOICE_ROOM, args![room.id, "sesame"])
        .await;
    let joined: VoiceRoom = guest
        .expect_event(event::VOICE_ROOM_JOINED)
        .await
        .obj_arg(0)
        .unwrap();
    assert!(joined.has_password);
    assert_eq!(joined.participant_count, 2);
}

#[tokio::test]
async fn host_leave_transfers_to_earliest_joined() {
    let hub = TestHub::new();
    let host = hub.connect("u1", "ada").await;
    let room = create_room(&host, "relay", json!({})).await;
    let u2 = hub.connect("u2", "bob").await;
    let u3 = hub.connect("u3", "eve").await;
    u2.invoke(method::JOIN_VOICE_ROOM, args![room.id]).await;
    u2.expect_event(event::VOICE_ROOM_JOINED).await;
    u3.invoke(method::JOIN_VOICE_ROOM, args![room.id]).await;
    u3.expect_event(event::VOICE_ROOM_JOINED).await;
    for client in [&host, &u2, &u3] {
        client.drain();
    }

    host.invoke(method::LEAVE_VOICE_ROOM, args![room.id]).await;

    let changed = u2.expect_event(event::VOICE_ROOM_HOST_CHANGED).await;
    assert_eq!(changed.str_arg(0), Some(room.id.as_str()));
    assert_eq!(changed.str_arg(1), Some("u2"));
    u3.expect_event(event::VOICE_ROOM_HOST_CHANGED).await;
    assert_eq!(hub.fabric.rooms.room(&room.id).unwrap().host_id, "u2");
}

#[tokio::test]
async fn last_leave_removes_public_room() {
    let hub = TestHub::new();
    let host = hub.connect("u1", "ada").await;
    let watcher = hub.connect("u2", "bob").await;
    let room = create_room(&host, "ghost-town", json!({})).await;
    host.drain();
    watcher.drain();

    host.invoke(method::LEAVE_VOICE_ROOM, args![room.id]).await;
    let removed = watcher.expect_event(event::VOICE_ROOM_REMOVED).await;
    assert_eq!(removed.str_arg(0), Some(room.id.as_str()));
    assert!(hub.fabric.rooms.room(&room.id).is_none());
}

#[tokio::test]
async fn kick_and_promote_are_privilege_gated() {
    let hub = TestHub::new();
    let host = hub.connect("u1", "ada").await;
    let room = create_room(&host, "mods", json!({})).await;
    let u2 = hub.connect("u2", "bob").await;
    let u3 = hub.connect("u3", "eve").await;
    u2.invoke(method::JOIN_VOICE_ROOM, args![room.id]).await;
    u3.invoke(method::JOIN_VOICE_ROOM, args![room.id]).await;
    for client in [&host, &u2, &u3] {
        client.drain();
    }

    // A plain participant cannot kick.
    u2.invoke(method::KICK_FROM_VOICE_ROOM, args![room.id, "u3"])
        .await;
    u2.expect_event(event::VOICE_ROOM_ERROR).await;

    // Promotion is host-only, then the moderator can kick.
    host.invoke(method::PROMOTE_TO_MODERATOR, args![room.id, "u2"])
        .await;
    let promoted = u2.expect_event(event::MODERATOR_PROMOTED).await;
    assert_eq!(promoted.str_arg(1), Some("u2"));

    u2.invoke(method::KICK_FROM_VOICE_ROOM, args![room.id, "u3"])
        .await;
    let kicked = u3.expect_event(event::KICKED_FROM_VOICE_ROOM).await;
    assert_eq!(kicked.str_arg(0), Some(room.id.as_str()));
    assert_eq!(hub.fabric.rooms.room(&room.id).unwrap().participant_count, 2);

    // Nobody kicks the host.
    u2.invoke(method::KICK_FROM_VOICE_ROOM, args![room.id, "u1"])
        .await;
    u2.expect_event(event::VOICE_ROOM_ERROR).await;
}

#[tokio::test]
async fn discovery_lists_public_rooms_by_occupancy() {
    let hub = TestHub::new();
    let h1 = hub.connect("u1", "ada").await;
    let h2 = hub.connect("u2", "bob").await;
    let guest = hub.connect("u3", "eve").await;
    let quiet = create_room(&h1, "quiet", json!({})).await;
    let busy = create_room(&h2, "busy", json!({})).await;
    guest.invoke(method::JOIN_VOICE_ROOM, args![busy.id]).await;
    for client in [&h1, &h2, &guest] {
        client.drain();
    }

    guest
        .invoke(method::GET_PUBLIC_VOICE_ROOMS, args![(), (), 1, 10])
        .await;
    let page: VoiceRoomPage = guest
        .expect_event(event::VOICE_ROOM_LIST)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.rooms[0].id, busy.id);
    assert_eq!(page.rooms[1].id, quiet.id);
}
