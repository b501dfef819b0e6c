//! 1:1 call flows: ringing across devices, answering, media
//! anchoring, timeouts, teardown.

mod common;

use common::{args, TestHub};
use palaver_proto::names::{event, method};
use palaver_proto::{encode_payload, Call, CallStatus};

#[tokio::test]
async fn multi_device_ring_answers_on_one_device() {
    let hub = TestHub::new();
    let caller = hub.connect("u1", "ada").await;
    let phone = hub.connect("u2", "bob").await;
    let desktop = hub.connect("u2", "bob").await;
    for client in [&caller, &phone, &desktop] {
        client.drain();
    }

    caller.invoke(method::START_CALL, args!["u2"]).await;
    let started: Call = caller
        .expect_event(event::CALL_STARTED)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(started.status, CallStatus::Ringing);

    // Both devices ring.
    let ring_a: Call = phone
        .expect_event(event::INCOMING_CALL)
        .await
        .obj_arg(0)
        .unwrap();
    let ring_b: Call = desktop
        .expect_event(event::INCOMING_CALL)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(ring_a.id, started.id);
    assert_eq!(ring_b.id, started.id);

    // The phone answers; the desktop still learns the call connected.
    phone
        .invoke(method::ANSWER_CALL, args![started.id, true])
        .await;
    let answered: Call = desktop
        .expect_event(event::CALL_ANSWERED)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(answered.status, CallStatus::InProgress);
    caller.expect_event(event::CALL_ANSWERED).await;
    phone.expect_event(event::CALL_ANSWERED).await;

    // Audio flows only between the caller's and the answering device.
    let opus = vec![7u8; 32];
    caller
        .invoke(
            method::SEND_CALL_AUDIO,
            vec![started.id.clone().into(), encode_payload(&opus)],
        )
        .await;
    let audio = phone.expect_event(event::RECEIVE_CALL_AUDIO).await;
    assert_eq!(audio.bytes_arg(1).unwrap(), opus);
    desktop.assert_no_event(event::RECEIVE_CALL_AUDIO);

    // The idle device cannot inject audio into the call.
    desktop
        .invoke(
            method::SEND_CALL_AUDIO,
            vec![started.id.clone().into(), encode_payload(&opus)],
        )
        .await;
    caller.assert_no_event(event::RECEIVE_CALL_AUDIO);
}

#[tokio::test]
async fn offline_recipient_fails_fast() {
    let hub = TestHub::new();
    let caller = hub.connect("u1", "ada").await;
    caller.drain();

    caller.invoke(method::START_CALL, args!["ghost"]).await;
    let failed = caller.expect_event(event::CALL_FAILED).await;
    assert_eq!(failed.str_arg(0), Some("User is not online"));
    assert!(hub.fabric.calls.active_call_of("u1").is_none());
}

#[tokio::test]
async fn busy_users_cannot_be_called() {
    let hub = TestHub::new();
    let u1 = hub.connect("u1", "ada").await;
    let u2 = hub.connect("u2", "bob").await;
    let u3 = hub.connect("u3", "eve").await;
    for client in [&u1, &u2, &u3] {
        client.drain();
    }

    u1.invoke(method::START_CALL, args!["u2"]).await;
    u1.expect_event(event::CALL_STARTED).await;

    // The recipient of a ringing call counts as busy.
    u3.invoke(method::START_CALL, args!["u2"]).await;
    let error = u3.expect_event(event::CALL_ERROR).await;
    assert_eq!(error.str_arg(0), Some("User is already in a call"));

    // So does the caller.
    u1.invoke(method::START_CALL, args!["u3"]).await;
    let error = u1.expect_event(event::CALL_ERROR).await;
    assert_eq!(error.str_arg(0), Some("You are already in a call"));
}

#[tokio::test]
async fn decline_tears_the_call_down() {
    let hub = TestHub::new();
    let caller = hub.connect("u1", "ada").await;
    let callee = hub.connect("u2", "bob").await;
    caller.drain();
    callee.drain();

    caller.invoke(method::START_CALL, args!["u2"]).await;
    let call: Call = callee
        .expect_event(event::INCOMING_CALL)
        .await
        .obj_arg(0)
        .unwrap();

    callee.invoke(method::ANSWER_CALL, args![call.id, false]).await;
    let declined: Call = caller
        .expect_event(event::CALL_DECLINED)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(declined.status, CallStatus::Declined);
    assert!(hub.fabric.calls.active_call_of("u1").is_none());
    assert!(hub.fabric.calls.active_call_of("u2").is_none());
}

#[tokio::test]
async fn end_call_is_idempotent() {
    let hub = TestHub::new();
    let caller = hub.connect("u1", "ada").await;
    let callee = hub.connect("u2", "bob").await;
    caller.drain();
    callee.drain();

    caller.invoke(method::START_CALL, args!["u2"]).await;
    let call: Call = callee
        .expect_event(event::INCOMING_CALL)
        .await
        .obj_arg(0)
        .unwrap();
    callee.invoke(method::ANSWER_CALL, args![call.id, true]).await;
    caller.drain();
    callee.drain();

    caller.invoke(method::END_CALL, args![call.id]).await;
    caller.expect_event(event::CALL_ENDED).await;
    callee.expect_event(event::CALL_ENDED).await;

    // A repeat hang-up from the peer is harmless.
    callee.invoke(method::END_CALL, args![call.id]).await;
    callee.expect_event(event::CALL_ENDED).await;
    callee.assert_no_event(event::CALL_ERROR);
    assert!(hub.fabric.calls.active_call_of("u1").is_none());
}

#[tokio::test]
async fn unanswered_ring_times_out_to_missed() {
    let hub = TestHub::with_config(|config| {
        config.limits.ring_timeout_secs = 0;
    });
    let caller = hub.connect("u1", "ada").await;
    let callee = hub.connect("u2", "bob").await;
    caller.drain();
    callee.drain();

    caller.invoke(method::START_CALL, args!["u2"]).await;
    let started: Call = caller
        .expect_event(event::CALL_STARTED)
        .await
        .obj_arg(0)
        .unwrap();

    let ended = caller.expect_event(event::CALL_ENDED).await;
    assert_eq!(ended.str_arg(0), Some(started.id.as_str()));
    assert_eq!(ended.str_arg(1), Some("No answer"));
    callee.expect_event(event::CALL_ENDED).await;
    assert!(hub.fabric.calls.active_call_of("u1").is_none());

    // Answering after the timeout is refused.
    callee.invoke(method::ANSWER_CALL, args![started.id, true]).await;
    callee.expect_event(event::CALL_ERROR).await;
}

#[tokio::test]
async fn caller_disconnect_notifies_the_peer() {
    let hub = TestHub::new();
    let caller = hub.connect("u1", "ada").await;
    let callee = hub.connect("u2", "bob").await;
    caller.drain();
    callee.drain();

    caller.invoke(method::START_CALL, args!["u2"]).await;
    let call: Call = callee
        .expect_event(event::INCOMING_CALL)
        .await
        .obj_arg(0)
        .unwrap();
    callee.invoke(method::ANSWER_CALL, args![call.id, true]).await;
    callee.drain();

    caller.disconnect().await;
    let ended = callee.expect_event(event::CALL_ENDED).await;
    assert_eq!(ended.str_arg(1), Some("User disconnected"));
    assert!(hub.fabric.calls.active_call_of("u2").is_none());
}
