//! Direct-message flows: delivery, read receipts, typing, blocks.

mod common;

use common::{args, TestHub};
use palaver_proto::names::{event, method};
use palaver_proto::{Conversation, DirectMessage};
use palaverd::repo::Repository;

#[tokio::test]
async fn dm_reaches_both_endpoints() {
    let hub = TestHub::new();
    let u1 = hub.connect("u1", "ada").await;
    let u2 = hub.connect("u2", "bob").await;
    u1.drain();
    u2.drain();

    u1.invoke(method::SEND_DIRECT_MESSAGE, args!["u2", "hey bob"])
        .await;

    let echo: DirectMessage = u1
        .expect_event(event::RECEIVE_DIRECT_MESSAGE)
        .await
        .obj_arg(0)
        .unwrap();
    let delivered: DirectMessage = u2
        .expect_event(event::RECEIVE_DIRECT_MESSAGE)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(echo.id, delivered.id);
    assert_eq!(delivered.sender_id, "u1");
    assert_eq!(delivered.content, "hey bob");
    assert!(!delivered.read);
}

#[tokio::test]
async fn history_marks_read_and_sends_receipt() {
    let hub = TestHub::new();
    let u1 = hub.connect("u1", "ada").await;
    let u2 = hub.connect("u2", "bob").await;
    u1.drain();
    u2.drain();

    for text in ["one", "two"] {
        u1.invoke(method::SEND_DIRECT_MESSAGE, args!["u2", text])
            .await;
    }
    u1.drain();
    u2.drain();

    // Unread counter visible in the recipient's conversation list.
    u2.invoke(method::GET_CONVERSATIONS, args![]).await;
    let conversations: Vec<Conversation> = u2
        .expect_event(event::CONVERSATIONS)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].unread_count, 2);

    // Fetching history implies reading it.
    u2.invoke(method::GET_DM_HISTORY, args!["u1"]).await;
    let history = u2.expect_event(event::DM_HISTORY).await;
    let messages: Vec<DirectMessage> = history.obj_arg(1).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "one");

    let receipt = u1.expect_event(event::MESSAGES_READ).await;
    assert_eq!(receipt.str_arg(0), Some("u2"));

    let refreshed: Vec<Conversation> = u2
        .expect_event(event::CONVERSATIONS)
        .await
        .obj_arg(0)
        .unwrap();
    assert_eq!(refreshed[0].unread_count, 0);
}

#[tokio::test]
async fn explicit_mark_read_only_fires_receipt_once() {
    let hub = TestHub::new();
    let u1 = hub.connect("u1", "ada").await;
    let u2 = hub.connect("u2", "bob").await;
    u1.drain();
    u2.drain();

    u1.invoke(method::SEND_DIRECT_MESSAGE, args!["u2", "ping"])
        .await;
    u1.drain();
    u2.drain();

    u2.invoke(method::MARK_MESSAGES_READ, args!["u1"]).await;
    u1.expect_event(event::MESSAGES_READ).await;

    // Nothing new to read: no second receipt.
    u2.invoke(method::MARK_MESSAGES_READ, args!["u1"]).await;
    u1.assert_no_event(event::MESSAGES_READ);
}

#[tokio::test]
async fn typing_indicators_flow_between_endpoints() {
    let hub = TestHub::new();
    let u1 = hub.connect("u1", "ada").await;
    let u2 = hub.connect("u2", "bob").await;
    u1.drain();
    u2.drain();

    u1.invoke(method::START_TYPING_DM, args!["u2"]).await;
    let typing = u2.expect_event(event::USER_TYPING_DM).await;
    assert_eq!(typing.str_arg(0), Some("u1"));

    u1.invoke(method::STOP_TYPING_DM, args!["u2"]).await;
    u2.expect_event(event::USER_STOPPED_TYPING_DM).await;
}

#[tokio::test]
async fn blocked_dms_echo_but_never_deliver() {
    let hub = TestHub::new();
    let u1 = hub.connect("u1", "ada").await;
    let u2 = hub.connect("u2", "bob").await;
    u1.drain();
    u2.drain();

    u1.invoke(method::BLOCK_USER, args!["u2"]).await;
    u1.drain();
    u2.drain();

    // The blocked user's message appears sent from their side.
    u2.invoke(method::SEND_DIRECT_MESSAGE, args!["u1", "hello?"])
        .await;
    u2.expect_event(event::RECEIVE_DIRECT_MESSAGE).await;
    u1.assert_no_event(event::RECEIVE_DIRECT_MESSAGE);

    // The blocker's messages are hidden from the blocked user too.
    u1.invoke(method::SEND_DIRECT_MESSAGE, args!["u2", "not for you"])
        .await;
    u1.expect_event(event::RECEIVE_DIRECT_MESSAGE).await;
    u2.assert_no_event(event::RECEIVE_DIRECT_MESSAGE);

    // Nothing was persisted for either side.
    assert!(hub.repo.dm_history("u1", "u2", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn self_dm_is_refused() {
    let hub = TestHub::new();
    let u1 = hub.connect("u1", "ada").await;
    u1.drain();

    u1.invoke(method::SEND_DIRECT_MESSAGE, args!["u1", "hi me"])
        .await;
    u1.expect_event(event::DM_ERROR).await;
}
