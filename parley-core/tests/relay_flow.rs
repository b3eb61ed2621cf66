//! Message relay through the hub: persistence, forwarding and acks

use parley_core::core_store::{MessageBody, MessageFilter, MessageStore};
use parley_core::events::{ClientFrame, ServerEvent};
use parley_core::test_utils::{connect_user, memory_hub};
use parley_core::UserId;
use serde_json::json;

#[tokio::test]
async fn test_offline_receiver_is_persisted_and_acked() {
    let (hub, store) = memory_hub();
    let (a_session, mut a) = connect_user(&hub, "a", "Alice").await;

    let frame = ClientFrame::new(
        "send_message",
        json!({"sender": "a", "receiver": "b", "message": "are you there?"}),
    )
    .with_ack(1);
    let ack = hub.handle(&a_session, frame).await.unwrap();

    assert!(ack.is_ok());
    let stored = ack.data.unwrap();
    assert_eq!(stored.receiver, UserId::new("b"));
    assert!(a.drain().is_empty());

    let history = store
        .find_messages(&MessageFilter::between(UserId::new("a"), UserId::new("b")))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, stored.id);
}

#[tokio::test]
async fn test_online_receiver_gets_same_id() {
    let (hub, _store) = memory_hub();
    let (a_session, _a) = connect_user(&hub, "a", "Alice").await;
    let (_b_session, mut b) = connect_user(&hub, "b", "Bob").await;

    let frame = ClientFrame::new(
        "send_message",
        json!({"sender": "a", "receiver": "b", "message": "hi", "timestamp": 1700000000000u64, "replyTo": "m-1"}),
    )
    .with_ack(2);
    let ack = hub.handle(&a_session, frame).await.unwrap();
    let stored = ack.data.unwrap();

    match b.drain().as_slice() {
        [ServerEvent::ReceiveMessage(forward)] => {
            assert_eq!(forward.id, stored.id);
            assert_eq!(forward.sender, UserId::new("a"));
            assert_eq!(forward.message, "hi");
            assert_eq!(forward.timestamp.as_millis(), 1_700_000_000_000);
            assert_eq!(forward.reply_to, Some(json!("m-1")));
        }
        other => panic!("unexpected events {:?}", other),
    }
}

#[tokio::test]
async fn test_voice_forward_shape() {
    let (hub, _store) = memory_hub();
    let (a_session, _a) = connect_user(&hub, "a", "Alice").await;
    let (_b_session, mut b) = connect_user(&hub, "b", "Bob").await;

    let frame = ClientFrame::new(
        "voice_message",
        json!({"sender": "a", "receiver": "b", "audio": "https://cdn/v.ogg", "duration": 3.5}),
    );
    assert!(hub.handle(&a_session, frame).await.is_none());

    let event = b.drain().pop().unwrap();
    let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
    assert_eq!(value["event"], "voice_message");
    assert_eq!(value["data"]["from"], "a");
    assert_eq!(value["data"]["audio"], "https://cdn/v.ogg");
    assert_eq!(value["data"]["duration"], 3.5);
    assert!(value["data"]["_id"].is_string());
}

#[tokio::test]
async fn test_file_forward_shape() {
    let (hub, store) = memory_hub();
    let (a_session, _a) = connect_user(&hub, "a", "Alice").await;
    let (_b_session, mut b) = connect_user(&hub, "b", "Bob").await;

    let frame = ClientFrame::new(
        "file_message",
        json!({
            "sender": "a",
            "receiver": "b",
            "file": "https://cdn/report.pdf",
            "fileType": "application/pdf",
            "fileName": "report.pdf",
            "size": 2048
        }),
    )
    .with_ack(3);
    let ack = hub.handle(&a_session, frame).await.unwrap();
    assert!(ack.is_ok());

    let event = b.drain().pop().unwrap();
    assert_eq!(event.name(), "receive_file_message");
    let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
    assert_eq!(value["data"]["sender"], "a");
    assert_eq!(value["data"]["from"], "a");
    assert_eq!(value["data"]["receiver"], "b");
    assert_eq!(value["data"]["fileName"], "report.pdf");
    assert_eq!(value["data"]["size"], 2048);

    let history = store.find_messages(&MessageFilter::default()).await.unwrap();
    assert!(matches!(history[0].body, MessageBody::File { .. }));
}

#[tokio::test]
async fn test_store_failure_acks_error_without_forward() {
    let (hub, store) = memory_hub();
    let (a_session, _a) = connect_user(&hub, "a", "Alice").await;
    let (_b_session, mut b) = connect_user(&hub, "b", "Bob").await;
    store.set_offline(true);

    let frame = ClientFrame::new(
        "send_message",
        json!({"sender": "a", "receiver": "b", "message": "lost"}),
    )
    .with_ack(4);
    let ack = hub.handle(&a_session, frame).await.unwrap();

    assert!(!ack.is_ok());
    assert!(ack.error.is_some());
    assert!(b.drain().is_empty());
}

#[tokio::test]
async fn test_sequential_messages_keep_order() {
    let (hub, store) = memory_hub();
    let (a_session, _a) = connect_user(&hub, "a", "Alice").await;
    let (_b_session, mut b) = connect_user(&hub, "b", "Bob").await;

    for (i, ts) in [100u64, 200, 300].into_iter().enumerate() {
        let frame = ClientFrame::new(
            "send_message",
            json!({"sender": "a", "receiver": "b", "message": format!("m{}", i), "timestamp": ts}),
        );
        hub.handle(&a_session, frame).await;
    }

    let forwarded: Vec<String> = b
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            ServerEvent::ReceiveMessage(forward) => Some(forward.message),
            _ => None,
        })
        .collect();
    assert_eq!(forwarded, vec!["m0", "m1", "m2"]);

    let history = store
        .find_messages(&MessageFilter::between(UserId::new("b"), UserId::new("a")).with_limit(2))
        .await
        .unwrap();
    let bodies: Vec<MessageBody> = history.into_iter().map(|m| m.body).collect();
    assert_eq!(bodies, vec![MessageBody::text("m1"), MessageBody::text("m2")]);
}

#[tokio::test]
async fn test_malformed_message_gets_error_ack() {
    let (hub, store) = memory_hub();
    let (a_session, _a) = connect_user(&hub, "a", "Alice").await;

    let frame = ClientFrame::new("send_message", json!({"sender": "a"})).with_ack(5);
    let ack = hub.handle(&a_session, frame).await.unwrap();
    assert!(!ack.is_ok());

    let frame = ClientFrame::new("no_such_event", json!({})).with_ack(6);
    assert!(!hub.handle(&a_session, frame).await.unwrap().is_ok());
    assert_eq!(store.message_count().await, 0);
}
