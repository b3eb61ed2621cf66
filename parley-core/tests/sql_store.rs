//! The hub running over the SQLite backend

use parley_core::core_invite::FeedbackStatus;
use parley_core::core_store::{
    MessageFilter, MessageStore, RequestStatus, RequestTransition, SqlStore, StoreError, UserStore,
};
use parley_core::events::ClientFrame;
use parley_core::test_utils::{connect_user, seed_users};
use parley_core::{RelayHub, UserId};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn sql_hub(dir: &TempDir) -> (RelayHub, Arc<SqlStore>) {
    let store = Arc::new(SqlStore::open(dir.path().join("parley.db"), 4).unwrap());
    (RelayHub::new(store.clone(), store.clone()), store)
}

#[tokio::test]
async fn test_invite_and_accept_persist() {
    let dir = TempDir::new().unwrap();
    let (hub, store) = sql_hub(&dir);
    let (a_session, mut a) = connect_user(&hub, "a", "Alice").await;
    let (b_session, mut b) = connect_user(&hub, "b", "Bob").await;

    hub.handle(
        &a_session,
        ClientFrame::new("send_invite", json!({"from": "a", "to": "b", "fromName": "Alice"})),
    )
    .await;
    assert_eq!(a.feedback()[0].status, FeedbackStatus::Success);
    assert_eq!(b.invites().len(), 1);

    hub.handle(&b_session, ClientFrame::new("invite_response", json!({"to": "a", "accepted": true})))
        .await;

    let ra = store.find_user(&UserId::new("a")).await.unwrap().unwrap();
    let rb = store.find_user(&UserId::new("b")).await.unwrap().unwrap();
    assert!(ra.is_friend(&UserId::new("b")));
    assert!(rb.is_friend(&UserId::new("a")));
    assert_eq!(ra.sent_to(&UserId::new("b")).unwrap().status, RequestStatus::Accept);
    assert_eq!(rb.received_from(&UserId::new("a")).unwrap().status, RequestStatus::Accept);
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let (hub, _store) = sql_hub(&dir);
        let (a_session, _a) = connect_user(&hub, "a", "Alice").await;
        hub.handle(
            &a_session,
            ClientFrame::new("send_message", json!({"sender": "a", "receiver": "b", "message": "kept"})),
        )
        .await;
    }

    let store = SqlStore::open(dir.path().join("parley.db"), 2).unwrap();
    assert_eq!(store.find_user(&UserId::new("a")).await.unwrap().unwrap().name, "Alice");
    let history = store
        .find_messages(&MessageFilter::between(UserId::new("a"), UserId::new("b")))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_concurrent_open_has_one_winner() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqlStore::open(dir.path().join("parley.db"), 4).unwrap());
    seed_users(store.as_ref(), &[("a", "Alice"), ("b", "Bob")]).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store
                .transition_request(RequestTransition::open(UserId::new("a"), UserId::new("b")))
                .await
        }));
    }

    let mut ok = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => ok += 1,
            Err(StoreError::Conflict(_)) => {}
            Err(e) => panic!("unexpected error {}", e),
        }
    }
    assert_eq!(ok, 1);

    let ra = store.find_user(&UserId::new("a")).await.unwrap().unwrap();
    let rb = store.find_user(&UserId::new("b")).await.unwrap().unwrap();
    assert_eq!(ra.sent_requests.len(), 1);
    assert_eq!(rb.my_requests.len(), 1);
}

#[tokio::test]
async fn test_unstorable_timestamp_acks_error() {
    let dir = TempDir::new().unwrap();
    let (hub, store) = sql_hub(&dir);
    let (a_session, _a) = connect_user(&hub, "a", "Alice").await;
    let (_b_session, mut b) = connect_user(&hub, "b", "Bob").await;

    let frame = ClientFrame::new(
        "send_message",
        json!({"sender": "a", "receiver": "b", "message": "far future", "timestamp": u64::MAX - 5}),
    )
    .with_ack(1);
    let ack = hub.handle(&a_session, frame).await.unwrap();
    assert!(!ack.is_ok());
    assert!(b.drain().is_empty());

    let frame = ClientFrame::new(
        "file_message",
        json!({
            "sender": "a",
            "receiver": "b",
            "file": "https://cdn/huge.bin",
            "fileType": "application/octet-stream",
            "fileName": "huge.bin",
            "size": u64::MAX
        }),
    )
    .with_ack(2);
    assert!(!hub.handle(&a_session, frame).await.unwrap().is_ok());

    let history = store
        .find_messages(&MessageFilter::between(UserId::new("a"), UserId::new("b")))
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_ack_timestamp_matches_history() {
    let dir = TempDir::new().unwrap();
    let (hub, store) = sql_hub(&dir);
    let (a_session, _a) = connect_user(&hub, "a", "Alice").await;

    let ts = i64::MAX as u64;
    let frame = ClientFrame::new(
        "send_message",
        json!({"sender": "a", "receiver": "b", "message": "edge", "timestamp": ts}),
    )
    .with_ack(3);
    let acked = hub.handle(&a_session, frame).await.unwrap().data.unwrap();

    let history = store
        .find_messages(&MessageFilter::between(UserId::new("a"), UserId::new("b")))
        .await
        .unwrap();
    assert_eq!(history[0].timestamp, acked.timestamp);
    assert_eq!(history[0].timestamp.as_millis(), ts);
}
