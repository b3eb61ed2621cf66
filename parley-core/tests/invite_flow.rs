//! End-to-end invite workflows through the relay hub

use parley_core::core_invite::{FeedbackStatus, Invitation};
use parley_core::core_store::{RequestStatus, UserStore};
use parley_core::events::{ClientFrame, ServerEvent};
use parley_core::test_utils::{connect_user, memory_hub, seed_users, TestClient};
use parley_core::{Handshake, UserId};
use serde_json::json;

fn send_invite(from: &str, to: &str, from_name: &str) -> ClientFrame {
    ClientFrame::new("send_invite", json!({"from": from, "to": to, "fromName": from_name}))
}

fn invite_response(to: &str, accepted: bool) -> ClientFrame {
    ClientFrame::new("invite_response", json!({"to": to, "accepted": accepted}))
}

#[tokio::test]
async fn test_offline_invite_decline_then_resend() {
    let (hub, store) = memory_hub();
    seed_users(store.as_ref(), &[("b", "Bob")]).await;
    let (a_session, mut a) = connect_user(&hub, "a", "Alice").await;

    // A invites offline B: queued
    hub.handle(&a_session, send_invite("a", "b", "Alice")).await;
    assert_eq!(a.feedback()[0].status, FeedbackStatus::Success);
    assert_eq!(hub.queue().len(&UserId::new("b")), 1);

    // B connects and receives exactly the queued invite
    let mut b = TestClient::new();
    let b_session = hub.connect(Handshake::new("b", "Bob"), b.handle()).await.unwrap();
    let invites = b.invites();
    assert_eq!(invites.len(), 1);
    assert_eq!(invites[0].from, UserId::new("a"));
    assert_eq!(invites[0].from_name, "Alice");
    assert_eq!(hub.queue().len(&UserId::new("b")), 0);
    a.drain();

    // B declines; A hears about it, nobody becomes friends
    hub.handle(&b_session, invite_response("a", false)).await;
    match a.drain().as_slice() {
        [ServerEvent::InviteResult(result)] => {
            assert_eq!(result.from, UserId::new("b"));
            assert_eq!(result.from_name, "Bob");
            assert!(!result.accepted);
        }
        other => panic!("unexpected events {:?}", other),
    }
    let ra = store.find_user(&UserId::new("a")).await.unwrap().unwrap();
    let rb = store.find_user(&UserId::new("b")).await.unwrap().unwrap();
    assert!(ra.friends.is_empty() && rb.friends.is_empty());

    // Inviting again asks for confirmation instead of writing
    hub.handle(&a_session, send_invite("a", "b", "Alice")).await;
    let feedback = a.feedback();
    assert_eq!(feedback[0].status, FeedbackStatus::Declined);
    assert_eq!(feedback[0].confirm_resend, Some(true));
    assert!(b.invites().is_empty());

    // Confirmed resend reaches B live and resets both halves
    hub.handle(
        &a_session,
        ClientFrame::new(
            "confirm_resend_invite",
            json!({"from": "a", "to": "b", "fromName": "Alice"}),
        ),
    )
    .await;
    assert_eq!(a.feedback()[0].status, FeedbackStatus::Success);
    assert_eq!(b.invites().len(), 1);

    let ra = store.find_user(&UserId::new("a")).await.unwrap().unwrap();
    let rb = store.find_user(&UserId::new("b")).await.unwrap().unwrap();
    assert_eq!(ra.sent_requests.len(), 1);
    assert_eq!(ra.sent_to(&UserId::new("b")).unwrap().status, RequestStatus::Request);
    assert_eq!(rb.my_requests.len(), 1);
    assert_eq!(rb.received_from(&UserId::new("a")).unwrap().status, RequestStatus::Request);
}

#[tokio::test]
async fn test_accept_makes_friends_both_ways() {
    let (hub, store) = memory_hub();
    let (a_session, mut a) = connect_user(&hub, "a", "Alice").await;
    let (b_session, mut b) = connect_user(&hub, "b", "Bob").await;
    a.drain();

    hub.handle(&a_session, send_invite("a", "b", "Alice")).await;
    assert_eq!(b.invites().len(), 1);
    a.drain();

    hub.handle(&b_session, invite_response("a", true)).await;
    match a.drain().as_slice() {
        [ServerEvent::InviteResult(result)] => assert!(result.accepted),
        other => panic!("unexpected events {:?}", other),
    }

    let ra = store.find_user(&UserId::new("a")).await.unwrap().unwrap();
    let rb = store.find_user(&UserId::new("b")).await.unwrap().unwrap();
    assert!(ra.is_friend(&UserId::new("b")));
    assert!(rb.is_friend(&UserId::new("a")));
    assert_eq!(ra.friends.len(), 1);
}

#[tokio::test]
async fn test_invite_between_friends_changes_nothing() {
    let (hub, store) = memory_hub();
    let (a_session, mut a) = connect_user(&hub, "a", "Alice").await;
    let (b_session, mut b) = connect_user(&hub, "b", "Bob").await;
    hub.handle(&a_session, send_invite("a", "b", "Alice")).await;
    hub.handle(&b_session, invite_response("a", true)).await;
    a.drain();
    b.drain();

    let before_a = store.find_user(&UserId::new("a")).await.unwrap();
    let before_b = store.find_user(&UserId::new("b")).await.unwrap();

    hub.handle(&a_session, send_invite("a", "b", "Alice")).await;
    assert_eq!(a.feedback()[0].status, FeedbackStatus::Friend);
    assert!(b.drain().is_empty());

    assert_eq!(store.find_user(&UserId::new("a")).await.unwrap(), before_a);
    assert_eq!(store.find_user(&UserId::new("b")).await.unwrap(), before_b);
}

#[tokio::test]
async fn test_crossed_invite_reports_incoming() {
    let (hub, store) = memory_hub();
    let (a_session, _a) = connect_user(&hub, "a", "Alice").await;
    let (b_session, mut b) = connect_user(&hub, "b", "Bob").await;

    hub.handle(&a_session, send_invite("a", "b", "Alice")).await;
    b.drain();
    let before = store.find_user(&UserId::new("b")).await.unwrap();

    hub.handle(&b_session, send_invite("b", "a", "Bob")).await;
    let feedback = b.feedback();
    assert_eq!(feedback[0].status, FeedbackStatus::Incoming);
    assert_eq!(feedback[0].from, Some(UserId::new("a")));
    assert_eq!(feedback[0].from_name.as_deref(), Some("Alice"));
    assert_eq!(store.find_user(&UserId::new("b")).await.unwrap(), before);
}

#[tokio::test]
async fn test_respond_uses_connection_identity() {
    let (hub, store) = memory_hub();
    seed_users(store.as_ref(), &[("b", "Bob"), ("c", "Carol")]).await;
    let (a_session, _a) = connect_user(&hub, "a", "Alice").await;
    let (c_session, _c) = connect_user(&hub, "c", "Carol").await;
    hub.handle(&a_session, send_invite("a", "b", "Alice")).await;

    // Carol has no request from Alice, so answering on Bob's behalf is impossible
    let ack = hub.handle(&c_session, invite_response("a", true).with_ack(9)).await.unwrap();
    assert!(!ack.is_ok());
    let ra = store.find_user(&UserId::new("a")).await.unwrap().unwrap();
    assert!(ra.friends.is_empty());
}

#[tokio::test]
async fn test_concurrent_invites_create_one_request() {
    let (hub, store) = memory_hub();
    seed_users(store.as_ref(), &[("a", "Alice"), ("b", "Bob")]).await;

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let invites = hub.invites().clone();
        tasks.push(tokio::spawn(async move {
            invites.send_invite(&Invitation::new("a", "b", "Alice")).await.status
        }));
    }

    let mut statuses = Vec::new();
    for task in tasks {
        statuses.push(task.await.unwrap());
    }
    assert_eq!(statuses.iter().filter(|s| **s == FeedbackStatus::Success).count(), 1);
    assert!(statuses
        .iter()
        .all(|s| matches!(s, FeedbackStatus::Success | FeedbackStatus::Pending)));

    let ra = store.find_user(&UserId::new("a")).await.unwrap().unwrap();
    assert_eq!(ra.sent_requests.len(), 1);
    assert_eq!(hub.queue().len(&UserId::new("b")), 1);
}

#[tokio::test]
async fn test_reconnect_survives_stale_disconnect() {
    let (hub, _store) = memory_hub();
    let (old_session, _old) = connect_user(&hub, "a", "Alice").await;
    let (_new_session, _new) = connect_user(&hub, "a", "Alice").await;
    let (_w_session, mut watcher) = connect_user(&hub, "w", "Walt").await;

    assert!(!hub.disconnect(old_session).await);
    assert!(hub.registry().is_online(&UserId::new("a")).await);
    assert!(watcher.drain().is_empty());
}

#[tokio::test]
async fn test_presence_snapshot_on_connect() {
    let (hub, _store) = memory_hub();
    let (_a_session, mut a) = connect_user(&hub, "a", "Alice").await;

    let mut b = TestClient::new();
    let b_session = hub.connect(Handshake::new("b", "Bob"), b.handle()).await.unwrap();
    assert_eq!(b.event_names(), vec!["user-online", "online-users"]);
    assert_eq!(a.event_names(), vec!["user-online"]);

    assert!(hub.disconnect(b_session).await);
    match a.drain().as_slice() {
        [ServerEvent::UserOffline(notice)] => assert_eq!(notice.user_id, UserId::new("b")),
        other => panic!("unexpected events {:?}", other),
    }
}
