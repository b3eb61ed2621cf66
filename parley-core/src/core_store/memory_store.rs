//! In-Memory Store
//!
//! Process-local implementation of both store traits. Used by tests and by
//! the server's `memory` backend.

use super::errors::{StoreError, StoreResult};
use super::model::{
    MessageFilter, NewMessage, ReceivedRequest, RequestTransition, SentRequest, StoredMessage,
    UserRecord,
};
use super::traits::{MessageStore, UserStore};
use crate::types::{MessageId, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    users: Arc<RwLock<HashMap<UserId, UserRecord>>>,
    messages: Arc<RwLock<Vec<StoredMessage>>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable backend: every operation fails with
    /// `Unavailable` until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of persisted messages
    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

/// Check the compare-and-set precondition and mutate both records in place.
///
/// Callers must hand in copies and only write them back on `Ok`.
pub(crate) fn apply_transition(
    sender: &mut UserRecord,
    receiver: &mut UserRecord,
    t: &RequestTransition,
) -> StoreResult<()> {
    let sent = sender.sent_requests.iter().position(|r| r.to == t.receiver);
    let received = receiver.my_requests.iter().position(|r| r.from == t.sender);

    let sent_status = sent.map(|i| sender.sent_requests[i].status);
    let received_status = received.map(|i| receiver.my_requests[i].status);

    if sent_status != t.expected || received_status != t.expected {
        return Err(StoreError::Conflict(format!(
            "request {} -> {}: expected {:?}, found sent={:?} received={:?}",
            t.sender, t.receiver, t.expected, sent_status, received_status
        )));
    }

    match sent {
        Some(i) => sender.sent_requests[i].status = t.next,
        None => sender.sent_requests.push(SentRequest { to: t.receiver.clone(), status: t.next }),
    }
    match received {
        Some(i) => receiver.my_requests[i].status = t.next,
        None => receiver
            .my_requests
            .push(ReceivedRequest { from: t.sender.clone(), status: t.next }),
    }

    if t.befriend {
        sender.friends.insert(t.receiver.clone());
        receiver.friends.insert(t.sender.clone());
    }

    Ok(())
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, user_id: &UserId) -> StoreResult<Option<UserRecord>> {
        self.check_online()?;
        let users = self.users.read().await;
        Ok(users.get(user_id).cloned())
    }

    async fn insert_user(&self, record: UserRecord) -> StoreResult<()> {
        self.check_online()?;
        let mut users = self.users.write().await;
        if users.contains_key(&record.user_id) {
            return Err(StoreError::Conflict(format!("user {} already exists", record.user_id)));
        }
        users.insert(record.user_id.clone(), record);
        Ok(())
    }

    async fn ensure_user(&self, user_id: &UserId, name: &str) -> StoreResult<UserRecord> {
        self.check_online()?;
        let mut users = self.users.write().await;
        let record = users
            .entry(user_id.clone())
            .or_insert_with(|| UserRecord::new(user_id.clone(), name));
        record.name = name.to_string();
        Ok(record.clone())
    }

    async fn transition_request(&self, transition: RequestTransition) -> StoreResult<()> {
        self.check_online()?;
        if transition.sender == transition.receiver {
            return Err(StoreError::Conflict("request pair must name two users".to_string()));
        }

        let mut users = self.users.write().await;
        let mut sender = users
            .get(&transition.sender)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {}", transition.sender)))?;
        let mut receiver = users
            .get(&transition.receiver)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {}", transition.receiver)))?;

        apply_transition(&mut sender, &mut receiver, &transition)?;

        users.insert(sender.user_id.clone(), sender);
        users.insert(receiver.user_id.clone(), receiver);
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(&self, message: NewMessage) -> StoreResult<StoredMessage> {
        self.check_online()?;
        let stored = message.into_stored(MessageId::generate());
        self.messages.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn find_messages(&self, filter: &MessageFilter) -> StoreResult<Vec<StoredMessage>> {
        self.check_online()?;
        let messages = self.messages.read().await;
        let mut found: Vec<StoredMessage> =
            messages.iter().filter(|m| filter.matches(m)).cloned().collect();
        // stable: equal timestamps keep insertion order
        found.sort_by_key(|m| m.timestamp);
        if let Some(limit) = filter.limit {
            let skip = found.len().saturating_sub(limit);
            found.drain(..skip);
        }
        Ok(found)
    }
}
