//! Connection Registry
//!
//! Maps each online user to the single live connection that currently
//! represents them. Registering an already-present user replaces the old
//! entry; the newest connection wins.

use crate::events::ServerEvent;
use crate::types::{ConnectionId, UserId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Sending half of one client connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver the transport drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id: ConnectionId::generate(), tx }, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Push an event; false once the transport side has gone away
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// One registered user
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub user_id: UserId,
    pub name: String,
    pub handle: ConnectionHandle,
}

/// Presence payload: `{userID, name}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEntry {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    pub name: String,
}

impl From<&ConnectionEntry> for PresenceEntry {
    fn from(entry: &ConnectionEntry) -> Self {
        Self { user_id: entry.user_id.clone(), name: entry.name.clone() }
    }
}

pub(crate) type EntryMap = HashMap<UserId, ConnectionEntry>;

/// Process-wide registry of live connections
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    entries: Arc<RwLock<EntryMap>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `entry.user_id`, returning the replaced one
    pub async fn register(&self, entry: ConnectionEntry) -> Option<ConnectionEntry> {
        self.entries.write().await.insert(entry.user_id.clone(), entry)
    }

    /// Remove a user's entry unconditionally
    pub async fn unregister(&self, user_id: &UserId) -> Option<ConnectionEntry> {
        self.entries.write().await.remove(user_id)
    }

    /// Remove a user's entry only if it still belongs to `connection`
    pub async fn unregister_connection(
        &self,
        user_id: &UserId,
        connection: ConnectionId,
    ) -> Option<ConnectionEntry> {
        let mut entries = self.entries.write().await;
        remove_if_owned(&mut entries, user_id, connection)
    }

    pub async fn lookup(&self, user_id: &UserId) -> Option<ConnectionEntry> {
        self.entries.read().await.get(user_id).cloned()
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.entries.read().await.contains_key(user_id)
    }

    /// Every online user, ordered by user id
    pub async fn snapshot(&self) -> Vec<PresenceEntry> {
        snapshot_of(&*self.entries.read().await)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Push an event to every registered connection
    pub async fn broadcast(&self, event: &ServerEvent) -> usize {
        broadcast_to(&*self.entries.read().await, event)
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, EntryMap> {
        self.entries.read().await
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, EntryMap> {
        self.entries.write().await
    }
}

pub(crate) fn remove_if_owned(
    entries: &mut EntryMap,
    user_id: &UserId,
    connection: ConnectionId,
) -> Option<ConnectionEntry> {
    match entries.get(user_id) {
        Some(entry) if entry.handle.id() == connection => entries.remove(user_id),
        _ => None,
    }
}

pub(crate) fn snapshot_of(entries: &EntryMap) -> Vec<PresenceEntry> {
    let mut snapshot: Vec<PresenceEntry> = entries.values().map(PresenceEntry::from).collect();
    snapshot.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    snapshot
}

/// Returns how many connections accepted the event
pub(crate) fn broadcast_to(entries: &EntryMap, event: &ServerEvent) -> usize {
    entries.values().filter(|entry| entry.handle.send(event.clone())).count()
}
