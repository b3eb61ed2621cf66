//! Store and hub fixtures

use super::client::TestClient;
use crate::core_store::{MemoryStore, UserRecord, UserStore};
use crate::session::{Handshake, RelayHub, Session};
use crate::types::UserId;
use std::sync::Arc;

/// A hub over a fresh in-memory store
pub fn memory_hub() -> (RelayHub, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (RelayHub::new(store.clone(), store.clone()), store)
}

/// Insert plain user records
pub async fn seed_users(store: &dyn UserStore, users: &[(&str, &str)]) {
    for (id, name) in users {
        if let Err(e) = store.insert_user(UserRecord::new(UserId::new(*id), *name)).await {
            panic!("failed to seed user {}: {}", id, e);
        }
    }
}

/// Connect `id` to the hub and discard the connect-time events
pub async fn connect_user(hub: &RelayHub, id: &str, name: &str) -> (Session, TestClient) {
    let mut client = TestClient::new();
    let Some(session) = hub.connect(Handshake::new(id, name), client.handle()).await else {
        panic!("handshake for {} was rejected", id);
    };
    client.drain();
    (session, client)
}
