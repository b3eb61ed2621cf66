//! Presence Broadcasting
//!
//! Couples the connection registry with the pending invite queue so that
//! connecting, disconnecting and invite delivery each happen as one
//! registry-serialized step:
//!
//! - `connect` holds the registry write guard while it registers, announces
//!   `user-online`, sends the snapshot and drains queued invites.
//! - `deliver_or_enqueue` holds the read guard while it decides between a
//!   live send and the queue, so an invite can never be enqueued after the
//!   target's drain has already run.

use super::registry::{
    broadcast_to, remove_if_owned, snapshot_of, ConnectionEntry, ConnectionRegistry, PresenceEntry,
};
use crate::core_invite::{PendingInvite, PendingInviteQueue};
use crate::events::{OfflineNotice, ServerEvent};
use crate::types::{ConnectionId, UserId};
use metrics::{counter, gauge};

/// How an invite reached its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Live,
    Queued,
}

/// Result of registering a connection
#[derive(Debug)]
pub struct Connected {
    /// Entry displaced by this connection, if the user was already online
    pub replaced: Option<ConnectionEntry>,
    /// Number of queued invites replayed to the new connection
    pub drained: usize,
}

#[derive(Debug, Clone)]
pub struct PresenceBroadcaster {
    registry: ConnectionRegistry,
    queue: PendingInviteQueue,
}

impl PresenceBroadcaster {
    pub fn new(registry: ConnectionRegistry, queue: PendingInviteQueue) -> Self {
        Self { registry, queue }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &PendingInviteQueue {
        &self.queue
    }

    /// Register a connection, announce it, and replay its pending invites
    pub async fn connect(&self, entry: ConnectionEntry) -> Connected {
        let mut entries = self.registry.write().await;

        let user_id = entry.user_id.clone();
        let handle = entry.handle.clone();
        let presence = PresenceEntry::from(&entry);
        let replaced = entries.insert(user_id.clone(), entry);

        // includes the new connection itself
        broadcast_to(&entries, &ServerEvent::UserOnline(presence));
        handle.send(ServerEvent::OnlineUsers(snapshot_of(&entries)));

        let invites = self.queue.drain(&user_id);
        let drained = invites.len();
        for invite in invites {
            handle.send(ServerEvent::ReceiveInvite(invite));
        }

        counter!("presence.connects.total").increment(1);
        gauge!("presence.connections").set(entries.len() as f64);

        tracing::info!(
            user_id = %user_id,
            connection = %handle.id(),
            replaced = replaced.is_some(),
            drained,
            "user online"
        );

        Connected { replaced, drained }
    }

    /// Unregister a connection if it still owns the user's entry
    ///
    /// Returns whether an entry was removed; `user-offline` is broadcast
    /// only in that case.
    pub async fn disconnect(&self, user_id: &UserId, connection: ConnectionId) -> bool {
        let mut entries = self.registry.write().await;

        if remove_if_owned(&mut entries, user_id, connection).is_none() {
            tracing::debug!(user_id = %user_id, connection = %connection, "stale disconnect ignored");
            return false;
        }

        broadcast_to(&entries, &ServerEvent::UserOffline(OfflineNotice { user_id: user_id.clone() }));

        counter!("presence.disconnects.total").increment(1);
        gauge!("presence.connections").set(entries.len() as f64);
        tracing::info!(user_id = %user_id, connection = %connection, "user offline");
        true
    }

    /// Send an invite live if the target is connected, otherwise queue it
    pub async fn deliver_or_enqueue(&self, to: &UserId, invite: PendingInvite) -> Delivery {
        let entries = self.registry.read().await;

        if let Some(entry) = entries.get(to) {
            if entry.handle.send(ServerEvent::ReceiveInvite(invite.clone())) {
                tracing::debug!(to = %to, from = %invite.from, "invite delivered live");
                return Delivery::Live;
            }
        }

        self.queue.enqueue(to.clone(), invite);
        counter!("invites.queued.total").increment(1);
        tracing::debug!(to = %to, "target offline, invite queued");
        Delivery::Queued
    }

    /// Send an event to a user if connected
    pub async fn notify(&self, to: &UserId, event: ServerEvent) -> bool {
        match self.registry.read().await.get(to) {
            Some(entry) => entry.handle.send(event),
            None => false,
        }
    }
}
