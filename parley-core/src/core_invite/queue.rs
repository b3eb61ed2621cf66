//! Pending invite queue
//!
//! Invites addressed to offline users wait here until the target next
//! connects. Process memory only; the durable half of an invite lives in the
//! receiver's `myRequests`.

use crate::types::UserId;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// `receive_invite` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingInvite {
    pub from: UserId,
    #[serde(rename = "fromName")]
    pub from_name: String,
    pub picture: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PendingInviteQueue {
    inner: Arc<Mutex<HashMap<UserId, Vec<PendingInvite>>>>,
}

impl PendingInviteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Vec<PendingInvite>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an invite for `to`
    pub fn enqueue(&self, to: UserId, invite: PendingInvite) {
        self.lock().entry(to).or_default().push(invite);
    }

    /// Take every queued invite for `user_id`, oldest first
    pub fn drain(&self, user_id: &UserId) -> Vec<PendingInvite> {
        self.lock().remove(user_id).unwrap_or_default()
    }

    pub fn len(&self, user_id: &UserId) -> usize {
        self.lock().get(user_id).map(Vec::len).unwrap_or(0)
    }

    /// Queued invites across all users
    pub fn total(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite(from: &str) -> PendingInvite {
        PendingInvite { from: UserId::new(from), from_name: from.to_string(), picture: None }
    }

    #[test]
    fn test_drain_preserves_order_and_empties() {
        let queue = PendingInviteQueue::new();
        let target = UserId::new("b");
        queue.enqueue(target.clone(), invite("a"));
        queue.enqueue(target.clone(), invite("c"));
        queue.enqueue(UserId::new("other"), invite("a"));

        let drained = queue.drain(&target);
        assert_eq!(drained, vec![invite("a"), invite("c")]);
        assert!(queue.drain(&target).is_empty());
        assert_eq!(queue.total(), 1);
    }

    #[test]
    fn test_drain_unknown_user_is_empty() {
        let queue = PendingInviteQueue::new();
        assert!(queue.drain(&UserId::new("nobody")).is_empty());
        assert_eq!(queue.len(&UserId::new("nobody")), 0);
    }
}
