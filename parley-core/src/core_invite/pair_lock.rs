//! Per-pair serialization
//!
//! Invite operations on the same unordered user pair run one at a time;
//! operations on different pairs proceed concurrently.

use crate::types::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type PairKey = (UserId, UserId);
type LockMap = HashMap<PairKey, Arc<AsyncMutex<()>>>;

fn pair_key(a: &UserId, b: &UserId) -> PairKey {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PairLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl PairLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait for exclusive access to the pair `{a, b}`
    pub async fn lock(&self, a: &UserId, b: &UserId) -> PairGuard {
        let key = pair_key(a, b);
        let lock = self.map().entry(key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        PairGuard { guard: Some(guard), key, locks: self.locks.clone() }
    }

    /// Pairs with a live or contended lock
    pub fn active(&self) -> usize {
        self.map().len()
    }
}

/// Held for the duration of one pair operation
pub struct PairGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: PairKey,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for PairGuard {
    fn drop(&mut self) {
        let mut map = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // release first so the count below only sees the map and waiters
        self.guard.take();
        if let Some(lock) = map.get(&self.key) {
            if Arc::strong_count(lock) == 1 {
                map.remove(&self.key);
            }
        }
    }
}
