//! Store contracts consumed by the relay core

use super::errors::StoreResult;
use super::model::{MessageFilter, NewMessage, RequestTransition, StoredMessage, UserRecord};
use crate::types::UserId;
use async_trait::async_trait;

/// User records: identity, friend set, and mirrored request lists
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Lookup by id
    async fn find_user(&self, user_id: &UserId) -> StoreResult<Option<UserRecord>>;

    /// Insert a new record. Fails with `Conflict` if the id is taken.
    async fn insert_user(&self, record: UserRecord) -> StoreResult<()>;

    /// Insert an empty record if absent, otherwise refresh the display name
    async fn ensure_user(&self, user_id: &UserId, name: &str) -> StoreResult<UserRecord>;

    /// Atomically apply a compare-and-set over one mirrored request pair.
    ///
    /// Either both halves (and, when befriending, both friend sets) are
    /// written or nothing is.
    async fn transition_request(&self, transition: RequestTransition) -> StoreResult<()>;
}

/// Message records
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message and return it with its store-assigned id
    async fn insert_message(&self, message: NewMessage) -> StoreResult<StoredMessage>;

    /// Messages matching the filter, oldest first
    async fn find_messages(&self, filter: &MessageFilter) -> StoreResult<Vec<StoredMessage>>;
}
