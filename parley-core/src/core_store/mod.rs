//! Persistent store for users and messages
//!
//! The relay consumes storage through the [`UserStore`] and [`MessageStore`]
//! traits. Two backends are provided: an in-memory store (tests, single
//! process demos) and a SQLite store pooled through r2d2.

pub mod errors;
pub mod memory_store;
pub mod migrations;
pub mod model;
pub mod sql_store;
pub mod traits;

pub use errors::{StoreError, StoreResult};
pub use memory_store::MemoryStore;
pub use model::{
    MessageBody, MessageFilter, MessageKind, NewMessage, ReceivedRequest, RequestStatus,
    RequestTransition, SentRequest, StoredMessage, UserRecord,
};
pub use sql_store::SqlStore;
pub use traits::{MessageStore, UserStore};
