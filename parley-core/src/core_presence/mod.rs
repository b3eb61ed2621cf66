/*
    core_presence - Live online/offline tracking

    Handles:
    - The connection registry (one live connection per user)
    - user-online / user-offline / online-users events
    - Registry-serialized invite delivery (live or queued)
*/

pub mod broadcaster;
pub mod registry;

pub use broadcaster::{Connected, Delivery, PresenceBroadcaster};
pub use registry::{ConnectionEntry, ConnectionHandle, ConnectionRegistry, PresenceEntry};
