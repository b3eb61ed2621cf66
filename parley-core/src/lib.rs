//! Parley core
//!
//! Presence, friend invites and message relay for a real-time chat server.
//! The transport lives in `parley-server`; everything here is driven
//! through [`session::RelayHub`].

pub mod config;
pub mod core_invite;
pub mod core_presence;
pub mod core_relay;
pub mod core_store;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod session;
pub mod shutdown;
pub mod test_utils;
pub mod types;

pub use config::Config;
pub use events::{ClientFrame, ServerEvent};
pub use logging::{init_logging, LogLevel};
pub use session::{Handshake, RelayHub, Session};
pub use types::{ConnectionId, MessageId, Timestamp, UserId};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _ = LogLevel::Info;
        let _ = UserId::new("a");
    }
}
