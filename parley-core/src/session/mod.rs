//! Per-connection event dispatch

pub mod hub;

pub use hub::{Handshake, RelayHub, Session};
