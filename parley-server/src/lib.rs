//! Parley relay server
//!
//! WebSocket and read-only HTTP surface over [`parley_core::RelayHub`].

pub mod api;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

pub use server::{build_hub, ParleyServer};
pub use state::AppState;
