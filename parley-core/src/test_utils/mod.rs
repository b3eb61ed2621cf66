//! Test utilities and helpers for Parley
//!
//! Shared by unit tests, the integration tests under `tests/`, and the
//! server crate's tests.

pub mod client;
pub mod fixtures;

pub use client::*;
pub use fixtures::*;
