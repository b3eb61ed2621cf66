//! Server state shared across requests and sockets

use parley_core::shutdown::ShutdownCoordinator;
use parley_core::{Config, RelayHub};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Server state shared across requests
#[derive(Clone)]
pub struct AppState {
    /// Registry, queue and services for this process
    pub hub: RelayHub,

    pub config: Arc<Config>,

    /// Open WebSocket connections, including anonymous ones
    pub ws_connections: Arc<AtomicUsize>,

    pub shutdown: ShutdownCoordinator,
}

impl AppState {
    pub fn new(hub: RelayHub, config: Config, shutdown: ShutdownCoordinator) -> Self {
        Self {
            hub,
            config: Arc::new(config),
            ws_connections: Arc::new(AtomicUsize::new(0)),
            shutdown,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Relaxed)
    }
}
