//! HTTP server lifecycle

use crate::api::build_router;
use crate::state::AppState;
use anyhow::{Context, Result};
use parley_core::config::{StoreBackend, StoreConfig};
use parley_core::core_store::{MemoryStore, SqlStore};
use parley_core::shutdown::ShutdownCoordinator;
use parley_core::{Config, RelayHub};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Build a hub over the configured store backend
pub fn build_hub(config: &StoreConfig) -> Result<RelayHub> {
    let hub = match config.backend {
        StoreBackend::Memory => {
            let store = Arc::new(MemoryStore::new());
            RelayHub::new(store.clone(), store)
        }
        StoreBackend::Sqlite => {
            let store = SqlStore::open(&config.database_path, config.pool_size)
                .with_context(|| format!("opening {}", config.database_path.display()))?;
            let store = Arc::new(store);
            RelayHub::new(store.clone(), store)
        }
    };
    info!(backend = %config.backend, "store ready");
    Ok(hub)
}

/// Relay server
pub struct ParleyServer {
    state: Arc<AppState>,
}

impl ParleyServer {
    pub fn new(hub: RelayHub, config: Config, shutdown: ShutdownCoordinator) -> Self {
        Self { state: Arc::new(AppState::new(hub, config, shutdown)) }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Serve until the shutdown coordinator fires, then drain within its timeout
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.server.bind_address;
        let shutdown = self.state.shutdown.clone();
        let router = build_router(self.state);

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {}", addr))?;
        info!("Parley relay listening on {}", addr);

        let signal = shutdown.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.wait_for_shutdown().await })
                .await
        });

        tokio::select! {
            result = &mut server => {
                // the server stopped on its own
                result??;
                return Ok(());
            }
            _ = shutdown.wait_for_shutdown() => {}
        }

        match tokio::time::timeout(shutdown.timeout(), &mut server).await {
            Ok(result) => result??,
            Err(_) => {
                warn!(timeout = ?shutdown.timeout(), "drain timed out, aborting open connections");
                server.abort();
            }
        }

        shutdown.complete().await;
        Ok(())
    }
}
