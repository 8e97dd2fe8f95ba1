//! Application state shared across handlers.

use crate::locks::SessionLocks;
use clipdock_core::config::AppConfig;
use clipdock_registry::SessionRegistry;
use clipdock_storage::ChunkStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Authoritative session bookkeeping.
    pub registry: Arc<dyn SessionRegistry>,
    /// Chunk and artifact storage.
    pub chunks: ChunkStore,
    /// Per-session mutual exclusion.
    pub locks: SessionLocks,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Panics
    ///
    /// Panics if configuration validation fails; a server with an invalid
    /// config must not start.
    pub fn new(config: AppConfig, registry: Arc<dyn SessionRegistry>, chunks: ChunkStore) -> Self {
        if let Err(error) = config.server.validate() {
            panic!("Invalid server configuration: {error}");
        }

        Self {
            config: Arc::new(config),
            registry,
            chunks,
            locks: SessionLocks::new(),
        }
    }
}
