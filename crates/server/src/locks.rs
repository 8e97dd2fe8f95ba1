//! Per-session mutual exclusion.
//!
//! Registry state is the serialization point for a session: record-receipt,
//! the completeness check, and assembly must be observed as one consistent
//! sequence. The client sends one chunk at a time, but retries and network
//! duplication can still land two requests for the same session
//! concurrently, so the server holds an explicit lock keyed by session id
//! rather than relying on the client's discipline.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// A map of per-session locks.
#[derive(Clone, Default)]
pub struct SessionLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl SessionLocks {
    /// Create an empty lock map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a session, creating it on first use.
    ///
    /// The outer map mutex is held only long enough to clone the entry;
    /// waiting for the session lock itself never blocks other sessions.
    pub async fn acquire(&self, session_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(session_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop the lock entry for a session that reached a terminal state.
    ///
    /// A request already waiting on the old entry still completes; it will
    /// find the session gone or closed when it re-reads the registry.
    pub async fn remove(&self, session_id: Uuid) {
        self.locks.lock().await.remove(&session_id);
    }

    /// Number of tracked sessions (for tests and diagnostics).
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// True if no sessions are tracked.
    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}
