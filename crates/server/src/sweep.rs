//! Expiry sweep for abandoned sessions.
//!
//! Server disk grows by up to one declared file size per in-progress
//! session; this sweep is the backpressure against unbounded accumulation
//! from transfers that were never finished or aborted.

use crate::metrics::SESSIONS_EXPIRED;
use crate::state::AppState;
use clipdock_core::session::SessionId;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Outcome of one sweep pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Sessions removed this pass.
    pub sessions_removed: u64,
    /// Sessions whose chunk purge failed; retried next pass.
    pub purge_failures: u64,
}

/// Remove sessions whose `last_activity_at` predates the configured
/// timeout and which never completed, purging their stored chunks.
pub async fn expire_stale(state: &AppState, now: OffsetDateTime) -> SweepStats {
    let cutoff = now - state.config.server.session_timeout();
    let batch = state.config.server.sweep_batch_size;

    let expired = match state.registry.expired_sessions(cutoff, batch).await {
        Ok(expired) => expired,
        Err(e) => {
            tracing::error!(error = %e, "Expiry sweep failed to query sessions");
            return SweepStats::default();
        }
    };

    let mut stats = SweepStats::default();
    for session in expired {
        let session_id = SessionId::from(session.session_id);

        // Chunks first: if the purge fails the registry row survives, so
        // the next pass retries instead of orphaning storage.
        if let Err(e) = state.chunks.purge(session_id).await {
            tracing::warn!(
                session_id = %session_id,
                error = %e,
                "Failed to purge chunks for expired session"
            );
            stats.purge_failures += 1;
            continue;
        }

        if let Err(e) = state.registry.delete_session(session.session_id).await {
            tracing::warn!(
                session_id = %session_id,
                error = %e,
                "Failed to delete expired session"
            );
            continue;
        }

        state.locks.remove(session.session_id).await;
        SESSIONS_EXPIRED.inc();
        stats.sessions_removed += 1;
        tracing::info!(
            session_id = %session_id,
            state = %session.state,
            last_activity_at = %session.last_activity_at,
            "Expired upload session removed"
        );
    }

    stats
}

/// Spawn the background sweep loop.
pub fn spawn_sweeper(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.server.sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup does not
        // race a sweep against restored traffic.
        interval.tick().await;

        loop {
            interval.tick().await;
            let stats = expire_stale(&state, OffsetDateTime::now_utc()).await;
            if stats.sessions_removed > 0 || stats.purge_failures > 0 {
                tracing::debug!(
                    removed = stats.sessions_removed,
                    purge_failures = stats.purge_failures,
                    "Expiry sweep pass finished"
                );
            }
        }
    })
}
