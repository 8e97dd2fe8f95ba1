//! Session status and abort handlers.

use crate::error::{ApiError, ApiResult};
use crate::metrics::SESSIONS_ABORTED;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use clipdock_core::percent_complete;
use clipdock_core::protocol::SessionStatus;
use clipdock_core::session::{SessionId, SessionState};
use time::OffsetDateTime;

/// GET /v1/sessions/{session_id} - query session state.
///
/// Clients use this to resume: the `received_indices` list tells the
/// sequencer exactly which chunks are still missing.
#[tracing::instrument(skip(state))]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionStatus>> {
    let session_id = SessionId::parse(&session_id)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let uuid = *session_id.as_uuid();

    let session = state
        .registry
        .get_session(uuid)
        .await?
        .ok_or(ApiError::UnknownSession(uuid))?
        .to_session()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    // Terminal sessions stay queryable; only an unswept, inactive open
    // session reads as expired.
    let now = OffsetDateTime::now_utc();
    if session.is_expired(now, state.config.server.session_timeout()) {
        return Err(ApiError::SessionExpired(uuid));
    }

    let received_indices = state.registry.received_indices(uuid).await?;
    let received_count = received_indices.len() as u32;
    let total_chunks = session.total_chunks;

    let last_activity_at = session
        .last_activity_at
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|e| ApiError::Internal(format!("failed to format last_activity_at: {e}")))?;

    Ok(Json(SessionStatus {
        session_id,
        state: session.state.to_string(),
        file_name: session.file_name,
        file_size: session.file_size,
        total_chunks,
        received_count,
        received_indices,
        progress: percent_complete(received_count, total_chunks),
        error_code: session.error_code,
        last_activity_at,
    }))
}

/// DELETE /v1/sessions/{session_id} - abort a transfer.
///
/// Purges stored chunks and removes the session so an abandoning client
/// frees server storage immediately instead of waiting for the sweep.
#[tracing::instrument(skip(state))]
pub async fn abort_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    let session_id = SessionId::parse(&session_id)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let uuid = *session_id.as_uuid();

    let guard = state.locks.acquire(uuid).await;

    let session = state
        .registry
        .get_session(uuid)
        .await?
        .ok_or(ApiError::UnknownSession(uuid))?
        .to_session()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if session.state == SessionState::Complete {
        // A finalized artifact is immutable; abort only applies to
        // in-progress transfers.
        return Err(ApiError::SessionClosed {
            session_id: uuid,
            state: session.state.to_string(),
        });
    }

    // Purge chunks before the row: if purge fails the row survives and
    // the expiry sweep retries the cleanup later.
    state.chunks.purge(session_id).await?;
    state.registry.delete_session(uuid).await?;
    state.locks.remove(uuid).await;
    drop(guard);

    SESSIONS_ABORTED.inc();
    tracing::info!(session_id = %session_id, "Session aborted");

    Ok(StatusCode::NO_CONTENT)
}
