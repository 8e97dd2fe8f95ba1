//! Session assembly: turn N received chunks into one byte-exact artifact.
//!
//! The caller holds the session's lock and has already observed the
//! registry report the session complete; nothing else can advance the
//! session while assembly runs.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{record_upload_error, ASSEMBLY_DURATION, SESSIONS_COMPLETED, SESSIONS_FAILED};
use crate::state::AppState;
use clipdock_core::protocol::CompletionDescriptor;
use clipdock_core::session::{SessionId, SessionState, UploadSession};
use clipdock_storage::{StorageError, StreamingUpload};
use futures::StreamExt;
use std::time::Instant;
use time::OffsetDateTime;
use uuid::Uuid;

/// Reassemble a complete session into a published artifact.
///
/// On success the session is `complete`, its chunks are purged, and the
/// artifact is visible under the returned key. On failure the session is
/// moved to `failed` with an inspectable error code and its chunks are
/// retained; no partial artifact is ever visible.
pub async fn assemble(
    state: &AppState,
    session: &UploadSession,
) -> ApiResult<CompletionDescriptor> {
    let start = Instant::now();
    let session_id = session.id;
    let uuid = *session_id.as_uuid();
    let total_chunks = session.total_chunks;
    let declared_size = session.file_size;

    state
        .registry
        .update_state(uuid, SessionState::Assembling.as_str(), OffsetDateTime::now_utc())
        .await?;

    let artifact_id = Uuid::new_v4();
    let (artifact_key, mut sink) = match state.chunks.open_artifact(artifact_id).await {
        Ok(opened) => opened,
        Err(e) => {
            let err = ApiError::AssemblyFailed(e.to_string());
            fail(state, uuid, &err).await;
            return Err(err);
        }
    };

    match write_chunks(state, session_id, total_chunks, sink.as_mut()).await {
        Ok(written) if written == declared_size => {}
        Ok(written) => {
            // Corruption or a client/server total-chunks disagreement;
            // never silently finalize it.
            let _ = sink.abort().await;
            let err = ApiError::SizeMismatch {
                expected: declared_size,
                actual: written,
            };
            fail(state, uuid, &err).await;
            tracing::warn!(
                session_id = %session_id,
                declared_size,
                assembled_size = written,
                "Assembled size does not match declared size"
            );
            return Err(err);
        }
        Err(e) => {
            let _ = sink.abort().await;
            fail(state, uuid, &e).await;
            return Err(e);
        }
    }

    if let Err(e) = sink.finish().await {
        let err = ApiError::AssemblyFailed(e.to_string());
        fail(state, uuid, &err).await;
        return Err(err);
    }

    let now = OffsetDateTime::now_utc();
    state
        .registry
        .complete_session(uuid, &artifact_key, now)
        .await?;

    // The artifact is durable; chunk cleanup failing only leaks storage
    // until the session row is removed, so log and carry on.
    if let Err(e) = state.chunks.purge(session_id).await {
        tracing::warn!(
            session_id = %session_id,
            error = %e,
            "Failed to purge chunks after finalization"
        );
    }

    SESSIONS_COMPLETED.inc();
    ASSEMBLY_DURATION.observe(start.elapsed().as_secs_f64());
    tracing::info!(
        session_id = %session_id,
        artifact_key = %artifact_key,
        file_size = declared_size,
        "Session assembled and finalized"
    );

    Ok(CompletionDescriptor {
        session_id,
        artifact_key,
        file_name: session.file_name.clone(),
        file_size: declared_size,
    })
}

/// Stream chunks in strict index order into the artifact sink, returning
/// the number of bytes written.
async fn write_chunks(
    state: &AppState,
    session_id: SessionId,
    total_chunks: u32,
    sink: &mut dyn StreamingUpload,
) -> ApiResult<u64> {
    let mut stream = state
        .chunks
        .read_in_order(session_id, total_chunks)
        .await
        .map_err(storage_to_api)?;

    let mut written: u64 = 0;
    while let Some(part) = stream.next().await {
        let part = part.map_err(storage_to_api)?;
        written += part.len() as u64;
        sink.write(part)
            .await
            .map_err(|e| ApiError::AssemblyFailed(e.to_string()))?;
    }
    Ok(written)
}

fn storage_to_api(e: StorageError) -> ApiError {
    match e {
        // Registry said complete but the store disagrees; this is a
        // desynchronization bug, not a client-triggerable state.
        StorageError::MissingChunk { index } => ApiError::MissingChunk { index },
        other => ApiError::AssemblyFailed(other.to_string()),
    }
}

/// Record the failure on the session so it stays queryable in a failed,
/// non-purged state.
async fn fail(state: &AppState, session_id: Uuid, err: &ApiError) {
    SESSIONS_FAILED.inc();
    record_upload_error(err.code());
    if let Err(e) = state
        .registry
        .fail_session(
            session_id,
            err.code(),
            Some(&err.to_string()),
            OffsetDateTime::now_utc(),
        )
        .await
    {
        tracing::error!(
            session_id = %session_id,
            error = %e,
            "Failed to record session failure"
        );
    }
}
