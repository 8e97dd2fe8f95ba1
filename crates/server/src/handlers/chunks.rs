//! Chunk receive handler.
//!
//! One `multipart/form-data` POST per chunk. The first chunk of a transfer
//! carries no `session_id`; the server mints one, captures the declared
//! file name, size, total chunk count, and any opaque metadata fields, and
//! returns the id for every subsequent chunk to carry.

use crate::assembler;
use crate::error::{ApiError, ApiResult};
use crate::metrics::{record_upload_error, BYTES_RECEIVED, CHUNKS_RECEIVED, SESSIONS_CREATED};
use crate::state::AppState;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use clipdock_core::percent_complete;
use clipdock_core::protocol::ChunkAck;
use clipdock_core::session::{FormFields, SessionId};
use clipdock_registry::NewSession;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// A parsed chunk transmission.
#[derive(Debug, Default)]
struct IncomingChunk {
    session_id: Option<SessionId>,
    chunk_index: Option<u32>,
    total_chunks: Option<u32>,
    file_name: Option<String>,
    file_size: Option<u64>,
    chunk_checksum: Option<String>,
    payload: Option<Bytes>,
    metadata: FormFields,
}

async fn parse_multipart(mut multipart: Multipart) -> ApiResult<IncomingChunk> {
    let mut incoming = IncomingChunk::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "chunk" {
            let payload = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed to read chunk: {e}")))?;
            incoming.payload = Some(payload);
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read field '{name}': {e}")))?;

        match name.as_str() {
            "session_id" => {
                let id = SessionId::parse(&value)
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                incoming.session_id = Some(id);
            }
            "chunk_index" => {
                incoming.chunk_index = Some(parse_u32(&name, &value)?);
            }
            "total_chunks" => {
                incoming.total_chunks = Some(parse_u32(&name, &value)?);
            }
            "file_name" => incoming.file_name = Some(value),
            "file_size" => {
                incoming.file_size = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| bad_integer(&name, &value))?,
                );
            }
            "chunk_checksum" => incoming.chunk_checksum = Some(value.to_lowercase()),
            _ => {
                incoming
                    .metadata
                    .insert(name, serde_json::Value::String(value));
            }
        }
    }

    Ok(incoming)
}

fn parse_u32(name: &str, value: &str) -> ApiResult<u32> {
    value.parse::<u32>().map_err(|_| bad_integer(name, value))
}

fn bad_integer(name: &str, value: &str) -> ApiError {
    ApiError::BadRequest(format!("field '{name}' is not a valid integer: '{value}'"))
}

fn verify_checksum(payload: &Bytes, expected: &str) -> ApiResult<()> {
    let actual = format!("{:x}", Sha256::digest(payload));
    if actual != expected {
        record_upload_error("checksum_mismatch");
        return Err(ApiError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// POST /v1/chunks - receive one chunk of a transfer.
#[tracing::instrument(skip(state, multipart))]
pub async fn receive_chunk(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<ChunkAck>)> {
    let incoming = parse_multipart(multipart).await?;

    let payload = incoming
        .payload
        .clone()
        .ok_or_else(|| ApiError::BadRequest("chunk part is required".to_string()))?;
    let chunk_index = incoming
        .chunk_index
        .ok_or_else(|| ApiError::BadRequest("chunk_index is required".to_string()))?;
    let total_chunks = incoming
        .total_chunks
        .ok_or_else(|| ApiError::BadRequest("total_chunks is required".to_string()))?;

    if payload.is_empty() {
        return Err(ApiError::BadRequest("chunk payload is empty".to_string()));
    }
    let max_chunk_size = state.config.server.max_chunk_size;
    if payload.len() as u64 > max_chunk_size {
        return Err(ApiError::BadRequest(format!(
            "chunk size {} exceeds maximum {}",
            payload.len(),
            max_chunk_size
        )));
    }

    if let Some(ref checksum) = incoming.chunk_checksum {
        verify_checksum(&payload, checksum)?;
    }

    match incoming.session_id {
        None => begin_session(&state, incoming, payload, chunk_index, total_chunks).await,
        Some(session_id) => {
            continue_session(&state, incoming, payload, session_id, chunk_index, total_chunks)
                .await
        }
    }
}

/// First chunk of a transfer: create the session, then record the chunk.
async fn begin_session(
    state: &AppState,
    incoming: IncomingChunk,
    payload: Bytes,
    chunk_index: u32,
    total_chunks: u32,
) -> ApiResult<(StatusCode, Json<ChunkAck>)> {
    if chunk_index != 0 {
        return Err(ApiError::BadRequest(format!(
            "session_id is required for chunk_index {chunk_index}; only chunk 0 may omit it"
        )));
    }

    let file_name = incoming
        .file_name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::BadRequest("file_name is required on chunk 0".to_string()))?;
    let file_size = incoming
        .file_size
        .ok_or_else(|| ApiError::BadRequest("file_size is required on chunk 0".to_string()))?;

    if file_size == 0 || total_chunks == 0 {
        return Err(ApiError::BadRequest(
            "cannot upload an empty file".to_string(),
        ));
    }
    // Every chunk carries at least one byte, so a declared chunk count
    // above the byte count can never complete.
    if u64::from(total_chunks) > file_size {
        return Err(ApiError::BadRequest(format!(
            "total_chunks {total_chunks} is impossible for file_size {file_size}"
        )));
    }

    let session_id = SessionId::new();
    let now = OffsetDateTime::now_utc();
    state
        .registry
        .create_session(&NewSession {
            session_id: *session_id.as_uuid(),
            file_name,
            file_size,
            total_chunks,
            form_fields: incoming.metadata,
            created_at: now,
        })
        .await?;

    SESSIONS_CREATED.inc();
    tracing::info!(
        session_id = %session_id,
        total_chunks,
        file_size,
        "Created upload session"
    );

    let guard = state.locks.acquire(*session_id.as_uuid()).await;
    let ack = store_and_record(state, session_id, chunk_index, payload).await?;
    // A single-chunk transfer completes on its first chunk.
    if ack.completion.is_some() {
        state.locks.remove(*session_id.as_uuid()).await;
    }
    drop(guard);

    Ok((StatusCode::CREATED, Json(ack)))
}

/// Continuation chunk: validate against the session, then record.
async fn continue_session(
    state: &AppState,
    incoming: IncomingChunk,
    payload: Bytes,
    session_id: SessionId,
    chunk_index: u32,
    total_chunks: u32,
) -> ApiResult<(StatusCode, Json<ChunkAck>)> {
    let uuid = *session_id.as_uuid();
    let guard = state.locks.acquire(uuid).await;

    let session = state
        .registry
        .get_session(uuid)
        .await?
        .ok_or(ApiError::UnknownSession(uuid))?
        .to_session()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if !session.state.is_active() {
        record_upload_error("session_closed");
        return Err(ApiError::SessionClosed {
            session_id: uuid,
            state: session.state.to_string(),
        });
    }

    let now = OffsetDateTime::now_utc();
    if session.is_expired(now, state.config.server.session_timeout()) {
        record_upload_error("session_expired");
        return Err(ApiError::SessionExpired(uuid));
    }

    // total_chunks is redundant on every chunk but must stay consistent
    // within one session.
    if total_chunks != session.total_chunks {
        return Err(ApiError::BadRequest(format!(
            "total_chunks {} does not match the session's declared {}",
            total_chunks, session.total_chunks
        )));
    }

    if chunk_index >= session.total_chunks {
        record_upload_error("index_out_of_range");
        return Err(ApiError::IndexOutOfRange {
            index: chunk_index,
            total_chunks: session.total_chunks,
        });
    }

    // Session-level fields are immutable after chunk 0: late metadata is
    // never applied, whoever sent it.
    if !incoming.metadata.is_empty() {
        tracing::warn!(
            session_id = %session_id,
            chunk_index,
            fields = incoming.metadata.len(),
            "Ignoring metadata fields on a continuation chunk"
        );
    }
    if let Some(ref name) = incoming.file_name {
        if *name != session.file_name {
            tracing::warn!(
                session_id = %session_id,
                chunk_index,
                "Ignoring file_name that differs from the session's declaration"
            );
        }
    }

    let ack = store_and_record(state, session_id, chunk_index, payload).await?;

    if ack.completion.is_some() {
        state.locks.remove(uuid).await;
    }
    drop(guard);

    Ok((StatusCode::OK, Json(ack)))
}

/// Persist the chunk, mark it received, and assemble if it completed the
/// session. Caller holds the session lock.
async fn store_and_record(
    state: &AppState,
    session_id: SessionId,
    chunk_index: u32,
    payload: Bytes,
) -> ApiResult<ChunkAck> {
    let uuid = *session_id.as_uuid();
    let byte_length = payload.len() as u64;

    // Store before recording: accounting must never claim a chunk the
    // store does not hold.
    state.chunks.put(session_id, chunk_index, payload).await?;

    let now = OffsetDateTime::now_utc();
    let received_count = state
        .registry
        .record_chunk_received(uuid, chunk_index, byte_length, now)
        .await?;

    CHUNKS_RECEIVED.inc();
    BYTES_RECEIVED.inc_by(byte_length);

    let session = state
        .registry
        .get_session(uuid)
        .await?
        .ok_or(ApiError::UnknownSession(uuid))?
        .to_session()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let total_chunks = session.total_chunks;

    tracing::debug!(
        session_id = %session_id,
        chunk_index,
        received_count,
        total_chunks,
        "Chunk received"
    );

    // The completeness check and the conditional assembly run under the
    // same session lock as the receipt, so exactly one request can see
    // the session become complete.
    let completion = if state.registry.is_complete(uuid).await? {
        Some(assembler::assemble(state, &session).await?)
    } else {
        None
    };

    Ok(ChunkAck {
        session_id,
        chunk_index,
        received_count,
        total_chunks,
        progress: percent_complete(received_count, total_chunks),
        completion,
    })
}
