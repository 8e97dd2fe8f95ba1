//! The chunk sequencer.
//!
//! Splits a file into fixed-size chunks and delivers every byte to the
//! server in ordered transmissions, one chunk in flight at a time. Each
//! chunk is retried with exponential backoff; a transfer that fails after
//! its session was established surfaces the session id so the caller can
//! resume from the first unacknowledged index instead of restarting at 0.

use crate::api_client::{ApiClient, ChunkRequest};
use anyhow::{anyhow, Context};
use bytes::Bytes;
use clipdock_core::protocol::CompletionDescriptor;
use clipdock_core::session::SessionId;
use clipdock_core::{total_chunks, DEFAULT_CHUNK_SIZE};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

/// Sequencer tuning knobs.
#[derive(Clone, Debug)]
pub struct SequencerConfig {
    /// Fixed chunk size in bytes.
    pub chunk_size: u64,
    /// Retries per chunk after the first attempt.
    pub max_retries: usize,
    /// Base delay for exponential backoff between retries.
    pub retry_base_delay: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// A failed transfer. Carries the session id once one was established so
/// the caller can resume instead of restarting from chunk 0.
#[derive(Debug)]
pub struct TransferError {
    /// The session the transfer got as far as establishing, if any.
    pub session_id: Option<SessionId>,
    /// The underlying failure.
    pub source: anyhow::Error,
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.session_id {
            Some(id) => write!(f, "transfer failed (session {id} resumable): {}", self.source),
            None => write!(f, "transfer failed: {}", self.source),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

type TransferResult<T> = std::result::Result<T, TransferError>;

/// Upload a file from scratch.
///
/// `progress` receives a monotonically non-decreasing 0-100 value after
/// every acknowledged chunk. Cancellation is checked between chunks; a
/// cancelled transfer fails with its session id attached.
pub async fn upload_file(
    api: &ApiClient,
    path: impl AsRef<Path>,
    metadata: &[(String, String)],
    config: &SequencerConfig,
    cancel: &CancellationToken,
    progress: &mut dyn FnMut(u8),
) -> TransferResult<CompletionDescriptor> {
    let (file, file_name, file_size) = open_source(path.as_ref()).await?;
    let total = chunk_count(file_size, config.chunk_size)?;

    let plan = Plan {
        file,
        file_name,
        file_size,
        total,
        session_id: None,
        missing: (0..total).collect(),
    };
    run_transfer(api, plan, metadata, config, cancel, progress).await
}

/// Resume a transfer from the first unacknowledged index.
///
/// Queries the server for the session's received indices and sends only
/// what is missing, in increasing order.
pub async fn resume_upload(
    api: &ApiClient,
    session_id: SessionId,
    path: impl AsRef<Path>,
    config: &SequencerConfig,
    cancel: &CancellationToken,
    progress: &mut dyn FnMut(u8),
) -> TransferResult<CompletionDescriptor> {
    let (file, file_name, file_size) = open_source(path.as_ref()).await?;

    let status = api
        .session_status(session_id)
        .await
        .map_err(|e| fail(Some(session_id), e))?;

    if status.state != "open" {
        return Err(fail(
            Some(session_id),
            anyhow!("session is {}, nothing to resume", status.state),
        ));
    }
    if status.file_size != file_size {
        return Err(fail(
            Some(session_id),
            anyhow!(
                "local file is {} bytes but the session declared {}",
                file_size,
                status.file_size
            ),
        ));
    }
    let expected_total = chunk_count(file_size, config.chunk_size)?;
    if status.total_chunks != expected_total {
        return Err(fail(
            Some(session_id),
            anyhow!(
                "chunk size mismatch: session has {} chunks, local split has {}",
                status.total_chunks,
                expected_total
            ),
        ));
    }

    let received: BTreeSet<u32> = status.received_indices.iter().copied().collect();
    let missing: Vec<u32> = (0..status.total_chunks)
        .filter(|index| !received.contains(index))
        .collect();

    progress(status.progress);
    tracing::info!(
        session_id = %session_id,
        received = received.len(),
        missing = missing.len(),
        "Resuming transfer"
    );

    let plan = Plan {
        file,
        file_name,
        file_size,
        total: status.total_chunks,
        session_id: Some(session_id),
        missing,
    };
    run_transfer(api, plan, &[], config, cancel, progress).await
}

struct Plan {
    file: fs::File,
    file_name: String,
    file_size: u64,
    total: u32,
    session_id: Option<SessionId>,
    missing: Vec<u32>,
}

async fn run_transfer(
    api: &ApiClient,
    mut plan: Plan,
    metadata: &[(String, String)],
    config: &SequencerConfig,
    cancel: &CancellationToken,
    progress: &mut dyn FnMut(u8),
) -> TransferResult<CompletionDescriptor> {
    for index in plan.missing.clone() {
        if cancel.is_cancelled() {
            return Err(fail(plan.session_id, anyhow!("transfer cancelled")));
        }

        let payload = read_chunk(&mut plan.file, index, config.chunk_size, plan.file_size)
            .await
            .map_err(|e| fail(plan.session_id, e))?;
        let checksum = format!("{:x}", Sha256::digest(&payload));

        // Declarations and metadata ride on chunk 0 only.
        let first = plan.session_id.is_none();
        let request = ChunkRequest {
            session_id: plan.session_id,
            chunk_index: index,
            total_chunks: plan.total,
            file_name: first.then_some(plan.file_name.as_str()),
            file_size: first.then_some(plan.file_size),
            chunk_checksum: checksum,
            payload,
            metadata: if first { metadata } else { &[] },
        };

        let ack = send_with_retry(api, request, config)
            .await
            .map_err(|e| fail(plan.session_id, e))?;

        // The first acknowledgment carries the freshly minted session id;
        // every subsequent chunk must present it.
        plan.session_id = Some(ack.session_id);
        progress(ack.progress);

        if let Some(completion) = ack.completion {
            return Ok(completion);
        }
    }

    // Every missing chunk was acknowledged yet the server never reported
    // completion; the session diverged (e.g. swept mid-transfer).
    Err(fail(
        plan.session_id,
        anyhow!("transfer ended without a completion descriptor"),
    ))
}

/// Send one chunk, retrying transient failures with exponential backoff.
async fn send_with_retry(
    api: &ApiClient,
    request: ChunkRequest<'_>,
    config: &SequencerConfig,
) -> anyhow::Result<clipdock_core::protocol::ChunkAck> {
    let mut attempt = 0;
    loop {
        match api.send_chunk(request.clone()).await {
            Ok(ack) => return Ok(ack),
            Err(e) if attempt < config.max_retries => {
                let delay = config.retry_base_delay * 2u32.saturating_pow(attempt as u32);
                tracing::warn!(
                    chunk_index = request.chunk_index,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Chunk transmission failed, retrying"
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(e.context(format!(
                    "chunk {} failed after {} attempts",
                    request.chunk_index,
                    attempt + 1
                )))
            }
        }
    }
}

async fn open_source(path: &Path) -> TransferResult<(fs::File, String, u64)> {
    let open = async {
        let file = fs::File::open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        let file_size = file.metadata().await?.len();
        if file_size == 0 {
            anyhow::bail!("cannot upload an empty file");
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("path has no file name: {}", path.display()))?;
        Ok((file, file_name, file_size))
    };
    open.await.map_err(|e| fail(None, e))
}

fn chunk_count(file_size: u64, chunk_size: u64) -> TransferResult<u32> {
    if chunk_size == 0 {
        return Err(fail(None, anyhow!("chunk_size cannot be 0")));
    }
    u32::try_from(total_chunks(file_size, chunk_size))
        .map_err(|_| fail(None, anyhow!("file needs more than u32::MAX chunks")))
}

/// Read the chunk at `index`: exactly `chunk_size` bytes, except the last
/// chunk which holds the remainder.
async fn read_chunk(
    file: &mut fs::File,
    index: u32,
    chunk_size: u64,
    file_size: u64,
) -> anyhow::Result<Bytes> {
    let offset = u64::from(index) * chunk_size;
    let len = chunk_size.min(file_size.saturating_sub(offset));
    if len == 0 {
        anyhow::bail!("chunk {index} starts past end of file");
    }

    file.seek(std::io::SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}

impl TransferError {
    fn new(session_id: Option<SessionId>, source: anyhow::Error) -> Self {
        Self { session_id, source }
    }
}

fn fail(session_id: Option<SessionId>, source: anyhow::Error) -> TransferError {
    TransferError::new(session_id, source)
}
