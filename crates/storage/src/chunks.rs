//! Domain-level chunk and artifact storage.
//!
//! Chunks are addressed by `(session, index)` and owned by this store from
//! receipt until the assembler consumes them; artifacts are published
//! atomically and never mutated afterwards.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectStore, StreamingUpload};
use bytes::Bytes;
use clipdock_core::chunk::{artifact_key, chunk_key, session_prefix};
use clipdock_core::session::SessionId;
use futures::StreamExt;
use std::sync::Arc;
use uuid::Uuid;

/// Chunk store over a generic object-store backend.
#[derive(Clone)]
pub struct ChunkStore {
    backend: Arc<dyn ObjectStore>,
}

impl ChunkStore {
    /// Create a chunk store over the given backend.
    pub fn new(backend: Arc<dyn ObjectStore>) -> Self {
        Self { backend }
    }

    /// Access the underlying backend.
    pub fn backend(&self) -> &Arc<dyn ObjectStore> {
        &self.backend
    }

    /// Persist one chunk. Overwriting an existing `(session, index)` is
    /// permitted and atomic; retransmitted chunks replace their
    /// predecessor wholesale.
    pub async fn put(&self, session: SessionId, index: u32, data: Bytes) -> StorageResult<()> {
        self.backend.put(&chunk_key(session, index), data).await
    }

    /// Check whether a chunk is stored.
    pub async fn contains(&self, session: SessionId, index: u32) -> StorageResult<bool> {
        self.backend.exists(&chunk_key(session, index)).await
    }

    /// Yield the payloads of chunks `0..total_chunks` as one ordered byte
    /// stream.
    ///
    /// The assembler only calls this once the registry reports the session
    /// complete, so a missing chunk here means registry and store have
    /// desynchronized; the stream guards the invariant and fails with
    /// [`StorageError::MissingChunk`] rather than producing a short
    /// artifact.
    pub async fn read_in_order(
        &self,
        session: SessionId,
        total_chunks: u32,
    ) -> StorageResult<ByteStream> {
        let backend = self.backend.clone();
        let stream = async_stream::try_stream! {
            for index in 0..total_chunks {
                let key = chunk_key(session, index);
                if !backend.exists(&key).await? {
                    Err(StorageError::MissingChunk { index })?;
                }
                let mut chunk = backend.get_stream(&key).await?;
                while let Some(part) = chunk.next().await {
                    yield part?;
                }
            }
        };
        Ok(Box::pin(stream))
    }

    /// Remove every stored chunk of a session.
    pub async fn purge(&self, session: SessionId) -> StorageResult<()> {
        let keys = self.backend.list(&session_prefix(session)).await?;
        for key in keys {
            match self.backend.delete(&key).await {
                Ok(()) => {}
                // Already gone is fine; purge is called from both the
                // assembler and the expiry sweep.
                Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Open a streaming sink for a new artifact. Returns the artifact's
    /// storage key and the sink; the artifact becomes visible under that
    /// key only when the sink's `finish` succeeds.
    pub async fn open_artifact(
        &self,
        artifact_id: Uuid,
    ) -> StorageResult<(String, Box<dyn StreamingUpload>)> {
        let key = artifact_key(artifact_id);
        let sink = self.backend.put_stream(&key).await?;
        Ok((key, sink))
    }
}
