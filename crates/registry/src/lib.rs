//! Upload session registry.
//!
//! The registry is the authoritative bookkeeping for in-progress chunked
//! transfers: which sessions exist, what was declared on their first
//! chunk, and exactly which chunk indices have been received. It holds no
//! chunk payloads; those live in `clipdock-storage`.

pub mod error;
pub mod models;
pub mod sqlite;

pub use error::{RegistryError, RegistryResult};
pub use models::{NewSession, ReceivedChunkRow, SessionRow};
pub use sqlite::SqliteRegistry;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Authoritative session bookkeeping.
///
/// Callers serialize access per session (the server holds a per-session
/// lock across record-receipt, completeness check, and assembly); the
/// registry itself only guarantees that each individual operation is
/// atomic.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Create the schema if it does not exist.
    async fn migrate(&self) -> RegistryResult<()>;

    /// Check backing-store connectivity.
    async fn health_check(&self) -> RegistryResult<()>;

    /// Create a new session from first-chunk metadata.
    async fn create_session(&self, session: &NewSession) -> RegistryResult<()>;

    /// Get a session by ID.
    async fn get_session(&self, session_id: Uuid) -> RegistryResult<Option<SessionRow>>;

    /// Idempotently mark `index` as received and return the new count of
    /// distinct received indices.
    ///
    /// Re-delivery of an already-received index overwrites the recorded
    /// byte length and timestamp without growing the count. Fails with
    /// [`RegistryError::IndexOutOfRange`] if `index` is not below the
    /// session's `total_chunks`, and [`RegistryError::UnknownSession`] if
    /// the session does not exist. Touches `last_activity_at`.
    async fn record_chunk_received(
        &self,
        session_id: Uuid,
        index: u32,
        byte_length: u64,
        received_at: OffsetDateTime,
    ) -> RegistryResult<u32>;

    /// Count of distinct received chunk indices.
    async fn received_count(&self, session_id: Uuid) -> RegistryResult<u32>;

    /// Received chunk indices in ascending order.
    async fn received_indices(&self, session_id: Uuid) -> RegistryResult<Vec<u32>>;

    /// True iff every index in `[0, total_chunks)` has been received.
    async fn is_complete(&self, session_id: Uuid) -> RegistryResult<bool>;

    /// Update the session lifecycle state.
    async fn update_state(
        &self,
        session_id: Uuid,
        state: &str,
        updated_at: OffsetDateTime,
    ) -> RegistryResult<()>;

    /// Move the session to `failed`, recording the error for inspection.
    async fn fail_session(
        &self,
        session_id: Uuid,
        error_code: &str,
        error_detail: Option<&str>,
        failed_at: OffsetDateTime,
    ) -> RegistryResult<()>;

    /// Move the session to `complete`, recording the published artifact.
    async fn complete_session(
        &self,
        session_id: Uuid,
        artifact_key: &str,
        completed_at: OffsetDateTime,
    ) -> RegistryResult<()>;

    /// Sessions that are not complete and have seen no activity since
    /// `cutoff`, oldest first.
    async fn expired_sessions(
        &self,
        cutoff: OffsetDateTime,
        limit: u32,
    ) -> RegistryResult<Vec<SessionRow>>;

    /// Delete a session and its received-chunk rows.
    async fn delete_session(&self, session_id: Uuid) -> RegistryResult<()>;
}
