//! Wire protocol between the chunk sequencer and the server.
//!
//! One chunk transmission is a `multipart/form-data` POST carrying the
//! binary `chunk` part plus text parts for `chunk_index`, `total_chunks`,
//! `session_id` (absent on chunk 0), `file_name` / `file_size`
//! (meaningful on chunk 0 only), an optional `chunk_checksum`, and any
//! number of opaque metadata parts (captured on chunk 0 only).

use crate::session::SessionId;
use serde::{Deserialize, Serialize};

/// Acknowledgment for a received chunk.
///
/// `completion` is populated only on the response to the chunk that
/// completed the session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkAck {
    /// The session this chunk was recorded against. Freshly minted on the
    /// response to chunk 0.
    pub session_id: SessionId,
    /// Index of the acknowledged chunk.
    pub chunk_index: u32,
    /// Distinct chunk indices received so far.
    pub received_count: u32,
    /// Total chunk count for the session.
    pub total_chunks: u32,
    /// Completion percentage, 0-100.
    pub progress: u8,
    /// Present once the session has been assembled and finalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionDescriptor>,
}

/// Returned once finalization succeeds; references the reconstructed
/// artifact for downstream consumption.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionDescriptor {
    /// The now-closed session.
    pub session_id: SessionId,
    /// Storage key of the published artifact.
    pub artifact_key: String,
    /// Original file name declared on chunk 0.
    pub file_name: String,
    /// Verified total size in bytes.
    pub file_size: u64,
}

/// Response from querying session state; powers client-side resume.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionStatus {
    /// The session being described.
    pub session_id: SessionId,
    /// Current lifecycle state.
    pub state: String,
    /// Declared file name.
    pub file_name: String,
    /// Declared file size in bytes.
    pub file_size: u64,
    /// Total chunk count for the session.
    pub total_chunks: u32,
    /// Distinct chunk indices received so far.
    pub received_count: u32,
    /// Received indices in ascending order.
    pub received_indices: Vec<u32>,
    /// Completion percentage, 0-100.
    pub progress: u8,
    /// Error code if the session failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// When a chunk was last received, RFC 3339.
    pub last_activity_at: String,
}

/// Error body returned by every failing endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-distinguishable error kind.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}
