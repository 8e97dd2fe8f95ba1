//! Chunk math and storage key layout.

use crate::session::SessionId;

/// Compute the number of chunks a file of `file_size` bytes splits into.
///
/// The last chunk may be smaller than `chunk_size`; every other chunk is
/// exactly `chunk_size` bytes.
pub fn total_chunks(file_size: u64, chunk_size: u64) -> u64 {
    file_size.div_ceil(chunk_size)
}

/// Storage key prefix holding every chunk of a session.
pub fn session_prefix(session_id: SessionId) -> String {
    format!("sessions/{session_id}")
}

/// Storage key for one chunk of a session.
///
/// Indices are zero-padded so a lexicographic listing is also index order.
pub fn chunk_key(session_id: SessionId, index: u32) -> String {
    format!("sessions/{session_id}/{index:08}")
}

/// Storage key for a published artifact.
pub fn artifact_key(artifact_id: uuid::Uuid) -> String {
    format!("artifacts/{artifact_id}")
}
