//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid session ID: {0}")]
    InvalidSessionId(String),

    #[error("invalid session state: {0}")]
    InvalidSessionState(String),

    #[error("chunk index {index} out of range for {total_chunks} chunks")]
    IndexOutOfRange { index: u32, total_chunks: u32 },

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(u64),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
