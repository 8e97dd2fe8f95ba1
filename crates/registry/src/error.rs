//! Registry error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors from session registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown session: {0}")]
    UnknownSession(Uuid),

    #[error("chunk index {index} out of range for session with {total_chunks} chunks")]
    IndexOutOfRange { index: u32, total_chunks: u32 },

    #[error("session {0} already exists")]
    AlreadyExists(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
