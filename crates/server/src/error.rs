//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clipdock_core::protocol::ErrorResponse;
use uuid::Uuid;

/// API error type.
///
/// Every server-side failure is returned synchronously in the response to
/// the request that triggered it, with a machine-distinguishable `code`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unknown session: {0}")]
    UnknownSession(Uuid),

    #[error("session {0} has expired")]
    SessionExpired(Uuid),

    #[error("session {session_id} is {state}, not open")]
    SessionClosed { session_id: Uuid, state: String },

    #[error("chunk index {index} out of range for {total_chunks} chunks")]
    IndexOutOfRange { index: u32, total_chunks: u32 },

    #[error("chunk checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("assembled size {actual} does not match declared size {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("missing chunk {index} during assembly")]
    MissingChunk { index: u32 },

    #[error("assembly failed: {0}")]
    AssemblyFailed(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(clipdock_storage::StorageError),

    #[error("registry error: {0}")]
    Registry(clipdock_registry::RegistryError),
}

// Registry and storage failures that correspond to protocol errors are
// surfaced under their protocol code, not as opaque backend errors.

impl From<clipdock_registry::RegistryError> for ApiError {
    fn from(e: clipdock_registry::RegistryError) -> Self {
        match e {
            clipdock_registry::RegistryError::UnknownSession(id) => Self::UnknownSession(id),
            clipdock_registry::RegistryError::IndexOutOfRange {
                index,
                total_chunks,
            } => Self::IndexOutOfRange {
                index,
                total_chunks,
            },
            other => Self::Registry(other),
        }
    }
}

impl From<clipdock_storage::StorageError> for ApiError {
    fn from(e: clipdock_storage::StorageError) -> Self {
        match e {
            clipdock_storage::StorageError::MissingChunk { index } => Self::MissingChunk { index },
            other => Self::Storage(other),
        }
    }
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownSession(_) => "unknown_session",
            Self::SessionExpired(_) => "session_expired",
            Self::SessionClosed { .. } => "session_closed",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::ChecksumMismatch { .. } => "checksum_mismatch",
            Self::SizeMismatch { .. } => "size_mismatch",
            Self::MissingChunk { .. } => "missing_chunk",
            Self::AssemblyFailed(_) => "assembly_failed",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
            Self::Storage(_) => "storage_error",
            Self::Registry(_) => "registry_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownSession(_) => StatusCode::NOT_FOUND,
            Self::SessionExpired(_) => StatusCode::GONE,
            Self::SessionClosed { .. } => StatusCode::CONFLICT,
            Self::IndexOutOfRange { .. } => StatusCode::BAD_REQUEST,
            Self::ChecksumMismatch { .. } => StatusCode::BAD_REQUEST,
            Self::SizeMismatch { .. } => StatusCode::CONFLICT,
            Self::MissingChunk { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::AssemblyFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                clipdock_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Registry(e) => match e {
                clipdock_registry::RegistryError::UnknownSession(_) => StatusCode::NOT_FOUND,
                clipdock_registry::RegistryError::IndexOutOfRange { .. } => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
