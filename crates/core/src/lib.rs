//! Core domain types and shared logic for the clipdock upload service.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Upload session identity and lifecycle
//! - Chunk math and storage key layout
//! - The wire protocol exchanged between sequencer and server
//! - Progress derivation
//! - Configuration types

pub mod chunk;
pub mod config;
pub mod error;
pub mod progress;
pub mod protocol;
pub mod session;

pub use chunk::{artifact_key, chunk_key, session_prefix, total_chunks};
pub use error::{Error, Result};
pub use progress::percent_complete;
pub use protocol::{ChunkAck, CompletionDescriptor, ErrorResponse, SessionStatus};
pub use session::{SessionId, SessionState, UploadSession};

/// Default chunk size: 10 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum accepted chunk payload: 64 MiB.
pub const MAX_CHUNK_SIZE: u64 = 64 * 1024 * 1024;
