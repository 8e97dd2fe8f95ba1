//! Durable storage for chunk payloads and published artifacts.
//!
//! A generic [`ObjectStore`] trait with a local-filesystem backend, plus
//! the domain-level [`ChunkStore`] that the server's assembler and sweep
//! work against.

pub mod backends;
pub mod chunks;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use chunks::ChunkStore;
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};

use clipdock_core::config::StorageConfig;
use std::sync::Arc;

/// Build an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
