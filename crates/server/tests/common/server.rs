//! Server test harness.

use super::fixtures::{multipart_body, multipart_content_type};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use clipdock_core::config::AppConfig;
use clipdock_registry::{SessionRegistry, SqliteRegistry};
use clipdock_server::{create_router, AppState};
use clipdock_storage::{ChunkStore, FilesystemBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let backend: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("registry.db");
        let registry: Arc<dyn SessionRegistry> = Arc::new(
            SqliteRegistry::new(&db_path)
                .await
                .expect("Failed to create session registry"),
        );

        let mut config = AppConfig::for_testing();
        modifier(&mut config);

        clipdock_server::metrics::register_metrics();
        let state = AppState::new(config, registry, ChunkStore::new(backend));
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// POST a chunk request built from the given fields and payload.
    pub async fn post_chunk(
        &self,
        fields: &[(&str, &str)],
        chunk: Option<&[u8]>,
    ) -> (StatusCode, serde_json::Value) {
        let body = multipart_body(fields, chunk);
        let request = Request::builder()
            .method("POST")
            .uri("/v1/chunks")
            .header("content-type", multipart_content_type())
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// GET a session's status.
    pub async fn get_status(&self, session_id: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("GET")
            .uri(format!("/v1/sessions/{session_id}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// DELETE (abort) a session.
    pub async fn abort(&self, session_id: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/v1/sessions/{session_id}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    /// Read a stored object (chunk or artifact) directly from the backend.
    pub async fn read_object(&self, key: &str) -> Vec<u8> {
        self.state
            .chunks
            .backend()
            .get(key)
            .await
            .expect("object missing")
            .to_vec()
    }

    /// List stored object keys under a prefix.
    pub async fn list_objects(&self, prefix: &str) -> Vec<String> {
        self.state
            .chunks
            .backend()
            .list(prefix)
            .await
            .expect("list failed")
    }
}

/// Send a complete upload of `payload` in `chunk_size`-byte chunks and
/// return the final response body (which carries the completion).
#[allow(dead_code)]
pub async fn upload_all(
    server: &TestServer,
    file_name: &str,
    payload: &[u8],
    chunk_size: usize,
) -> serde_json::Value {
    let chunks = super::fixtures::split_chunks(payload, chunk_size);
    let total = chunks.len().to_string();
    let file_size = payload.len().to_string();

    let (status, first) = server
        .post_chunk(
            &[
                ("chunk_index", "0"),
                ("total_chunks", &total),
                ("file_name", file_name),
                ("file_size", &file_size),
            ],
            Some(&chunks[0]),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "chunk 0 failed: {first}");
    let session_id = first["session_id"].as_str().unwrap().to_string();

    let mut last = first;
    for (index, chunk) in chunks.iter().enumerate().skip(1) {
        let index = index.to_string();
        let (status, body) = server
            .post_chunk(
                &[
                    ("session_id", &session_id),
                    ("chunk_index", &index),
                    ("total_chunks", &total),
                ],
                Some(chunk),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "chunk {index} failed: {body}");
        last = body;
    }
    last
}
