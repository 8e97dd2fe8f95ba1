use anyhow::{Context, Result};
use bytes::Bytes;
use clipdock_core::protocol::{ChunkAck, SessionStatus};
use clipdock_core::session::SessionId;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::de::DeserializeOwned;

/// One chunk transmission.
#[derive(Clone, Debug)]
pub struct ChunkRequest<'a> {
    /// Absent on chunk 0; the server mints the session id.
    pub session_id: Option<SessionId>,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Declared on chunk 0 only.
    pub file_name: Option<&'a str>,
    /// Declared on chunk 0 only.
    pub file_size: Option<u64>,
    /// Lowercase SHA-256 hex of the payload.
    pub chunk_checksum: String,
    pub payload: Bytes,
    /// Opaque metadata, attached on chunk 0 only.
    pub metadata: &'a [(String, String)],
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Send one chunk and return its acknowledgment.
    pub async fn send_chunk(&self, req: ChunkRequest<'_>) -> Result<ChunkAck> {
        let mut form = Form::new()
            .text("chunk_index", req.chunk_index.to_string())
            .text("total_chunks", req.total_chunks.to_string())
            .text("chunk_checksum", req.chunk_checksum);

        if let Some(session_id) = req.session_id {
            form = form.text("session_id", session_id.to_string());
        }
        if let Some(file_name) = req.file_name {
            form = form.text("file_name", file_name.to_string());
        }
        if let Some(file_size) = req.file_size {
            form = form.text("file_size", file_size.to_string());
        }
        for (key, value) in req.metadata {
            form = form.text(key.clone(), value.clone());
        }

        let part = Part::bytes(req.payload.to_vec())
            .file_name("blob")
            .mime_str("application/octet-stream")?;
        form = form.part("chunk", part);

        let url = self.url("/v1/chunks")?;
        let response = self.http.post(url).multipart(form).send().await?;
        Self::parse_json(response).await
    }

    /// Query a session's state; powers resume.
    pub async fn session_status(&self, session_id: SessionId) -> Result<SessionStatus> {
        let url = self.url(&format!("/v1/sessions/{session_id}"))?;
        let response = self.http.get(url).send().await?;
        Self::parse_json(response).await
    }

    /// Abort a transfer, freeing server-side storage.
    pub async fn abort_session(&self, session_id: SessionId) -> Result<()> {
        let url = self.url(&format!("/v1/sessions/{session_id}"))?;
        let response = self.http.delete(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(())
    }
}
