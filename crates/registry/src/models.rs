//! Database row types.

use clipdock_core::session::{FormFields, SessionId, SessionState, UploadSession};
use time::OffsetDateTime;
use uuid::Uuid;

/// Parameters for creating a session, captured from the first chunk.
#[derive(Clone, Debug)]
pub struct NewSession {
    pub session_id: Uuid,
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: u32,
    pub form_fields: FormFields,
    pub created_at: OffsetDateTime,
}

/// A row in the `upload_sessions` table.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct SessionRow {
    pub session_id: Uuid,
    pub file_name: String,
    pub file_size: i64,
    pub total_chunks: i64,
    pub state: String,
    pub form_fields: String,
    pub artifact_key: Option<String>,
    pub error_code: Option<String>,
    pub error_detail: Option<String>,
    pub created_at: OffsetDateTime,
    pub last_activity_at: OffsetDateTime,
}

impl SessionRow {
    /// Decode the row into the domain session type.
    pub fn to_session(&self) -> clipdock_core::Result<UploadSession> {
        let form_fields: FormFields = serde_json::from_str(&self.form_fields)
            .map_err(|e| clipdock_core::Error::Serialization(e.to_string()))?;
        Ok(UploadSession {
            id: SessionId::from(self.session_id),
            file_name: self.file_name.clone(),
            file_size: u64::try_from(self.file_size).unwrap_or_default(),
            total_chunks: u32::try_from(self.total_chunks).unwrap_or(u32::MAX),
            state: SessionState::parse(&self.state)?,
            form_fields,
            artifact_key: self.artifact_key.clone(),
            error_code: self.error_code.clone(),
            error_detail: self.error_detail.clone(),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        })
    }
}

/// A row in the `received_chunks` table.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ReceivedChunkRow {
    pub session_id: Uuid,
    pub chunk_index: i64,
    pub byte_length: i64,
    pub received_at: OffsetDateTime,
}
