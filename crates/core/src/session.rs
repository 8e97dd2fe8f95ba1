//! Upload session types and lifecycle.

use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an upload session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidSessionId(e.to_string()))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Session is open and accepting chunks.
    Open,
    /// All chunks received; assembly is in progress.
    Assembling,
    /// Assembly succeeded and the artifact was published.
    Complete,
    /// Assembly failed; session is retained for inspection.
    Failed,
    /// Session timed out before completing.
    Expired,
}

impl SessionState {
    /// Check if the session can still receive chunks.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Expired)
    }

    /// Stable string form used in the registry and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Assembling => "assembling",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "open" => Ok(Self::Open),
            "assembling" => Ok(Self::Assembling),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            other => Err(crate::Error::InvalidSessionState(other.to_string())),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata fields attached to the first chunk of a transfer.
///
/// Opaque to the upload core; passed through to the downstream pipeline
/// at finalization.
pub type FormFields = Map<String, serde_json::Value>;

/// An upload session tracking one chunked transfer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// Declared name of the file being uploaded.
    pub file_name: String,
    /// Declared total size in bytes, verified at assembly.
    pub file_size: u64,
    /// Total chunk count, fixed at creation.
    pub total_chunks: u32,
    /// Current session state.
    pub state: SessionState,
    /// Metadata captured from the first chunk only.
    pub form_fields: FormFields,
    /// Storage key of the published artifact (set once complete).
    pub artifact_key: Option<String>,
    /// Error code if the session failed.
    pub error_code: Option<String>,
    /// Human-readable error detail if the session failed.
    pub error_detail: Option<String>,
    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When a chunk was last received for this session.
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity_at: OffsetDateTime,
}

impl UploadSession {
    /// Create a new open session from first-chunk metadata.
    pub fn new(file_name: String, file_size: u64, total_chunks: u32, form_fields: FormFields) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: SessionId::new(),
            file_name,
            file_size,
            total_chunks,
            state: SessionState::Open,
            form_fields,
            artifact_key: None,
            error_code: None,
            error_detail: None,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Check whether the session has been inactive longer than `timeout`.
    pub fn is_expired(&self, now: OffsetDateTime, timeout: time::Duration) -> bool {
        !self.state.is_terminal() && self.last_activity_at + timeout < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_roundtrip() {
        let id = SessionId::new();
        let parsed = SessionId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(SessionId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn session_state_flags() {
        assert!(SessionState::Open.is_active());
        assert!(!SessionState::Open.is_terminal());
        assert!(!SessionState::Assembling.is_active());
        assert!(!SessionState::Assembling.is_terminal());
        for state in [
            SessionState::Complete,
            SessionState::Failed,
            SessionState::Expired,
        ] {
            assert!(!state.is_active());
            assert!(state.is_terminal());
        }
    }

    #[test]
    fn session_state_string_roundtrip() {
        for state in [
            SessionState::Open,
            SessionState::Assembling,
            SessionState::Complete,
            SessionState::Failed,
            SessionState::Expired,
        ] {
            assert_eq!(SessionState::parse(state.as_str()).unwrap(), state);
        }
        assert!(SessionState::parse("bogus").is_err());
    }

    #[test]
    fn expiry_respects_activity_and_terminal_state() {
        let mut session = UploadSession::new("clip.mp4".into(), 100, 3, FormFields::new());
        let now = session.last_activity_at;
        assert!(!session.is_expired(now + time::Duration::seconds(5), time::Duration::seconds(10)));
        assert!(session.is_expired(now + time::Duration::seconds(15), time::Duration::seconds(10)));

        session.state = SessionState::Complete;
        assert!(!session.is_expired(now + time::Duration::seconds(15), time::Duration::seconds(10)));
    }
}
