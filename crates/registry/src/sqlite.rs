//! SQLite-backed session registry.

use crate::error::{RegistryError, RegistryResult};
use crate::models::{NewSession, SessionRow};
use crate::SessionRegistry;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// SQLite-based session registry.
pub struct SqliteRegistry {
    pool: Pool<Sqlite>,
}

impl SqliteRegistry {
    /// Create a new SQLite registry, running migrations.
    pub async fn new(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection avoids
            // persistent "database is locked" failures under axum concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let registry = Self { pool };
        registry.migrate().await?;
        Ok(registry)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl SessionRegistry for SqliteRegistry {
    async fn migrate(&self) -> RegistryResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS upload_sessions (
                session_id       BLOB PRIMARY KEY,
                file_name        TEXT NOT NULL,
                file_size        INTEGER NOT NULL,
                total_chunks     INTEGER NOT NULL,
                state            TEXT NOT NULL,
                form_fields      TEXT NOT NULL,
                artifact_key     TEXT,
                error_code       TEXT,
                error_detail     TEXT,
                created_at       TEXT NOT NULL,
                last_activity_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS received_chunks (
                session_id   BLOB NOT NULL REFERENCES upload_sessions(session_id) ON DELETE CASCADE,
                chunk_index  INTEGER NOT NULL,
                byte_length  INTEGER NOT NULL,
                received_at  TEXT NOT NULL,
                PRIMARY KEY (session_id, chunk_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_upload_sessions_state_activity \
             ON upload_sessions(state, last_activity_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn health_check(&self) -> RegistryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_session(&self, session: &NewSession) -> RegistryResult<()> {
        let form_fields = serde_json::to_string(&session.form_fields)?;
        sqlx::query(
            r#"
            INSERT INTO upload_sessions (
                session_id, file_name, file_size, total_chunks, state,
                form_fields, created_at, last_activity_at
            ) VALUES (?, ?, ?, ?, 'open', ?, ?, ?)
            "#,
        )
        .bind(session.session_id)
        .bind(&session.file_name)
        .bind(i64::try_from(session.file_size).unwrap_or(i64::MAX))
        .bind(i64::from(session.total_chunks))
        .bind(form_fields)
        .bind(session.created_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint") => {
                RegistryError::AlreadyExists(session.session_id)
            }
            _ => RegistryError::Database(e),
        })?;
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> RegistryResult<Option<SessionRow>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM upload_sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn record_chunk_received(
        &self,
        session_id: Uuid,
        index: u32,
        byte_length: u64,
        received_at: OffsetDateTime,
    ) -> RegistryResult<u32> {
        let mut tx = self.pool.begin().await?;

        let total: Option<(i64,)> =
            sqlx::query_as("SELECT total_chunks FROM upload_sessions WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((total_chunks,)) = total else {
            return Err(RegistryError::UnknownSession(session_id));
        };

        if i64::from(index) >= total_chunks {
            return Err(RegistryError::IndexOutOfRange {
                index,
                total_chunks: u32::try_from(total_chunks).unwrap_or(u32::MAX),
            });
        }

        // Duplicate re-delivery of an index overwrites, never appends.
        sqlx::query(
            r#"
            INSERT INTO received_chunks (session_id, chunk_index, byte_length, received_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id, chunk_index) DO UPDATE SET
                byte_length = excluded.byte_length,
                received_at = excluded.received_at
            "#,
        )
        .bind(session_id)
        .bind(i64::from(index))
        .bind(i64::try_from(byte_length).unwrap_or(i64::MAX))
        .bind(received_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE upload_sessions SET last_activity_at = ? WHERE session_id = ?")
            .bind(received_at)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM received_chunks WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn received_count(&self, session_id: Uuid) -> RegistryResult<u32> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM received_chunks WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn received_indices(&self, session_id: Uuid) -> RegistryResult<Vec<u32>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT chunk_index FROM received_chunks WHERE session_id = ? ORDER BY chunk_index",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(i,)| u32::try_from(i).unwrap_or(u32::MAX))
            .collect())
    }

    async fn is_complete(&self, session_id: Uuid) -> RegistryResult<bool> {
        let session = self
            .get_session(session_id)
            .await?
            .ok_or(RegistryError::UnknownSession(session_id))?;
        let count = self.received_count(session_id).await?;
        Ok(i64::from(count) == session.total_chunks)
    }

    async fn update_state(
        &self,
        session_id: Uuid,
        state: &str,
        updated_at: OffsetDateTime,
    ) -> RegistryResult<()> {
        let result = sqlx::query(
            "UPDATE upload_sessions SET state = ?, last_activity_at = ? WHERE session_id = ?",
        )
        .bind(state)
        .bind(updated_at)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RegistryError::UnknownSession(session_id));
        }
        Ok(())
    }

    async fn fail_session(
        &self,
        session_id: Uuid,
        error_code: &str,
        error_detail: Option<&str>,
        failed_at: OffsetDateTime,
    ) -> RegistryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE upload_sessions
            SET state = 'failed', error_code = ?, error_detail = ?, last_activity_at = ?
            WHERE session_id = ?
            "#,
        )
        .bind(error_code)
        .bind(error_detail)
        .bind(failed_at)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RegistryError::UnknownSession(session_id));
        }
        Ok(())
    }

    async fn complete_session(
        &self,
        session_id: Uuid,
        artifact_key: &str,
        completed_at: OffsetDateTime,
    ) -> RegistryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE upload_sessions
            SET state = 'complete', artifact_key = ?, last_activity_at = ?
            WHERE session_id = ?
            "#,
        )
        .bind(artifact_key)
        .bind(completed_at)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RegistryError::UnknownSession(session_id));
        }
        Ok(())
    }

    async fn expired_sessions(
        &self,
        cutoff: OffsetDateTime,
        limit: u32,
    ) -> RegistryResult<Vec<SessionRow>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT * FROM upload_sessions
            WHERE state != 'complete' AND last_activity_at < ?
            ORDER BY last_activity_at
            LIMIT ?
            "#,
        )
        .bind(cutoff)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_session(&self, session_id: Uuid) -> RegistryResult<()> {
        sqlx::query("DELETE FROM upload_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipdock_core::session::FormFields;

    async fn open_registry() -> (tempfile::TempDir, SqliteRegistry) {
        let temp = tempfile::tempdir().unwrap();
        let registry = SqliteRegistry::new(temp.path().join("registry.db"))
            .await
            .unwrap();
        (temp, registry)
    }

    fn sample_session(total_chunks: u32) -> NewSession {
        NewSession {
            session_id: Uuid::new_v4(),
            file_name: "match-recording.mp4".to_string(),
            file_size: 25,
            total_chunks,
            form_fields: FormFields::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn create_and_get_session() {
        let (_temp, registry) = open_registry().await;
        let session = sample_session(3);
        registry.create_session(&session).await.unwrap();

        let row = registry
            .get_session(session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.file_name, "match-recording.mp4");
        assert_eq!(row.total_chunks, 3);
        assert_eq!(row.state, "open");
        assert!(registry
            .get_session(Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_session_id_is_rejected() {
        let (_temp, registry) = open_registry().await;
        let session = sample_session(3);
        registry.create_session(&session).await.unwrap();
        let err = registry.create_session(&session).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn record_chunk_is_idempotent() {
        let (_temp, registry) = open_registry().await;
        let session = sample_session(3);
        registry.create_session(&session).await.unwrap();
        let id = session.session_id;
        let now = OffsetDateTime::now_utc();

        assert_eq!(
            registry.record_chunk_received(id, 0, 10, now).await.unwrap(),
            1
        );
        assert_eq!(
            registry.record_chunk_received(id, 0, 10, now).await.unwrap(),
            1
        );
        assert_eq!(
            registry.record_chunk_received(id, 1, 10, now).await.unwrap(),
            2
        );
        assert_eq!(registry.received_indices(id).await.unwrap(), vec![0, 1]);
        assert!(!registry.is_complete(id).await.unwrap());

        registry.record_chunk_received(id, 2, 5, now).await.unwrap();
        assert!(registry.is_complete(id).await.unwrap());
    }

    #[tokio::test]
    async fn out_of_range_index_is_rejected_without_accounting() {
        let (_temp, registry) = open_registry().await;
        let session = sample_session(3);
        registry.create_session(&session).await.unwrap();
        let id = session.session_id;
        let now = OffsetDateTime::now_utc();

        registry.record_chunk_received(id, 0, 10, now).await.unwrap();
        let err = registry
            .record_chunk_received(id, 5, 10, now)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::IndexOutOfRange {
                index: 5,
                total_chunks: 3
            }
        ));
        assert_eq!(registry.received_count(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_session_errors() {
        let (_temp, registry) = open_registry().await;
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        assert!(matches!(
            registry
                .record_chunk_received(id, 0, 1, now)
                .await
                .unwrap_err(),
            RegistryError::UnknownSession(_)
        ));
        assert!(matches!(
            registry.is_complete(id).await.unwrap_err(),
            RegistryError::UnknownSession(_)
        ));
        assert!(matches!(
            registry.update_state(id, "failed", now).await.unwrap_err(),
            RegistryError::UnknownSession(_)
        ));
    }

    #[tokio::test]
    async fn fail_and_complete_transitions() {
        let (_temp, registry) = open_registry().await;
        let session = sample_session(1);
        registry.create_session(&session).await.unwrap();
        let id = session.session_id;
        let now = OffsetDateTime::now_utc();

        registry
            .fail_session(id, "size_mismatch", Some("expected 25, got 24"), now)
            .await
            .unwrap();
        let row = registry.get_session(id).await.unwrap().unwrap();
        assert_eq!(row.state, "failed");
        assert_eq!(row.error_code.as_deref(), Some("size_mismatch"));

        registry
            .complete_session(id, "artifacts/abc", now)
            .await
            .unwrap();
        let row = registry.get_session(id).await.unwrap().unwrap();
        assert_eq!(row.state, "complete");
        assert_eq!(row.artifact_key.as_deref(), Some("artifacts/abc"));
    }

    #[tokio::test]
    async fn expired_sessions_skips_complete_and_respects_cutoff() {
        let (_temp, registry) = open_registry().await;
        let now = OffsetDateTime::now_utc();

        let stale = sample_session(3);
        let fresh = sample_session(3);
        let done = sample_session(1);
        for s in [&stale, &fresh, &done] {
            registry.create_session(s).await.unwrap();
        }

        let old = now - time::Duration::hours(2);
        registry
            .record_chunk_received(stale.session_id, 0, 1, old)
            .await
            .unwrap();
        registry
            .record_chunk_received(fresh.session_id, 0, 1, now)
            .await
            .unwrap();
        registry
            .complete_session(done.session_id, "artifacts/x", old)
            .await
            .unwrap();
        // Backdate the stale session's creation-time activity too.
        sqlx::query("UPDATE upload_sessions SET last_activity_at = ? WHERE session_id = ?")
            .bind(old)
            .bind(stale.session_id)
            .execute(registry.pool())
            .await
            .unwrap();

        let cutoff = now - time::Duration::hours(1);
        let expired = registry.expired_sessions(cutoff, 10).await.unwrap();
        let ids: Vec<Uuid> = expired.iter().map(|r| r.session_id).collect();
        assert!(ids.contains(&stale.session_id));
        assert!(!ids.contains(&fresh.session_id));
        assert!(!ids.contains(&done.session_id));
    }

    #[tokio::test]
    async fn delete_session_cascades_to_received_chunks() {
        let (_temp, registry) = open_registry().await;
        let session = sample_session(3);
        registry.create_session(&session).await.unwrap();
        let id = session.session_id;
        let now = OffsetDateTime::now_utc();

        registry.record_chunk_received(id, 0, 1, now).await.unwrap();
        registry.delete_session(id).await.unwrap();

        assert!(registry.get_session(id).await.unwrap().is_none());
        assert_eq!(registry.received_count(id).await.unwrap(), 0);
    }
}
