//! SQLite-backed session store.
//!
//! Sessions survive restarts. Chunk texts and their embeddings are stored
//! per position; the vector index is rebuilt from them on read.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use super::{extended_index, SessionRecord, SessionStore};
use crate::core::errors::ApiError;
use crate::rag::index::{decode_vector, encode_vector, IndexSnapshot};
use crate::rag::VectorIndex;

pub struct SqliteSessionStore {
    pool: SqlitePool,
    /// Serializes inserts and appends so positions never collide.
    write_lock: Mutex<()>,
}

impl SqliteSessionStore {
    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                embedding_model TEXT NOT NULL,
                documents TEXT NOT NULL DEFAULT '[]',
                dimension INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS session_chunks (
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                PRIMARY KEY (session_id, position)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_expiry ON sessions(expires_at)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, ApiError> {
        let row = sqlx::query(
            "SELECT id, embedding_model, documents, dimension, created_at, expires_at
             FROM sessions
             WHERE id = ?1 AND expires_at > ?2",
        )
        .bind(id)
        .bind(timestamp(Utc::now()))
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let documents_json: String = row.get("documents");
        let documents: Vec<String> =
            serde_json::from_str(&documents_json).map_err(ApiError::internal)?;
        let dimension: i64 = row.get("dimension");

        let chunk_rows = sqlx::query(
            "SELECT content, embedding
             FROM session_chunks
             WHERE session_id = ?1
             ORDER BY position ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut chunks = Vec::with_capacity(chunk_rows.len());
        let mut vectors = Vec::with_capacity(chunk_rows.len());
        for chunk_row in &chunk_rows {
            chunks.push(chunk_row.get::<String, _>("content"));
            let blob: Vec<u8> = chunk_row.get("embedding");
            vectors.push(decode_vector(&blob)?);
        }

        let index = VectorIndex::from_snapshot(IndexSnapshot {
            dimension: dimension as usize,
            chunks,
            vectors,
        })?;

        Ok(Some(SessionRecord {
            id: row.get("id"),
            embedding_model: row.get("embedding_model"),
            documents,
            index: Arc::new(index),
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            expires_at: parse_timestamp(&row.get::<String, _>("expires_at"))?,
        }))
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(ApiError::internal)
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn insert(&self, record: SessionRecord) -> Result<(), ApiError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        let existing = sqlx::query("SELECT 1 FROM sessions WHERE id = ?1")
            .bind(&record.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        if existing.is_some() {
            return Err(ApiError::Conflict(format!(
                "session {} already exists",
                record.id
            )));
        }

        let documents = serde_json::to_string(&record.documents).map_err(ApiError::internal)?;
        let snapshot = record.index.snapshot();

        sqlx::query(
            "INSERT INTO sessions (id, embedding_model, documents, dimension, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&record.id)
        .bind(&record.embedding_model)
        .bind(&documents)
        .bind(snapshot.dimension as i64)
        .bind(timestamp(record.created_at))
        .bind(timestamp(record.expires_at))
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        for (position, (content, vector)) in
            snapshot.chunks.iter().zip(&snapshot.vectors).enumerate()
        {
            sqlx::query(
                "INSERT INTO session_chunks (session_id, position, content, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&record.id)
            .bind(position as i64)
            .bind(content)
            .bind(encode_vector(vector))
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SessionRecord>, ApiError> {
        self.load(id).await
    }

    async fn append(
        &self,
        id: &str,
        document: String,
        chunks: Vec<String>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<SessionRecord, ApiError> {
        let _guard = self.write_lock.lock().await;

        let mut record = self
            .load(id)
            .await?
            .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))?;

        let base = record.index.len();
        let next = extended_index(&record.index, chunks.clone(), embeddings.clone())?;
        record.documents.push(document);
        let documents = serde_json::to_string(&record.documents).map_err(ApiError::internal)?;

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        for (offset, (content, vector)) in chunks.iter().zip(&embeddings).enumerate() {
            sqlx::query(
                "INSERT INTO session_chunks (session_id, position, content, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(id)
            .bind((base + offset) as i64)
            .bind(content)
            .bind(encode_vector(vector))
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        sqlx::query("UPDATE sessions SET documents = ?1 WHERE id = ?2")
            .bind(&documents)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        tx.commit().await.map_err(ApiError::internal)?;

        record.index = Arc::new(next);
        Ok(record)
    }

    async fn remove(&self, id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
            .bind(timestamp(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected() as usize)
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let row = sqlx::query("SELECT COUNT(*) AS live FROM sessions WHERE expires_at > ?1")
            .bind(timestamp(Utc::now()))
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        let live: i64 = row.get("live");
        Ok(live as usize)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::session::test_support::record;

    async fn store_in(dir: &tempfile::TempDir) -> SqliteSessionStore {
        SqliteSessionStore::with_path(dir.path().join("sessions.db"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn round_trips_records_and_search_results() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let original = record("session-1", Duration::from_secs(60));
        let expected = original.index.search(&[1.0, 1.0], 2).unwrap();
        store.insert(original).await.unwrap();

        let loaded = store.get("session-1").await.unwrap().unwrap();
        assert_eq!(loaded.embedding_model, "hashing-2");
        assert_eq!(loaded.documents, vec!["a.txt".to_string()]);
        assert_eq!(loaded.index.search(&[1.0, 1.0], 2).unwrap(), expected);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sessions_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store_in(&dir).await;
            store
                .insert(record("session-1", Duration::from_secs(60)))
                .await
                .unwrap();
        }

        let reopened = store_in(&dir).await;
        assert!(reopened.get("session-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        store
            .insert(record("session-1", Duration::from_secs(60)))
            .await
            .unwrap();

        assert!(matches!(
            store
                .insert(record("session-1", Duration::from_secs(60)))
                .await,
            Err(ApiError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn append_extends_positions_and_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        store
            .insert(record("session-1", Duration::from_secs(60)))
            .await
            .unwrap();

        let updated = store
            .append(
                "session-1",
                "b.txt".to_string(),
                vec!["gamma".to_string()],
                vec![vec![7.0, 1.0]],
            )
            .await
            .unwrap();
        assert_eq!(updated.index.len(), 3);

        let loaded = store.get("session-1").await.unwrap().unwrap();
        assert_eq!(loaded.index.chunks(), ["alpha", "beta", "gamma"]);
        assert_eq!(loaded.documents, vec!["a.txt".to_string(), "b.txt".to_string()]);

        let hit = &loaded.index.search(&[7.0, 1.0], 1).unwrap()[0];
        assert_eq!(hit.position, 2);
    }

    #[tokio::test]
    async fn mismatched_append_is_rejected_without_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        store
            .insert(record("session-1", Duration::from_secs(60)))
            .await
            .unwrap();

        let result = store
            .append(
                "session-1",
                "bad.txt".to_string(),
                vec!["x".to_string()],
                vec![vec![1.0]],
            )
            .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));

        let loaded = store.get("session-1").await.unwrap().unwrap();
        assert_eq!(loaded.index.len(), 2);
        assert_eq!(loaded.documents.len(), 1);
    }

    #[tokio::test]
    async fn expired_sessions_are_hidden_and_purged_with_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        store
            .insert(record("session-old", Duration::ZERO))
            .await
            .unwrap();

        assert!(store.get("session-old").await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 1);

        let orphans: i64 = sqlx::query("SELECT COUNT(*) AS n FROM session_chunks")
            .fetch_one(&store.pool)
            .await
            .unwrap()
            .get("n");
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn remove_reports_whether_a_session_existed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        store
            .insert(record("session-1", Duration::from_secs(60)))
            .await
            .unwrap();

        assert!(store.remove("session-1").await.unwrap());
        assert!(!store.remove("session-1").await.unwrap());
        assert!(store.get("session-1").await.unwrap().is_none());
    }
}
