//! Session storage.
//!
//! A session owns the vector index built from the documents uploaded into
//! it. Sessions expire a fixed time after creation.

mod memory;
mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::core::config::{AppPaths, SessionBackend, SessionSettings};
use crate::core::errors::ApiError;
use crate::rag::VectorIndex;

pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    /// Model that produced the stored embeddings
    pub embedding_model: String,
    /// Names of the ingested documents, in upload order
    pub documents: Vec<String>,
    pub index: Arc<VectorIndex>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(
        id: String,
        embedding_model: String,
        documents: Vec<String>,
        index: VectorIndex,
        ttl: Duration,
    ) -> Result<Self, ApiError> {
        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).map_err(ApiError::internal)?;
        Ok(Self {
            id,
            embedding_model,
            documents,
            index: Arc::new(index),
            created_at,
            expires_at: created_at + ttl,
        })
    }

    /// Vectors from another model are not comparable with the stored index,
    /// even when the dimensions agree.
    pub fn ensure_embedding_model(&self, model: &str) -> Result<(), ApiError> {
        if self.embedding_model == model {
            return Ok(());
        }
        Err(ApiError::BadRequest(format!(
            "session {} was indexed with '{}' but the current embedder is '{}'",
            self.id, self.embedding_model, model
        )))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            embedding_model: self.embedding_model.clone(),
            documents: self.documents.clone(),
            chunk_count: self.index.len(),
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// Client-facing view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub embedding_model: String,
    pub documents: Vec<String>,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Stores a new session. An id that already exists is a `Conflict`.
    async fn insert(&self, record: SessionRecord) -> Result<(), ApiError>;

    /// Live session by id. Expired sessions are never returned.
    async fn get(&self, id: &str) -> Result<Option<SessionRecord>, ApiError>;

    /// Adds a document's chunks to a live session and returns the updated
    /// record. The session keeps its original expiry.
    async fn append(
        &self,
        id: &str,
        document: String,
        chunks: Vec<String>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<SessionRecord, ApiError>;

    /// Returns whether a session was removed.
    async fn remove(&self, id: &str) -> Result<bool, ApiError>;

    /// Drops expired sessions and returns how many were dropped.
    async fn purge_expired(&self) -> Result<usize, ApiError>;

    /// Number of live sessions.
    async fn count(&self) -> Result<usize, ApiError>;
}

pub async fn build_session_store(
    settings: &SessionSettings,
    paths: &AppPaths,
) -> Result<Arc<dyn SessionStore>, ApiError> {
    match settings.backend {
        SessionBackend::Memory => Ok(Arc::new(MemorySessionStore::new())),
        SessionBackend::Sqlite => Ok(Arc::new(
            SqliteSessionStore::with_path(paths.sessions_db_path.clone()).await?,
        )),
    }
}

/// Periodically purges expired sessions until the runtime shuts down.
pub fn spawn_expiry_sweeper(store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Purged expired sessions"),
                Err(err) => tracing::warn!("Failed to purge expired sessions: {}", err),
            }
        }
    })
}

/// Copy of `index` with the batch appended; `index` itself is untouched.
pub(crate) fn extended_index(
    index: &VectorIndex,
    chunks: Vec<String>,
    embeddings: Vec<Vec<f32>>,
) -> Result<VectorIndex, ApiError> {
    let mut next = index.clone();
    next.add(chunks, embeddings)?;
    Ok(next)
}
