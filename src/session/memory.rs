use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{extended_index, SessionRecord, SessionStore};
use crate::core::errors::ApiError;

/// Process-local session store. Contents are lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, record: SessionRecord) -> Result<(), ApiError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&record.id) {
            return Err(ApiError::Conflict(format!(
                "session {} already exists",
                record.id
            )));
        }
        sessions.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SessionRecord>, ApiError> {
        let sessions = self.sessions.read().await;
        let now = Utc::now();
        Ok(sessions
            .get(id)
            .filter(|record| !record.is_expired_at(now))
            .cloned())
    }

    async fn append(
        &self,
        id: &str,
        document: String,
        chunks: Vec<String>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<SessionRecord, ApiError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(id)
            .filter(|record| !record.is_expired_at(Utc::now()))
            .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))?;

        let next = extended_index(&record.index, chunks, embeddings)?;
        record.index = Arc::new(next);
        record.documents.push(document);
        Ok(record.clone())
    }

    async fn remove(&self, id: &str) -> Result<bool, ApiError> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }

    async fn purge_expired(&self) -> Result<usize, ApiError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let now = Utc::now();
        sessions.retain(|_, record| !record.is_expired_at(now));
        Ok(before - sessions.len())
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let now = Utc::now();
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|record| !record.is_expired_at(now))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::session::test_support::record;

    #[tokio::test]
    async fn insert_get_remove() {
        let store = MemorySessionStore::new();
        store
            .insert(record("session-1", Duration::from_secs(60)))
            .await
            .unwrap();

        let fetched = store.get("session-1").await.unwrap().unwrap();
        assert_eq!(fetched.index.len(), 2);
        assert!(store.get("session-2").await.unwrap().is_none());

        assert!(store.remove("session-1").await.unwrap());
        assert!(!store.remove("session-1").await.unwrap());
        assert!(store.get("session-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = MemorySessionStore::new();
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
    async fn expired_sessions_are_invisible_and_purged() {
        let store = MemorySessionStore::new();
        store
            .insert(record("session-old", Duration::ZERO))
            .await
            .unwrap();

        assert!(store.get("session-old").await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn append_is_copy_on_write() {
        let store = MemorySessionStore::new();
        let original = record("session-1", Duration::from_secs(60));
        let expires_at = original.expires_at;
        store.insert(original).await.unwrap();

        let before = store.get("session-1").await.unwrap().unwrap();
        let after = store
            .append(
                "session-1",
                "b.txt".to_string(),
                vec!["gamma".to_string()],
                vec![vec![9.0, 1.0]],
            )
            .await
            .unwrap();

        assert_eq!(before.index.len(), 2);
        assert_eq!(after.index.len(), 3);
        assert_eq!(after.documents, vec!["a.txt".to_string(), "b.txt".to_string()]);
        assert_eq!(after.expires_at, expires_at);
    }

    #[tokio::test]
    async fn rejected_append_changes_nothing() {
        let store = MemorySessionStore::new();
        store
            .insert(record("session-1", Duration::from_secs(60)))
            .await
            .unwrap();

        let result = store
            .append(
                "session-1",
                "bad.txt".to_string(),
                vec!["x".to_string()],
                vec![vec![1.0, 2.0, 3.0]],
            )
            .await;
        assert!(result.is_err());

        let current = store.get("session-1").await.unwrap().unwrap();
        assert_eq!(current.index.len(), 2);
        assert_eq!(current.documents.len(), 1);

        assert!(matches!(
            store
                .append("session-404", "a".into(), vec!["x".into()], vec![vec![0.0, 0.0]])
                .await,
            Err(ApiError::SessionNotFound(_))
        ));
    }
}
