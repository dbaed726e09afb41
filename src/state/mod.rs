use std::sync::Arc;
use std::time::Duration;

use crate::agents::{Coordinator, IngestionAgent, LlmResponseAgent, RetrievalAgent};
use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::llm::{LlmProvider, OpenAiCompatProvider};
use crate::rag::{build_embedder, build_reranker, CrossEncoder, EmbeddingProvider, TextSplitter};
use crate::session::{build_session_store, SessionStore};

pub mod error;

use error::InitializationError;

/// Shared application state for all routes and background tasks.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Settings,
    pub llm: Arc<dyn LlmProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub sessions: Arc<dyn SessionStore>,
    pub coordinator: Arc<Coordinator>,
}

/// External collaborators the pipeline is wired with.
pub struct Collaborators {
    pub llm: Arc<dyn LlmProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub reranker: Arc<dyn CrossEncoder>,
    pub sessions: Arc<dyn SessionStore>,
}

impl AppState {
    /// Loads configuration from disk and builds every collaborator from it.
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let config = ConfigService::new(paths.clone());
        let settings = config
            .settings()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let llm = Arc::new(
            OpenAiCompatProvider::new(&settings.llm)
                .map_err(|e| InitializationError::Llm(e.into()))?,
        );
        let embedder = build_embedder(&settings.embedding)
            .map_err(|e| InitializationError::Embedding(e.into()))?;
        let reranker = build_reranker(&settings.reranker)
            .map_err(|e| InitializationError::Reranker(e.into()))?;
        let sessions = build_session_store(&settings.session, &paths)
            .await
            .map_err(|e| InitializationError::Sessions(e.into()))?;

        Self::from_parts(
            paths,
            config,
            settings,
            Collaborators {
                llm,
                embedder,
                reranker,
                sessions,
            },
        )
    }

    pub fn from_parts(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: Settings,
        collaborators: Collaborators,
    ) -> Result<Arc<Self>, InitializationError> {
        let Collaborators {
            llm,
            embedder,
            reranker,
            sessions,
        } = collaborators;

        let splitter = TextSplitter::new((&settings.chunking).into())
            .map_err(|e| InitializationError::Chunking(e.into()))?;

        let coordinator = Coordinator::new(
            IngestionAgent::new(splitter, embedder.clone()),
            RetrievalAgent::new(
                llm.clone(),
                embedder.clone(),
                reranker,
                settings.retrieval.clone(),
            ),
            LlmResponseAgent::new(llm.clone()),
            sessions.clone(),
            Duration::from_secs(settings.session.ttl_secs),
        );

        Ok(Arc::new(AppState {
            paths,
            config,
            settings,
            llm,
            embedder,
            sessions,
            coordinator: Arc::new(coordinator),
        }))
    }
}
