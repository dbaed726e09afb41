use std::sync::Arc;

use serde::Serialize;

use crate::core::config::RetrievalSettings;
use crate::core::errors::{ApiError, PipelineError, Stage, StageContext};
use crate::llm::{ChatMessage, LlmProvider};
use crate::rag::{rewrite_query, select_top, CrossEncoder, EmbeddingProvider, RankedChunk};
use crate::session::SessionRecord;

#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub standalone_query: String,
    pub chunks: Vec<RankedChunk>,
}

impl Retrieval {
    pub fn texts(&self) -> Vec<String> {
        self.chunks.iter().map(|chunk| chunk.text.clone()).collect()
    }
}

/// Rewrites the question, searches the session index and re-ranks.
pub struct RetrievalAgent {
    llm: Arc<dyn LlmProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Arc<dyn CrossEncoder>,
    settings: RetrievalSettings,
}

impl RetrievalAgent {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Arc<dyn CrossEncoder>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            llm,
            embedder,
            reranker,
            settings,
        }
    }

    pub async fn retrieve(
        &self,
        trace_id: &str,
        session: &SessionRecord,
        query: &str,
        history: &[ChatMessage],
    ) -> Result<Retrieval, PipelineError> {
        session
            .ensure_embedding_model(self.embedder.model())
            .stage(Stage::Search, trace_id)?;

        let standalone_query = rewrite_query(self.llm.as_ref(), query, history)
            .await
            .stage(Stage::Rewrite, trace_id)?;
        tracing::info!(original = %query, standalone = %standalone_query, "Rewrote query");

        let query_vector = self
            .embedder
            .embed(std::slice::from_ref(&standalone_query))
            .await
            .and_then(|mut vectors| {
                vectors
                    .pop()
                    .ok_or_else(|| ApiError::Upstream("embedder returned no vector".to_string()))
            })
            .stage(Stage::Search, trace_id)?;

        let hits = session
            .index
            .search(&query_vector, self.settings.candidate_k)
            .stage(Stage::Search, trace_id)?;
        if hits.is_empty() {
            return Err(ApiError::NoContext).stage(Stage::Search, trace_id);
        }
        tracing::info!(candidates = hits.len(), "Vector search complete");

        let candidates: Vec<String> = hits.iter().map(|hit| hit.text.clone()).collect();
        let scores = self
            .reranker
            .score(&standalone_query, &candidates)
            .await
            .stage(Stage::Rerank, trace_id)?;
        let chunks =
            select_top(hits, scores, self.settings.top_n).stage(Stage::Rerank, trace_id)?;
        tracing::info!(
            kept = chunks.len(),
            reranker = self.reranker.name(),
            "Re-ranked candidates"
        );

        Ok(Retrieval {
            standalone_query,
            chunks,
        })
    }
}
