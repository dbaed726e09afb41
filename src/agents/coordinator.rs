//! Orchestrates ingestion, retrieval and answering for one operation.
//!
//! Every public operation generates a trace id and runs inside a span that
//! carries it, so all log lines of the operation can be correlated.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Instrument;

use super::ingestion::{IngestionAgent, ParsedDocument, UploadedFile};
use super::response::{Answer, LlmResponseAgent};
use super::retrieval::{Retrieval, RetrievalAgent};
use crate::a2a::{new_session_id, new_trace_id};
use crate::core::errors::{ApiError, PipelineError, Stage, StageContext};
use crate::llm::ChatMessage;
use crate::rag::VectorIndex;
use crate::session::{SessionRecord, SessionStore};

#[derive(Debug, Clone, Serialize)]
pub struct SessionStarted {
    pub session_id: String,
    pub file_names: Vec<String>,
    pub chunks_processed: usize,
    pub expires_at: DateTime<Utc>,
    /// Answer to the question sent along with the upload, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<QueryAnswer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentAppended {
    pub session_id: String,
    pub file_name: String,
    pub chunks_processed: usize,
    pub total_chunks: usize,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub source_context: Vec<String>,
    pub standalone_query: String,
}

/// Result of an operation together with its trace id.
#[derive(Debug, Clone)]
pub struct Traced<T> {
    pub trace_id: String,
    pub value: T,
}

pub struct Coordinator {
    ingestion: IngestionAgent,
    retrieval: RetrievalAgent,
    responder: LlmResponseAgent,
    sessions: Arc<dyn SessionStore>,
    session_ttl: Duration,
}

impl Coordinator {
    pub fn new(
        ingestion: IngestionAgent,
        retrieval: RetrievalAgent,
        responder: LlmResponseAgent,
        sessions: Arc<dyn SessionStore>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            ingestion,
            retrieval,
            responder,
            sessions,
            session_ttl,
        }
    }

    /// Ingests every file into a new session. With `initial_query`, also
    /// answers it against the new session.
    pub async fn start_session(
        &self,
        files: Vec<UploadedFile>,
        initial_query: Option<String>,
    ) -> Result<Traced<SessionStarted>, PipelineError> {
        let trace_id = new_trace_id();
        let session_id = new_session_id();
        let span = tracing::info_span!("start_session", trace_id = %trace_id, session_id = %session_id);

        let value = self
            .start_session_inner(&trace_id, session_id, files, initial_query)
            .instrument(span)
            .await?;
        Ok(Traced { trace_id, value })
    }

    async fn start_session_inner(
        &self,
        trace_id: &str,
        session_id: String,
        files: Vec<UploadedFile>,
        initial_query: Option<String>,
    ) -> Result<SessionStarted, PipelineError> {
        if files.is_empty() {
            return Err(ApiError::BadRequest("no files were uploaded".to_string()))
                .stage(Stage::Ingestion, trace_id);
        }
        tracing::info!(files = files.len(), "Starting session");

        let mut file_names = Vec::with_capacity(files.len());
        let mut chunks = Vec::new();
        for file in files {
            let parsed = self.parse(trace_id, file).await?;
            file_names.push(parsed.filename);
            chunks.extend(parsed.chunks);
        }

        let embeddings = self
            .ingestion
            .embed(&chunks)
            .await
            .stage(Stage::Ingestion, trace_id)?;
        let chunks_processed = chunks.len();
        let mut index = VectorIndex::new();
        index
            .add(chunks, embeddings)
            .stage(Stage::Ingestion, trace_id)?;

        let record = SessionRecord::new(
            session_id.clone(),
            self.ingestion.embedding_model().to_string(),
            file_names.clone(),
            index,
            self.session_ttl,
        )
        .stage(Stage::Session, trace_id)?;
        let expires_at = record.expires_at;
        self.sessions
            .insert(record.clone())
            .await
            .stage(Stage::Session, trace_id)?;
        tracing::info!(chunks = chunks_processed, %expires_at, "Session created");

        let answer = match initial_query.filter(|q| !q.trim().is_empty()) {
            Some(query) => Some(self.answer(trace_id, &record, &query, &[]).await?),
            None => None,
        };

        Ok(SessionStarted {
            session_id,
            file_names,
            chunks_processed,
            expires_at,
            answer,
        })
    }

    pub async fn append_document(
        &self,
        session_id: &str,
        file: UploadedFile,
    ) -> Result<Traced<DocumentAppended>, PipelineError> {
        let trace_id = new_trace_id();
        let span = tracing::info_span!("append_document", trace_id = %trace_id, session_id = %session_id);

        let value = async {
            let record = self.require_session(&trace_id, session_id).await?;
            record
                .ensure_embedding_model(self.ingestion.embedding_model())
                .stage(Stage::Ingestion, &trace_id)?;

            let parsed = self.parse(&trace_id, file).await?;
            let embeddings = self
                .ingestion
                .embed(&parsed.chunks)
                .await
                .stage(Stage::Ingestion, &trace_id)?;
            let chunks_processed = parsed.chunks.len();

            let record = self
                .sessions
                .append(session_id, parsed.filename.clone(), parsed.chunks, embeddings)
                .await
                .stage(Stage::Session, &trace_id)?;
            tracing::info!(
                chunks = chunks_processed,
                total = record.index.len(),
                "Document appended"
            );

            Ok::<_, PipelineError>(DocumentAppended {
                session_id: record.id,
                file_name: parsed.filename,
                chunks_processed,
                total_chunks: record.index.len(),
                expires_at: record.expires_at,
            })
        }
        .instrument(span)
        .await?;

        Ok(Traced { trace_id, value })
    }

    /// Answers a question against an existing session.
    pub async fn query(
        &self,
        session_id: &str,
        query: &str,
        history: &[ChatMessage],
    ) -> Result<Traced<QueryAnswer>, PipelineError> {
        let trace_id = new_trace_id();
        let span = tracing::info_span!("query", trace_id = %trace_id, session_id = %session_id);

        let value = async {
            let record = self.require_session(&trace_id, session_id).await?;
            self.answer(&trace_id, &record, query, history).await
        }
        .instrument(span)
        .await?;

        Ok(Traced { trace_id, value })
    }

    /// Retrieval only, without generation.
    pub async fn retrieve(
        &self,
        session_id: &str,
        query: &str,
        history: &[ChatMessage],
    ) -> Result<Traced<Retrieval>, PipelineError> {
        let trace_id = new_trace_id();
        let span = tracing::info_span!("retrieve", trace_id = %trace_id, session_id = %session_id);

        let value = async {
            let record = self.require_session(&trace_id, session_id).await?;
            self.retrieval
                .retrieve(&trace_id, &record, query, history)
                .await
        }
        .instrument(span)
        .await?;

        Ok(Traced { trace_id, value })
    }

    /// Parses files without creating a session.
    pub async fn parse_only(
        &self,
        files: Vec<UploadedFile>,
    ) -> Result<Traced<Vec<ParsedDocument>>, PipelineError> {
        let trace_id = new_trace_id();
        let span = tracing::info_span!("parse", trace_id = %trace_id);

        let value = async {
            let mut parsed = Vec::with_capacity(files.len());
            for file in files {
                parsed.push(self.parse(&trace_id, file).await?);
            }
            Ok::<_, PipelineError>(parsed)
        }
        .instrument(span)
        .await?;

        Ok(Traced { trace_id, value })
    }

    /// Answer and justification for caller-supplied context. Continues the
    /// caller's trace when one is given.
    pub async fn respond(
        &self,
        trace_id: Option<String>,
        query: &str,
        chunks: &[String],
    ) -> Result<Traced<Answer>, PipelineError> {
        let trace_id = trace_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(new_trace_id);
        let span = tracing::info_span!("respond", trace_id = %trace_id);

        let value = async {
            if chunks.is_empty() {
                return Err(ApiError::NoContext).stage(Stage::Generation, &trace_id);
            }
            self.responder.respond(&trace_id, query, chunks).await
        }
        .instrument(span)
        .await?;

        Ok(Traced { trace_id, value })
    }

    async fn parse(&self, trace_id: &str, file: UploadedFile) -> Result<ParsedDocument, PipelineError> {
        let filename = file.filename.clone();
        let parsed = self.ingestion.parse(file).await;
        if let Err(err) = &parsed {
            tracing::warn!(filename = %filename, "Ingestion failed: {}", err);
        }
        parsed.stage(Stage::Ingestion, trace_id)
    }

    async fn require_session(
        &self,
        trace_id: &str,
        session_id: &str,
    ) -> Result<SessionRecord, PipelineError> {
        let record = self
            .sessions
            .get(session_id)
            .await
            .stage(Stage::Session, trace_id)?;
        match record {
            Some(record) => Ok(record),
            None => {
                tracing::warn!("Session not found or expired");
                Err(ApiError::SessionNotFound(session_id.to_string())).stage(Stage::Session, trace_id)
            }
        }
    }

    async fn answer(
        &self,
        trace_id: &str,
        record: &SessionRecord,
        query: &str,
        history: &[ChatMessage],
    ) -> Result<QueryAnswer, PipelineError> {
        let retrieval = self.retrieval.retrieve(trace_id, record, query, history).await?;
        let context = retrieval.texts();

        // The answer is phrased against the user's own wording.
        let answer = self.responder.respond(trace_id, query, &context).await?;

        Ok(QueryAnswer {
            answer: answer.answer,
            source_context: answer.source_context,
            standalone_query: retrieval.standalone_query,
        })
    }
}
