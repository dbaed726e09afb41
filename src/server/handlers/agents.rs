//! Direct access to the individual pipeline agents.

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::upload::read_upload_form;
use crate::a2a::{Agent, Envelope, MessageType};
use crate::core::errors::PipelineError;
use crate::llm::ChatMessage;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub session_id: String,
    #[serde(alias = "query")]
    pub user_query: String,
    #[serde(default)]
    pub chat_history: Option<Vec<ChatMessage>>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub query: String,
    pub top_chunks: Vec<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
}

pub async fn parse(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, PipelineError> {
    let form = read_upload_form(multipart).await?;

    let parsed = state.coordinator.parse_only(form.files).await?;
    let chunks = parsed
        .value
        .iter()
        .flat_map(|doc| doc.chunks.iter().cloned())
        .collect::<Vec<_>>();

    Ok(Json(Envelope::to_coordinator(
        MessageType::ParsedChunks,
        Agent::Ingestion,
        parsed.trace_id,
        json!({
            "chunks": chunks,
            "documents": parsed.value,
        }),
    )))
}

pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RetrieveRequest>,
) -> Result<impl IntoResponse, PipelineError> {
    let history = payload.chat_history.unwrap_or_default();
    let retrieved = state
        .coordinator
        .retrieve(&payload.session_id, &payload.user_query, &history)
        .await?;

    Ok(Json(Envelope::to_coordinator(
        MessageType::RetrievalResult,
        Agent::Retrieval,
        retrieved.trace_id,
        json!({
            "retrieved_context": retrieved.value.texts(),
            "scores": retrieved.value.chunks,
            "query": retrieved.value.standalone_query,
        }),
    )))
}

pub async fn respond(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RespondRequest>,
) -> Result<impl IntoResponse, PipelineError> {
    let answered = state
        .coordinator
        .respond(payload.trace_id, &payload.query, &payload.top_chunks)
        .await?;

    Ok(Json(Envelope::to_coordinator(
        MessageType::FinalAnswer,
        Agent::LlmResponse,
        answered.trace_id,
        answered.value,
    )))
}
