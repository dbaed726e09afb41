use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::Instrument;

use super::upload::read_upload_form;
use crate::a2a::{new_trace_id, Envelope, MessageType};
use crate::core::errors::{ApiError, PipelineError, Stage, StageContext};
use crate::llm::ChatMessage;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub session_id: String,
    pub user_query: String,
    #[serde(default)]
    pub chat_history: Option<Vec<ChatMessage>>,
}

/// Multipart upload of one or more documents, optionally with a first question.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, PipelineError> {
    let form = read_upload_form(multipart).await?;

    let started = state
        .coordinator
        .start_session(form.files, form.user_query)
        .await?;
    Ok(Json(Envelope::to_frontend(
        MessageType::SessionStarted,
        started.trace_id,
        started.value,
    )))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, PipelineError> {
    let trace_id = new_trace_id();
    let span = tracing::info_span!("get_session", trace_id = %trace_id, session_id = %session_id);

    let summary = async {
        let found = state.sessions.get(&session_id).await;
        found.and_then(|record| match record {
            Some(record) => Ok(record.summary()),
            None => {
                tracing::warn!("Session not found or expired");
                Err(ApiError::SessionNotFound(session_id.clone()))
            }
        })
    }
    .instrument(span)
    .await
    .stage(Stage::Session, &trace_id)?;

    Ok(Json(Envelope::to_frontend(
        MessageType::SessionSummary,
        trace_id,
        summary,
    )))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, PipelineError> {
    let trace_id = new_trace_id();
    let span = tracing::info_span!("delete_session", trace_id = %trace_id, session_id = %session_id);

    let deleted = async {
        let deleted = state.sessions.remove(&session_id).await;
        if let Ok(true) = deleted {
            tracing::info!("Session deleted");
        }
        deleted
    }
    .instrument(span)
    .await
    .stage(Stage::Session, &trace_id)?;

    Ok(Json(Envelope::to_frontend(
        MessageType::SessionDeleted,
        trace_id,
        json!({ "session_id": session_id, "deleted": deleted }),
    )))
}

/// Adds one more document to a live session.
pub async fn append_document(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, PipelineError> {
    let mut form = read_upload_form(multipart).await?;
    if form.files.len() != 1 {
        let trace_id = new_trace_id();
        tracing::warn!(
            trace_id = %trace_id,
            session_id = %session_id,
            files = form.files.len(),
            "Append needs exactly one file"
        );
        return Err(ApiError::BadRequest(format!(
            "expected exactly one file, got {}",
            form.files.len()
        )))
        .stage(Stage::Ingestion, &trace_id);
    }
    let file = form.files.remove(0);

    let appended = state.coordinator.append_document(&session_id, file).await?;
    Ok(Json(Envelope::to_frontend(
        MessageType::DocumentAppended,
        appended.trace_id,
        appended.value,
    )))
}

pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> Result<impl IntoResponse, PipelineError> {
    let history = payload.chat_history.unwrap_or_default();
    let answered = state
        .coordinator
        .query(&payload.session_id, &payload.user_query, &history)
        .await?;
    Ok(Json(Envelope::to_frontend(
        MessageType::FinalAnswer,
        answered.trace_id,
        answered.value,
    )))
}
