use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::a2a::{Agent, Envelope, MessageType};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("session not found or expired: {0}")]
    SessionNotFound(String),
    #[error("no text could be extracted from {0}")]
    EmptyDocument(String),
    #[error("no relevant context found for the query")]
    NoContext,
    #[error("upstream call failed: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn upstream<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Upstream(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::SessionNotFound(_) | ApiError::NoContext => {
                StatusCode::NOT_FOUND
            }
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::EmptyDocument(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Pipeline step a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingestion,
    Session,
    Rewrite,
    Search,
    Rerank,
    Generation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingestion => "ingestion",
            Stage::Session => "session",
            Stage::Rewrite => "rewrite",
            Stage::Search => "search",
            Stage::Rerank => "rerank",
            Stage::Generation => "generation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal failure of one user-visible operation.
///
/// Carries the trace id and the stage so the error can be matched against
/// the log lines emitted for the same operation.
#[derive(Debug, Error)]
#[error("[{trace_id}] {stage} failed: {error}")]
pub struct PipelineError {
    pub stage: Stage,
    pub trace_id: String,
    #[source]
    pub error: ApiError,
}

impl PipelineError {
    pub fn new(stage: Stage, trace_id: impl Into<String>, error: ApiError) -> Self {
        Self {
            stage,
            trace_id: trace_id.into(),
            error,
        }
    }

    pub fn envelope(&self) -> Envelope<serde_json::Value> {
        Envelope::new(
            MessageType::Error,
            Agent::Coordinator,
            Agent::Frontend,
            self.trace_id.clone(),
            json!({
                "error": self.error.to_string(),
                "stage": self.stage,
            }),
        )
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> axum::response::Response {
        (self.error.status(), Json(self.envelope())).into_response()
    }
}

/// Attaches a stage and trace id to a fallible step.
pub trait StageContext<T> {
    fn stage(self, stage: Stage, trace_id: &str) -> Result<T, PipelineError>;
}

impl<T> StageContext<T> for Result<T, ApiError> {
    fn stage(self, stage: Stage, trace_id: &str) -> Result<T, PipelineError> {
        self.map_err(|error| PipelineError::new(stage, trace_id, error))
    }
}
