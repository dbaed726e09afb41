use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "Document chat backend is running"
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let live_sessions = state.sessions.count().await?;
    let llm_reachable = state.llm.health_check().await.unwrap_or(false);
    let status = if llm_reachable {
        "ok"
    } else {
        tracing::warn!(llm = state.llm.name(), "LLM health check failed");
        "degraded"
    };
    Ok(Json(json!({
        "status": status,
        "session_backend": state.sessions.backend(),
        "live_sessions": live_sessions,
        "llm_provider": state.llm.name(),
        "llm_reachable": llm_reachable,
        "llm_model": state.settings.llm.model,
        "embedding_model": state.embedder.model(),
    })))
}
