use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::config::Settings;
use crate::server::handlers::{agents, config, health, sessions};
use crate::state::AppState;

/// Creates the application router with all routes and middleware.
///
/// - `/`, `/health` and `/api/config` for status
/// - `/api/sessions` and `/api/query` for the document-chat flow
/// - `/agent/...` for calling single pipeline agents directly
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings);
    let body_limit = DefaultBodyLimit::max(state.settings.upload.max_bytes);

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/api/config", get(config::get_config))
        .route("/api/sessions", post(sessions::create_session))
        .route(
            "/api/sessions/:session_id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route(
            "/api/sessions/:session_id/documents",
            post(sessions::append_document),
        )
        .route("/api/query", post(sessions::query))
        .route("/agent/ingestion/parse", post(agents::parse))
        .route("/agent/retrieval/retrieve", post(agents::retrieve))
        .route("/agent/llm/respond", post(agents::respond))
        .with_state(state)
        .layer(body_limit)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let configured = resolve_allowed_origins(&settings.server.cors_allowed_origins);
    let allowed_origins = configured
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

fn resolve_allowed_origins(configured: &[String]) -> Vec<String> {
    let origins = configured
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();

    if origins.is_empty() {
        return default_local_origins();
    }

    origins
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}
