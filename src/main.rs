use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use docchat_backend::core::logging;
use docchat_backend::server;
use docchat_backend::session::spawn_expiry_sweeper;
use docchat_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize().await?;
    logging::init(&state.paths);

    let sweep_every = Duration::from_secs(state.settings.session.sweep_interval_secs.max(1));
    let _sweeper = spawn_expiry_sweeper(state.sessions.clone(), sweep_every);

    let bind_addr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    );
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    println!("DOCCHAT_PORT={}", addr.port());
    tracing::info!(
        session_backend = state.sessions.backend(),
        llm = state.llm.name(),
        "Listening on {}",
        addr
    );

    let app: Router = server::router::router(state.clone());
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
