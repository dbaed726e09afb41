use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Invalid chunking settings: {0}")]
    Chunking(#[source] anyhow::Error),

    #[error("Failed to initialize LLM client: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("Failed to initialize embedding provider: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error("Failed to initialize re-ranker: {0}")]
    Reranker(#[source] anyhow::Error),

    #[error("Failed to initialize session store: {0}")]
    Sessions(#[source] anyhow::Error),
}
