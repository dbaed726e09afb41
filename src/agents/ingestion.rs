use std::sync::Arc;

use serde::Serialize;

use crate::core::errors::ApiError;
use crate::documents::parse_document;
use crate::rag::{EmbeddingProvider, TextSplitter};

/// A file received from the client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsedDocument {
    pub filename: String,
    pub chunks: Vec<String>,
}

/// Turns uploaded files into chunks and chunk embeddings.
pub struct IngestionAgent {
    splitter: TextSplitter,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl IngestionAgent {
    pub fn new(splitter: TextSplitter, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { splitter, embedder }
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model()
    }

    /// Extracts and chunks one file. A file without any text is an
    /// `EmptyDocument` error.
    pub async fn parse(&self, file: UploadedFile) -> Result<ParsedDocument, ApiError> {
        let UploadedFile { filename, bytes } = file;

        let name = filename.clone();
        let text = tokio::task::spawn_blocking(move || parse_document(&name, &bytes))
            .await
            .map_err(ApiError::internal)??;

        if text.trim().is_empty() {
            return Err(ApiError::EmptyDocument(filename));
        }

        let chunks = self.splitter.split(&text);
        if chunks.is_empty() {
            return Err(ApiError::EmptyDocument(filename));
        }

        tracing::info!(
            filename = %filename,
            characters = text.chars().count(),
            chunks = chunks.len(),
            "Parsed document"
        );
        Ok(ParsedDocument { filename, chunks })
    }

    pub async fn embed(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let embeddings = self.embedder.embed(chunks).await?;
        if embeddings.len() != chunks.len() {
            return Err(ApiError::Upstream(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }
        tracing::debug!(chunks = chunks.len(), model = self.embedder.model(), "Embedded chunks");
        Ok(embeddings)
    }
}
