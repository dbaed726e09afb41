use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;

use crate::core::errors::{ApiError, PipelineError, Stage, StageContext};
use crate::llm::LlmProvider;
use crate::rag::prompts;

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    /// One supporting sentence per context chunk, in chunk order
    pub source_context: Vec<String>,
}

/// Generates the answer and its per-chunk justification.
pub struct LlmResponseAgent {
    llm: Arc<dyn LlmProvider>,
}

impl LlmResponseAgent {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn answer(&self, query: &str, chunks: &[String]) -> Result<String, ApiError> {
        let prompt = prompts::answer(query, chunks);
        let answer = self.llm.complete(&prompt).await?;
        Ok(answer.trim().to_string())
    }

    /// Extracts the sentence of each chunk that best supports `answer`.
    ///
    /// All calls run concurrently. A failed or empty call yields the chunk
    /// itself, so the result always has one entry per chunk.
    pub async fn justify(&self, answer: &str, chunks: &[String]) -> Vec<String> {
        let calls = chunks.iter().enumerate().map(|(slot, chunk)| async move {
            let prompt = prompts::supporting_snippet(answer, chunk);
            match self.llm.complete(&prompt).await {
                Ok(snippet) => {
                    let snippet = clean_snippet(&snippet);
                    if snippet.is_empty() {
                        chunk.clone()
                    } else {
                        snippet
                    }
                }
                Err(err) => {
                    tracing::warn!(slot, "Snippet extraction failed, using the chunk: {}", err);
                    chunk.clone()
                }
            }
        });
        join_all(calls).await
    }

    /// Answer followed by justification.
    pub async fn respond(
        &self,
        trace_id: &str,
        query: &str,
        chunks: &[String],
    ) -> Result<Answer, PipelineError> {
        let answer = self
            .answer(query, chunks)
            .await
            .stage(Stage::Generation, trace_id)?;
        tracing::info!(characters = answer.chars().count(), "Generated answer");

        let source_context = self.justify(&answer, chunks).await;
        tracing::info!(snippets = source_context.len(), "Justified answer");

        Ok(Answer {
            answer,
            source_context,
        })
    }
}

/// Trims whitespace and one pair of surrounding quotes.
fn clean_snippet(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}
