use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, LlmProvider};

use super::prompts;

/// Rewrites a follow-up question into a standalone one.
///
/// Without history the query is returned as is and the model is not called.
pub async fn rewrite_query(
    llm: &dyn LlmProvider,
    query: &str,
    history: &[ChatMessage],
) -> Result<String, ApiError> {
    if history.is_empty() {
        return Ok(query.to_string());
    }

    let prompt = prompts::standalone_question(query, history);
    let rewritten = llm.complete(&prompt).await?;
    Ok(rewritten.trim().to_string())
}
