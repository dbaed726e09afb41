//! The document-chat pipeline.
//!
//! - `IngestionAgent`: parse, chunk and embed uploads
//! - `RetrievalAgent`: rewrite, vector search and re-rank
//! - `LlmResponseAgent`: answer generation and justification
//! - `Coordinator`: runs the agents for each user-visible operation

pub mod coordinator;
pub mod ingestion;
pub mod response;
pub mod retrieval;

pub use coordinator::{Coordinator, DocumentAppended, QueryAnswer, SessionStarted, Traced};
pub use ingestion::{IngestionAgent, ParsedDocument, UploadedFile};
pub use response::{Answer, LlmResponseAgent};
pub use retrieval::{Retrieval, RetrievalAgent};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::core::config::RetrievalSettings;
    use crate::core::errors::ApiError;
    use crate::llm::{ChatRequest, LlmProvider};
    use crate::rag::{
        EmbeddingProvider, HashingEmbedder, LexicalCrossEncoder, SplitterConfig, TextSplitter,
        VectorIndex,
    };
    use crate::session::{MemorySessionStore, SessionRecord, SessionStore};

    enum Script {
        /// The same reply to every prompt
        Fixed(String),
        /// Snippet prompts get the source sentence containing the answer;
        /// rewrite prompts echo the follow-up; anything else gets the
        /// configured answer
        Keyword,
        Failing,
    }

    pub struct ScriptedLlm {
        script: Script,
        answer: Mutex<String>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl Default for ScriptedLlm {
        fn default() -> Self {
            Self::with_script(Script::Fixed(String::new()))
        }
    }

    impl ScriptedLlm {
        fn with_script(script: Script) -> Self {
            Self {
                script,
                answer: Mutex::new(String::new()),
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn replying(reply: &str) -> Self {
            Self::with_script(Script::Fixed(reply.to_string()))
        }

        pub fn keyword_snippets() -> Self {
            Self::with_script(Script::Keyword)
        }

        pub fn failing() -> Self {
            Self::with_script(Script::Failing)
        }

        pub fn set_answer(&self, answer: &str) {
            *self.answer.lock().unwrap() = answer.to_string();
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last_prompt(&self) -> Option<String> {
            self.prompts.lock().unwrap().last().cloned()
        }

        fn keyword_reply(&self, prompt: &str) -> String {
            if let (Some(answer), Some(source)) = (
                between(prompt, "Answer:\n\"", "\"\n\nSource Text:"),
                between(prompt, "Source Text:\n\"", "\"\n\nMost Relevant Sentence:"),
            ) {
                let needle = answer.to_lowercase();
                return source
                    .split_inclusive(". ")
                    .map(str::trim)
                    .find(|sentence| sentence.to_lowercase().contains(&needle))
                    .unwrap_or("")
                    .to_string();
            }
            if let Some(follow_up) = between(prompt, "Follow Up: ", "\nStandalone Question:") {
                return follow_up.to_string();
            }
            self.answer.lock().unwrap().clone()
        }
    }

    fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
        let from = text.find(start)? + start.len();
        let to = from + text[from..].find(end)?;
        Some(&text[from..to])
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn health_check(&self) -> Result<bool, ApiError> {
            Ok(true)
        }

        async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let prompt = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.prompts.lock().unwrap().push(prompt.clone());

            match &self.script {
                Script::Fixed(reply) => Ok(reply.clone()),
                Script::Keyword => Ok(self.keyword_reply(&prompt)),
                Script::Failing => Err(ApiError::Upstream("503 Service Unavailable".to_string())),
            }
        }
    }

    pub async fn session_with(chunks: &[&str], dimension: usize, ttl: Duration) -> SessionRecord {
        let embedder = HashingEmbedder::new(dimension).unwrap();
        let texts: Vec<String> = chunks.iter().map(|c| c.to_string()).collect();
        let embeddings = embedder.embed(&texts).await.unwrap();
        let mut index = VectorIndex::new();
        index.add(texts, embeddings).unwrap();

        SessionRecord::new(
            "session-test".to_string(),
            embedder.model().to_string(),
            vec!["test.txt".to_string()],
            index,
            ttl,
        )
        .unwrap()
    }

    pub fn coordinator(llm: Arc<ScriptedLlm>, chunk_size: usize, overlap: usize) -> Coordinator {
        coordinator_with(
            llm,
            Arc::new(HashingEmbedder::new(256).unwrap()),
            Arc::new(MemorySessionStore::new()),
            chunk_size,
            overlap,
        )
    }

    pub fn coordinator_with(
        llm: Arc<ScriptedLlm>,
        embedder: Arc<dyn EmbeddingProvider>,
        sessions: Arc<dyn SessionStore>,
        chunk_size: usize,
        overlap: usize,
    ) -> Coordinator {
        let splitter = TextSplitter::new(SplitterConfig::new(chunk_size, overlap)).unwrap();

        Coordinator::new(
            IngestionAgent::new(splitter, embedder.clone()),
            RetrievalAgent::new(
                llm.clone(),
                embedder,
                Arc::new(LexicalCrossEncoder),
                RetrievalSettings::default(),
            ),
            LlmResponseAgent::new(llm),
            sessions,
            Duration::from_secs(60),
        )
    }
}
