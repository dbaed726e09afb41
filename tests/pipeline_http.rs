use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use docchat_backend::core::config::{AppPaths, ChunkingSettings, ConfigService, Settings};
use docchat_backend::core::errors::ApiError;
use docchat_backend::llm::{ChatRequest, LlmProvider};
use docchat_backend::rag::{HashingEmbedder, LexicalCrossEncoder};
use docchat_backend::server::router::router;
use docchat_backend::session::MemorySessionStore;
use docchat_backend::state::{AppState, Collaborators};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tempfile::TempDir;

const HARBOUR: &str = "Harbour Point sits at the northern tip of the island. \
Fishing boats have sheltered in its bay for three centuries. \
The village has a single bakery and a post office.\n\n\
The lighthouse keeper lit a copper beacon every night. \
The beacon could be seen eleven miles out to sea. \
Storms in 1894 cracked the lantern glass twice.\n\n\
Tourists arrive in summer on the morning ferry. \
Most visitors walk the cliff path to the old chapel. \
The ferry does not run between November and March.";

/// Answers every question with a fixed phrase and picks supporting
/// sentences by substring match.
struct KeywordLlm {
    answer: String,
}

#[async_trait]
impl LlmProvider for KeywordLlm {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        Ok(true)
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if let Some(source) = between(&prompt, "Source Text:\n\"", "\"\n\nMost Relevant Sentence:") {
            let needle = self.answer.to_lowercase();
            let sentence = source
                .split_inclusive(". ")
                .map(str::trim)
                .find(|s| s.to_lowercase().contains(&needle))
                .unwrap_or("");
            return Ok(sentence.to_string());
        }
        if let Some(follow_up) = between(&prompt, "Follow Up: ", "\nStandalone Question:") {
            return Ok(follow_up.to_string());
        }
        Ok(self.answer.clone())
    }
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let to = from + text[from..].find(end)?;
    Some(&text[from..to])
}

struct TestServer {
    addr: SocketAddr,
    client: reqwest::Client,
    _data: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let data = tempfile::tempdir().unwrap();
        let paths = Arc::new(AppPaths::with_data_dir(
            data.path().to_path_buf(),
            data.path().join("data"),
        ));
        let config = ConfigService::new(paths.clone());
        let mut settings = Settings::default();
        settings.chunking = ChunkingSettings {
            chunk_size: 200,
            chunk_overlap: 20,
        };

        let state = AppState::from_parts(
            paths,
            config,
            settings,
            Collaborators {
                llm: Arc::new(KeywordLlm {
                    answer: "a copper beacon".to_string(),
                }),
                embedder: Arc::new(HashingEmbedder::new(256).unwrap()),
                reranker: Arc::new(LexicalCrossEncoder),
                sessions: Arc::new(MemorySessionStore::new()),
            },
        )
        .unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: reqwest::Client::new(),
            _data: data,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn upload(&self, filename: &str, text: &str) -> Value {
        let part = Part::bytes(text.as_bytes().to_vec()).file_name(filename.to_string());
        let form = Form::new().part("file", part);
        let response = self
            .client
            .post(self.url("/api/sessions"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        response.json().await.unwrap()
    }
}

#[tokio::test]
async fn upload_then_query_returns_grounded_answer() {
    let server = TestServer::start().await;

    let started = server.upload("harbour.txt", HARBOUR).await;
    assert_eq!(started["type"], "SESSION_STARTED");
    assert_eq!(started["receiver"], "Frontend");
    let session_id = started["payload"]["session_id"].as_str().unwrap().to_string();
    assert!(session_id.starts_with("session-"));
    assert_eq!(started["payload"]["file_names"], json!(["harbour.txt"]));
    assert!(started["payload"]["chunks_processed"].as_u64().unwrap() >= 3);

    let response = server
        .client
        .post(server.url("/api/query"))
        .json(&json!({
            "session_id": session_id,
            "user_query": "What did the lighthouse keeper light every night?",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["type"], "FINAL_ANSWER");
    assert!(body["trace_id"].as_str().unwrap().starts_with("trace-"));
    assert_eq!(body["payload"]["answer"], "a copper beacon");

    let sources = body["payload"]["source_context"].as_array().unwrap();
    assert!(!sources.is_empty() && sources.len() <= 3);
    assert_eq!(
        sources[0],
        "The lighthouse keeper lit a copper beacon every night."
    );
}

#[tokio::test]
async fn unknown_session_is_reported_with_stage() {
    let server = TestServer::start().await;

    let response = server
        .client
        .post(server.url("/api/query"))
        .json(&json!({
            "session_id": "session-missing",
            "user_query": "Anything?",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "ERROR");
    assert_eq!(body["payload"]["stage"], "session");
    assert!(body["payload"]["error"]
        .as_str()
        .unwrap()
        .contains("session-missing"));
}

#[tokio::test]
async fn deleted_session_can_no_longer_be_read() {
    let server = TestServer::start().await;
    let started = server.upload("harbour.md", HARBOUR).await;
    let session_id = started["payload"]["session_id"].as_str().unwrap();
    let session_url = server.url(&format!("/api/sessions/{}", session_id));

    let summary: Value = server
        .client
        .get(&session_url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["type"], "SESSION_SUMMARY");
    assert_eq!(summary["payload"]["session_id"], session_id);
    assert_eq!(summary["payload"]["embedding_model"], "hashing-256");

    let deleted: Value = server
        .client
        .delete(&session_url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["type"], "SESSION_DELETED");
    assert_eq!(deleted["payload"]["deleted"], true);

    let response = server.client.get(&session_url).send().await.unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "ERROR");
    assert_eq!(body["payload"]["stage"], "session");
    assert!(body["trace_id"].as_str().unwrap().starts_with("trace-"));
}

#[tokio::test]
async fn form_without_files_is_rejected_with_trace() {
    let server = TestServer::start().await;

    let form = Form::new().text("user_query", "Where is the bakery?");
    let response = server
        .client
        .post(server.url("/api/sessions"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "ERROR");
    assert_eq!(body["payload"]["stage"], "ingestion");
    assert!(body["trace_id"].as_str().unwrap().starts_with("trace-"));
}

#[tokio::test]
async fn health_reports_active_collaborators() {
    let server = TestServer::start().await;

    let health: Value = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(health["status"], "ok");
    assert_eq!(health["llm_reachable"], true);
    assert_eq!(health["embedding_model"], "hashing-256");
    assert_eq!(health["session_backend"], "memory");
    assert_eq!(health["live_sessions"], 0);
}

#[tokio::test]
async fn unsupported_upload_is_rejected_at_ingestion() {
    let server = TestServer::start().await;

    let part = Part::bytes(vec![0u8, 1, 2, 3]).file_name("archive.bin");
    let response = server
        .client
        .post(server.url("/api/sessions"))
        .multipart(Form::new().part("file", part))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "ERROR");
    assert_eq!(body["payload"]["stage"], "ingestion");
}

#[tokio::test]
async fn respond_agent_justifies_each_chunk() {
    let server = TestServer::start().await;

    let response = server
        .client
        .post(server.url("/agent/llm/respond"))
        .json(&json!({
            "query": "What was lit?",
            "top_chunks": [
                "Gulls nest on the rocks. The keeper lit a copper beacon at dusk.",
                "Nothing relevant here."
            ],
            "trace_id": "trace-0badc0de",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["sender"], "LLMResponseAgent");
    assert_eq!(body["trace_id"], "trace-0badc0de");
    assert_eq!(
        body["payload"]["source_context"],
        json!([
            "The keeper lit a copper beacon at dusk.",
            "Nothing relevant here."
        ])
    );
}
