//! Typed view over the merged YAML configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub reranker: RerankerSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub session: SessionSettings,
    pub upload: UploadSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama3-70b-8192".to_string(),
            api_key: None,
            temperature: Some(0.7),
            max_tokens: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// `/embeddings` endpoint in the OpenAI wire format
    Openai,
    /// Offline feature-hashing embedder
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingBackend,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Vector width of the hashing embedder
    pub dimension: usize,
    /// Maximum inputs per embedding request
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Hashing,
            base_url: "http://127.0.0.1:8090/v1".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            api_key: None,
            dimension: 384,
            batch_size: 64,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankerBackend {
    /// `/rerank` endpoint serving a cross-encoder
    Http,
    /// Query-term overlap scoring
    Lexical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerSettings {
    pub provider: RerankerBackend,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            provider: RerankerBackend::Lexical,
            base_url: "http://127.0.0.1:8091/v1".to_string(),
            model: "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Nearest neighbours fetched from the index before re-ranking
    pub candidate_k: usize,
    /// Chunks kept after re-ranking
    pub top_n: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            candidate_k: 10,
            top_n: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub backend: SessionBackend,
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Memory,
            ttl_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub max_bytes: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_bytes: 20 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_config_yields_defaults() {
        let settings: Settings = serde_json::from_value(json!({})).unwrap();

        assert_eq!(settings.chunking.chunk_size, 500);
        assert_eq!(settings.retrieval.candidate_k, 10);
        assert_eq!(settings.retrieval.top_n, 3);
        assert_eq!(settings.session.ttl_secs, 3600);
        assert_eq!(settings.session.backend, SessionBackend::Memory);
        assert_eq!(settings.llm.model, "llama3-70b-8192");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let settings: Settings = serde_json::from_value(json!({
            "chunking": { "chunk_size": 300 },
            "embedding": { "provider": "openai", "model": "text-embedding-3-small" },
            "session": { "backend": "sqlite" }
        }))
        .unwrap();

        assert_eq!(settings.chunking.chunk_size, 300);
        assert_eq!(settings.chunking.chunk_overlap, 100);
        assert_eq!(settings.embedding.provider, EmbeddingBackend::Openai);
        assert_eq!(settings.embedding.batch_size, 64);
        assert_eq!(settings.session.backend, SessionBackend::Sqlite);
    }
}
