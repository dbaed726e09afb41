use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for any `/chat/completions` endpoint in the OpenAI wire format
/// (Groq, OpenAI, LM Studio, llama.cpp server, ...).
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(settings: &LlmSettings) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone().filter(|key| !key.trim().is_empty()),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            client,
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn request_body(&self, request: ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature.or(self.temperature) {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens.or(self.max_tokens) {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }

        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/models", self.base_url);
        let res = self
            .authorized(self.client.get(&url))
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await;
        match res {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(request);

        let res = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "chat completion returned {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;
        extract_message_content(&payload)
    }
}

fn extract_message_content(payload: &Value) -> Result<String, ApiError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            ApiError::Upstream("chat completion response has no message content".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    fn settings() -> LlmSettings {
        LlmSettings {
            base_url: "https://api.example.com/v1/".to_string(),
            model: "llama3-70b-8192".to_string(),
            api_key: Some("key".to_string()),
            temperature: Some(0.7),
            max_tokens: None,
            timeout_secs: 5,
        }
    }

    #[test]
    fn body_carries_model_and_defaults() {
        let provider = OpenAiCompatProvider::new(&settings()).unwrap();
        let body = provider.request_body(ChatRequest::new(vec![ChatMessage::user("hi")]));

        assert_eq!(provider.base_url, "https://api.example.com/v1");
        assert_eq!(body["model"], "llama3-70b-8192");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["temperature"], 0.7);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn request_overrides_configured_temperature() {
        let provider = OpenAiCompatProvider::new(&settings()).unwrap();
        let mut request = ChatRequest::prompt("hi");
        request.temperature = Some(0.0);

        let body = provider.request_body(request);
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn content_extraction_rejects_malformed_payloads() {
        let ok = json!({"choices": [{"message": {"role": "assistant", "content": "42"}}]});
        assert_eq!(extract_message_content(&ok).unwrap(), "42");

        let bad = json!({"error": {"message": "rate limited"}});
        assert!(matches!(
            extract_message_content(&bad),
            Err(ApiError::Upstream(_))
        ));
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_completion() {
        let mut settings = settings();
        settings.base_url = "https://api.groq.com/openai/v1".to_string();
        settings.api_key = std::env::var("GROQ_API_KEY").ok();

        let provider = OpenAiCompatProvider::new(&settings).unwrap();
        match provider.complete("Say hello in one word.").await {
            Ok(response) => println!("Completion: {}", response),
            Err(e) => panic!("Completion failed: {}", e),
        }
    }
}
