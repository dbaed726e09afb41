//! Cross-encoder re-ranking of vector-search candidates.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::embedding::tokenize;
use super::index::SearchHit;
use crate::core::config::{RerankerBackend, RerankerSettings};
use crate::core::errors::ApiError;

#[async_trait]
pub trait CrossEncoder: Send + Sync {
    fn name(&self) -> &str;

    /// Relevance of each candidate to the query, in candidate order.
    /// Higher is more relevant.
    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>, ApiError>;
}

pub fn build_reranker(settings: &RerankerSettings) -> Result<Arc<dyn CrossEncoder>, ApiError> {
    match settings.provider {
        RerankerBackend::Http => Ok(Arc::new(HttpCrossEncoder::new(settings)?)),
        RerankerBackend::Lexical => Ok(Arc::new(LexicalCrossEncoder)),
    }
}

/// A chunk kept after re-ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedChunk {
    pub text: String,
    pub score: f32,
    /// Insertion ordinal in the session index
    pub position: usize,
}

/// Orders candidates by score, highest first, and keeps `top_n`.
///
/// The sort is stable, so equal scores keep the vector-search order.
pub fn select_top(
    candidates: Vec<SearchHit>,
    scores: Vec<f32>,
    top_n: usize,
) -> Result<Vec<RankedChunk>, ApiError> {
    if candidates.len() != scores.len() {
        return Err(ApiError::Upstream(format!(
            "re-ranker returned {} scores for {} candidates",
            scores.len(),
            candidates.len()
        )));
    }

    let mut ranked: Vec<RankedChunk> = candidates
        .into_iter()
        .zip(scores)
        .map(|(hit, score)| RankedChunk {
            text: hit.text,
            score: if score.is_nan() { f32::NEG_INFINITY } else { score },
            position: hit.position,
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(top_n);
    Ok(ranked)
}

/// Client for a `/rerank` endpoint (`{model, query, documents}` in,
/// `{results: [{index, relevance_score}]}` out).
pub struct HttpCrossEncoder {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankItem>,
}

#[derive(Deserialize)]
struct RerankItem {
    index: usize,
    #[serde(alias = "score")]
    relevance_score: f32,
}

impl HttpCrossEncoder {
    pub fn new(settings: &RerankerSettings) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone().filter(|key| !key.trim().is_empty()),
            client,
        })
    }
}

fn scores_in_candidate_order(items: Vec<RerankItem>, count: usize) -> Result<Vec<f32>, ApiError> {
    let mut scores: Vec<Option<f32>> = vec![None; count];
    for item in items {
        let slot = scores.get_mut(item.index).ok_or_else(|| {
            ApiError::Upstream(format!(
                "re-ranker returned index {} for {} candidates",
                item.index, count
            ))
        })?;
        *slot = Some(item.relevance_score);
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(i, score)| {
            score.ok_or_else(|| ApiError::Upstream(format!("re-ranker omitted candidate {}", i)))
        })
        .collect()
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>, ApiError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/rerank", self.base_url);
        let body = json!({
            "model": self.model,
            "query": query,
            "documents": candidates,
            "top_n": candidates.len(),
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await.map_err(ApiError::upstream)?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "rerank request returned {}: {}",
                status, text
            )));
        }

        let payload: RerankResponse = res.json().await.map_err(ApiError::upstream)?;
        scores_in_candidate_order(payload.results, candidates.len())
    }
}

/// Scores a candidate by the fraction of distinct query terms it contains.
pub struct LexicalCrossEncoder;

impl LexicalCrossEncoder {
    pub fn score_one(query_terms: &HashSet<String>, candidate: &str) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let terms: HashSet<String> = tokenize(candidate).collect();
        let matched = query_terms.iter().filter(|t| terms.contains(*t)).count();
        matched as f32 / query_terms.len() as f32
    }
}

#[async_trait]
impl CrossEncoder for LexicalCrossEncoder {
    fn name(&self) -> &str {
        "lexical"
    }

    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>, ApiError> {
        let query_terms: HashSet<String> = tokenize(query).collect();
        Ok(candidates
            .iter()
            .map(|candidate| Self::score_one(&query_terms, candidate))
            .collect())
    }
}
