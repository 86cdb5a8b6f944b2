//! REST embedding client implementing [`Embedder`].
//!
//! Failures map to `RetrievalUnavailable`: an unreachable embedding service
//! breaks the retrieval path exactly like an unreachable index.

use async_trait::async_trait;
use reqwest::Client;
use scout_core::error::{Result, ScoutError};
use scout_core::tools::Embedder;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

const DEFAULT_MODEL: &str = "text-embedding-3-small";
const BASE_URL: &str = "https://api.openai.com/v1/embeddings";
const TOOL_NAME: &str = "embedding";

/// Client for an OpenAI-compatible embeddings endpoint.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: BASE_URL.to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    /// Loads configuration from environment variables (`OPENAI_API_KEY`,
    /// optional `SCOUT_EMBEDDING_MODEL`).
    pub fn try_from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            ScoutError::config("OPENAI_API_KEY not found in environment variables")
        })?;
        let model = env::var("SCOUT_EMBEDDING_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        Ok(Self::new(api_key, model))
    }

    /// Points the client at a compatible self-hosted endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: vec![text.to_string()],
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ScoutError::tool_timeout(TOOL_NAME, self.timeout.as_millis() as u64)
                } else {
                    ScoutError::retrieval_unavailable(format!("embedding request failed: {err}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(ScoutError::retrieval_unavailable(format!(
                "embedding service returned HTTP {}: {}",
                status.as_u16(),
                crate::http::error_message(&body)
            )));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|err| {
            ScoutError::retrieval_unavailable(format!("unparseable embedding response: {err}"))
        })?;

        extract_vector(parsed)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

fn extract_vector(response: EmbeddingResponse) -> Result<Vec<f32>> {
    response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ScoutError::retrieval_unavailable("embedding service returned no vector")
        })
}
