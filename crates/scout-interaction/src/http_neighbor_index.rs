//! REST client for the external approximate-nearest-neighbor index,
//! implementing [`NeighborIndex`].
//!
//! Speaks the common vector-store search shape: POST a vector and a limit,
//! get back scored points with a JSON payload of record attributes. The
//! score direction is deployment configuration: the index must declare
//! whether it reports similarities or distances.

use async_trait::async_trait;
use reqwest::Client;
use scout_core::error::{Result, ScoutError};
use scout_core::record::Record;
use scout_core::tools::{NeighborIndex, ScoreOrder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

const TOOL_NAME: &str = "neighbor_index";

/// Client for a vector-search HTTP endpoint.
#[derive(Clone)]
pub struct HttpNeighborIndex {
    client: Client,
    search_url: String,
    api_key: Option<String>,
    score_order: ScoreOrder,
    timeout: Duration,
}

impl HttpNeighborIndex {
    /// Creates a client for the given search endpoint.
    pub fn new(search_url: impl Into<String>, score_order: ScoreOrder) -> Self {
        Self {
            client: Client::new(),
            search_url: search_url.into(),
            api_key: None,
            score_order,
            timeout: Duration::from_secs(10),
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// `SCOUT_INDEX_URL` is required; `SCOUT_INDEX_API_KEY` is optional;
    /// `SCOUT_INDEX_SCORE_ORDER` may be `similarity` (default) or `distance`.
    pub fn try_from_env() -> Result<Self> {
        let search_url = env::var("SCOUT_INDEX_URL").map_err(|_| {
            ScoutError::config("SCOUT_INDEX_URL not found in environment variables")
        })?;
        let score_order = match env::var("SCOUT_INDEX_SCORE_ORDER").as_deref() {
            Ok("distance") => ScoreOrder::DistanceAscending,
            Ok("similarity") | Err(_) => ScoreOrder::SimilarityDescending,
            Ok(other) => {
                return Err(ScoutError::config(format!(
                    "SCOUT_INDEX_SCORE_ORDER must be 'similarity' or 'distance', got '{other}'"
                )));
            }
        };

        let mut index = Self::new(search_url, score_order);
        if let Ok(key) = env::var("SCOUT_INDEX_API_KEY") {
            index.api_key = Some(key);
        }
        Ok(index)
    }

    /// Attaches an API key sent as the `api-key` header.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl NeighborIndex for HttpNeighborIndex {
    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<(Record, f64)>> {
        let request = SearchRequest {
            vector: embedding.to_vec(),
            limit: k,
            with_payload: true,
        };

        let mut builder = self
            .client
            .post(&self.search_url)
            .header("content-type", "application/json")
            .timeout(self.timeout)
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                ScoutError::tool_timeout(TOOL_NAME, self.timeout.as_millis() as u64)
            } else {
                ScoutError::retrieval_unavailable(format!("index request failed: {err}"))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(ScoutError::retrieval_unavailable(format!(
                "index returned HTTP {}: {}",
                status.as_u16(),
                crate::http::error_message(&body)
            )));
        }

        let parsed: SearchResponse = response.json().await.map_err(|err| {
            ScoutError::retrieval_unavailable(format!("unparseable index response: {err}"))
        })?;

        Ok(extract_candidates(parsed))
    }

    fn score_order(&self) -> ScoreOrder {
        self.score_order
    }
}

#[derive(Serialize)]
struct SearchRequest {
    vector: Vec<f32>,
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: serde_json::Value,
    score: f64,
    #[serde(default)]
    payload: BTreeMap<String, serde_json::Value>,
}

/// Shapes scored points into records. Numeric point ids are stringified so
/// record ids stay uniform.
fn extract_candidates(response: SearchResponse) -> Vec<(Record, f64)> {
    response
        .result
        .into_iter()
        .filter_map(|point| {
            let id = match &point.id {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((
                Record {
                    id,
                    attributes: point.payload,
                },
                point.score,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_records_with_payload_attributes() {
        let response: SearchResponse = serde_json::from_str(
            r#"{
                "result": [
                    {"id": 7, "score": 0.91, "payload": {"name": "Apex Roofing", "address": "Brooklyn, NY"}},
                    {"id": "r-12", "score": 0.77, "payload": {}},
                    {"id": [1, 2], "score": 0.5}
                ]
            }"#,
        )
        .unwrap();

        let candidates = extract_candidates(response);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].0.id, "7");
        assert_eq!(candidates[0].0.attribute_str("name"), Some("Apex Roofing"));
        assert_eq!(candidates[1].0.id, "r-12");
        assert_eq!(candidates[1].1, 0.77);
    }

    #[test]
    fn empty_result_is_a_valid_empty_match() {
        let response: SearchResponse = serde_json::from_str(r#"{"result": []}"#).unwrap();
        assert!(extract_candidates(response).is_empty());
    }
}
