//! Google Programmable Search implementation of [`WebLookup`].

use crate::http::{map_status_error, map_transport_error};
use async_trait::async_trait;
use reqwest::Client;
use scout_core::error::{Result, ScoutError};
use scout_core::tools::{WebHit, WebLookup};
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::time::Duration;

const BASE_URL: &str = "https://www.googleapis.com/customsearch/v1";
const TOOL_NAME: &str = "web_lookup";

/// Client for the Custom Search JSON API.
#[derive(Clone)]
pub struct GoogleWebLookup {
    client: Client,
    api_key: String,
    engine_id: String,
    result_count: u8,
    timeout: Duration,
}

impl GoogleWebLookup {
    /// Creates a new client with the provided API key and engine id.
    pub fn new(api_key: impl Into<String>, engine_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            result_count: 5,
            timeout: Duration::from_secs(15),
        }
    }

    /// Loads configuration from `GOOGLE_API_KEY` and `GOOGLE_CSE_ID`.
    pub fn try_from_env() -> Result<Self> {
        let api_key = env::var("GOOGLE_API_KEY")
            .map_err(|_| ScoutError::config("GOOGLE_API_KEY not found in environment variables"))?;
        let engine_id = env::var("GOOGLE_CSE_ID")
            .map_err(|_| ScoutError::config("GOOGLE_CSE_ID not found in environment variables"))?;
        Ok(Self::new(api_key, engine_id))
    }

    /// Sets how many results to request (the API caps this at 10).
    pub fn with_result_count(mut self, count: u8) -> Self {
        self.result_count = count.min(10);
        self
    }

    /// Sets the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl WebLookup for GoogleWebLookup {
    async fn lookup(&self, query: &str) -> Result<Vec<WebHit>> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(ScoutError::tool_failed(TOOL_NAME, "query cannot be empty"));
        }

        let response = self
            .client
            .get(BASE_URL)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", trimmed),
                ("num", &self.result_count.to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| map_transport_error(TOOL_NAME, self.timeout, err))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(map_status_error(TOOL_NAME, status, &body_text));
        }

        let parsed: SearchResponse = response.json().await.map_err(|err| {
            ScoutError::tool_failed(TOOL_NAME, format!("unparseable response: {err}"))
        })?;

        Ok(extract_hits(parsed))
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

/// Shapes API items into hits, dropping entries without a URL and
/// deduplicating by URL.
fn extract_hits(response: SearchResponse) -> Vec<WebHit> {
    let mut seen = HashSet::new();
    let mut hits = Vec::new();

    for item in response.items {
        if item.link.is_empty() || !seen.insert(item.link.clone()) {
            continue;
        }
        hits.push(WebHit {
            title: if item.title.is_empty() {
                item.link.clone()
            } else {
                item.title
            },
            snippet: item.snippet,
            url: item.link,
        });
    }

    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_deduplicates_items() {
        let response: SearchResponse = serde_json::from_str(
            r#"{
                "items": [
                    {"title": "Apex Roofing", "snippet": "Roofing in Brooklyn", "link": "https://apex.example"},
                    {"title": "Apex Roofing (dup)", "snippet": "dup", "link": "https://apex.example"},
                    {"snippet": "no link at all"},
                    {"snippet": "untitled", "link": "https://untitled.example"}
                ]
            }"#,
        )
        .unwrap();

        let hits = extract_hits(response);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Apex Roofing");
        // falls back to the URL when no title is present
        assert_eq!(hits[1].title, "https://untitled.example");
    }

    #[test]
    fn missing_items_field_means_no_hits() {
        let response: SearchResponse = serde_json::from_str(r#"{"kind": "customsearch"}"#).unwrap();
        assert!(extract_hits(response).is_empty());
    }
}
