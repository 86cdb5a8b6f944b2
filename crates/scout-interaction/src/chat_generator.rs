//! ChatCompletionGenerator - Direct REST implementation of [`TextGenerator`]
//! against an OpenAI-compatible chat-completions endpoint.

use crate::http::{map_status_error, map_transport_error};
use async_trait::async_trait;
use reqwest::Client;
use scout_core::error::{Result, ScoutError};
use scout_core::tools::TextGenerator;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const BASE_URL: &str = "https://api.openai.com/v1/chat/completions";
const TOOL_NAME: &str = "text_generation";

/// Client for the chat-completions text-generation service.
#[derive(Clone)]
pub struct ChatCompletionGenerator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
    timeout: Duration,
}

impl ChatCompletionGenerator {
    /// Creates a new client with the provided API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: BASE_URL.to_string(),
            max_tokens: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// `OPENAI_API_KEY` is required; `SCOUT_GENERATOR_MODEL` overrides the
    /// default model name.
    pub fn try_from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            ScoutError::config("OPENAI_API_KEY not found in environment variables")
        })?;
        let model = env::var("SCOUT_GENERATOR_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        Ok(Self::new(api_key, model))
    }

    /// Overrides the model after construction.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Points the client at a compatible self-hosted endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the maximum number of tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn send_request(&self, body: &ChatCompletionRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .timeout(self.timeout)
            .json(body)
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

        let parsed: ChatCompletionResponse = response.json().await.map_err(|err| {
            ScoutError::tool_failed(TOOL_NAME, format!("unparseable response: {err}"))
        })?;

        extract_text(parsed)
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(ScoutError::tool_failed(TOOL_NAME, "prompt cannot be empty"));
        }

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.max_tokens,
        };

        self.send_request(&request).await
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn extract_text(response: ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            ScoutError::tool_failed(TOOL_NAME, "generator returned no content in the response")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_choice_content() {
        let response: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "hello"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "hello");
    }

    #[test]
    fn missing_content_is_a_tool_failure() {
        let response: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(extract_text(response).is_err());
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_locally() {
        let generator = ChatCompletionGenerator::new("key", "model");
        assert!(generator.generate("   ").await.is_err());
    }
}
