//! Shared HTTP error mapping for the interaction clients.

use reqwest::StatusCode;
use scout_core::error::ScoutError;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Pulls the human-readable message out of a JSON error body, falling back
/// to the raw body text.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.to_string())
}

/// Maps a transport-level reqwest error for the named tool.
///
/// Timeouts become [`ScoutError::ToolTimeout`] so the agent loop treats them
/// exactly like any other recoverable tool failure.
pub(crate) fn map_transport_error(tool: &str, timeout: Duration, err: reqwest::Error) -> ScoutError {
    if err.is_timeout() {
        ScoutError::tool_timeout(tool, timeout.as_millis() as u64)
    } else {
        ScoutError::tool_failed(tool, format!("request failed: {err}"))
    }
}

/// Maps a non-success HTTP status for the named tool.
pub(crate) fn map_status_error(tool: &str, status: StatusCode, body: &str) -> ScoutError {
    ScoutError::tool_failed(
        tool,
        format!("HTTP {}: {}", status.as_u16(), error_message(body)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_message_from_json_error_body() {
        let body = r#"{"error": {"message": "Invalid API key", "type": "auth"}}"#;
        assert_eq!(error_message(body), "Invalid API key");
    }

    #[test]
    fn falls_back_to_raw_body() {
        assert_eq!(error_message("502 Bad Gateway"), "502 Bad Gateway");
    }
}
