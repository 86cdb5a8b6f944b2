//! The closed set of actions a reasoning step can select.
//!
//! The text-generation tool returns loosely structured text; anything it
//! produces must be validated into this tagged union before the loop trusts
//! it. Adding an action is a deliberate schema change here, not an ad-hoc
//! string check somewhere in the loop.

use crate::error::{Result, ScoutError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::Display;
use uuid::Uuid;

/// Action selected by one reasoning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentAction {
    /// Query the similarity index for matching records.
    Retrieve {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        top_k: Option<usize>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        filters: BTreeMap<String, String>,
    },
    /// Look something up on the open web.
    WebLookup { query: String },
    /// Produce the final recommendation and stop.
    Answer { content: String },
}

/// Discriminant of an [`AgentAction`], for logging and guard bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    Retrieve,
    WebLookup,
    Answer,
}

impl AgentAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Retrieve { .. } => ActionKind::Retrieve,
            Self::WebLookup { .. } => ActionKind::WebLookup,
            Self::Answer { .. } => ActionKind::Answer,
        }
    }

    /// Stable identity of a tool action, used by the loop-guard to detect an
    /// immediately repeated identical action. `Answer` terminates the loop
    /// and needs no guard key.
    pub fn loop_guard_key(&self) -> Option<Uuid> {
        let material = match self {
            Self::Retrieve {
                query,
                top_k,
                filters,
            } => {
                let filters: Vec<String> =
                    filters.iter().map(|(k, v)| format!("{k}={v}")).collect();
                format!(
                    "retrieve\x1f{}\x1f{}\x1f{}",
                    query.trim().to_lowercase(),
                    top_k.map(|k| k.to_string()).unwrap_or_default(),
                    filters.join("\x1e")
                )
            }
            Self::WebLookup { query } => {
                format!("web_lookup\x1f{}", query.trim().to_lowercase())
            }
            Self::Answer { .. } => return None,
        };
        Some(Uuid::new_v5(&Uuid::NAMESPACE_OID, material.as_bytes()))
    }
}

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex"));
static BARE_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Parses a generator response into an action.
///
/// Models wrap JSON in markdown fences or lead with prose, so extraction is
/// lenient; validation is not. A response with no JSON object at all is
/// treated as the model answering directly (the fallback action). A JSON
/// object that carries an action tag outside the closed set is a protocol
/// violation and fails the request.
pub fn parse_action(response: &str) -> Result<AgentAction> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(ScoutError::MalformedAction(
            "generator returned an empty response".into(),
        ));
    }

    let fallback = || AgentAction::Answer {
        content: trimmed.to_string(),
    };

    let Some(json) = extract_json_object(trimmed) else {
        // No structured payload: the model answered in prose.
        return Ok(fallback());
    };

    // Braces that do not parse are prose too (e.g. "call {them} today"),
    // not a protocol attempt.
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&json) else {
        return Ok(fallback());
    };

    let Some(tag) = value.get("action").and_then(|v| v.as_str()) else {
        return Err(ScoutError::MalformedAction(
            "JSON payload is missing the 'action' tag".into(),
        ));
    };

    serde_json::from_value::<AgentAction>(value.clone()).map_err(|e| {
        ScoutError::MalformedAction(format!("unrecognized or incomplete action '{tag}': {e}"))
    })
}

fn extract_json_object(text: &str) -> Option<String> {
    if text.starts_with('{') && text.ends_with('}') {
        return Some(text.to_string());
    }
    if let Some(caps) = FENCED_JSON.captures(text) {
        return Some(caps[1].to_string());
    }
    BARE_OBJECT.find(text).map(|m| m.as_str().to_string())
}
