//! Observations produced by executing agent actions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which tool produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    Retrieval,
    WebLookup,
}

/// The outcome of one tool execution, successful or not.
///
/// Failures are first-class observations rather than errors: the reasoning
/// step must be able to see that a tool failed and choose a different action,
/// instead of the whole request aborting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub kind: ObservationKind,
    /// Stable content-derived key used to deduplicate working memory.
    pub key: String,
    pub content: String,
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Observation {
    /// A successful observation keyed by its content.
    pub fn success(kind: ObservationKind, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            key: content_key(kind, &content),
            kind,
            content,
            failed: false,
            reason: None,
        }
    }

    /// A failed tool execution with the failure reason.
    pub fn failure(kind: ObservationKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            key: content_key(kind, &reason),
            kind,
            content: String::new(),
            failed: true,
            reason: Some(reason),
        }
    }
}

/// Derives the dedup key: identical content from the same tool always maps
/// to the same key, so a session never stores the same fact twice.
fn content_key(kind: ObservationKind, content: &str) -> String {
    let material = format!("{kind:?}\x1f{}", content.trim());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, material.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_yields_identical_keys() {
        let a = Observation::success(ObservationKind::Retrieval, "Apex Roofing | Brooklyn");
        let b = Observation::success(ObservationKind::Retrieval, "Apex Roofing | Brooklyn");
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn kind_participates_in_the_key() {
        let a = Observation::success(ObservationKind::Retrieval, "same text");
        let b = Observation::success(ObservationKind::WebLookup, "same text");
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn failures_carry_reason_and_no_content() {
        let obs = Observation::failure(ObservationKind::WebLookup, "timed out after 10s");
        assert!(obs.failed);
        assert!(obs.content.is_empty());
        assert_eq!(obs.reason.as_deref(), Some("timed out after 10s"));
    }
}
