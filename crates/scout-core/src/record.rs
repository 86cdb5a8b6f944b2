//! Retrievable business-entity records and per-query ranking results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A retrievable business entity (e.g., a contractor listing).
///
/// Records are created during index construction, which is external to this
/// engine; from the engine's perspective they are immutable. The embedding
/// itself stays inside the external index and is never carried here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable unique identifier
    pub id: String,
    /// Display and filtering attributes (name, address, phone, url, ...).
    ///
    /// A BTreeMap keeps attribute iteration deterministic, which matters for
    /// prompt construction and display ordering.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Record {
    /// Creates a record with no attributes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute, consuming and returning self for chained setup.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns an attribute as a string slice, if present and textual.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    /// Returns an attribute as an integer, accepting numeric or numeric-string
    /// values (source listings are inconsistent about this).
    pub fn attribute_i64(&self, key: &str) -> Option<i64> {
        match self.attributes.get(key)? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns an attribute as a float, accepting numeric or numeric-string values.
    pub fn attribute_f64(&self, key: &str) -> Option<f64> {
        match self.attributes.get(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// The human-readable name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.attribute_str("name").unwrap_or(&self.id)
    }
}

/// A record paired with its raw similarity and its feedback-blended score.
///
/// Constructed per query by the ranking engine and discarded after the
/// response; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub record: Record,
    /// Raw score from the nearest-neighbor index, normalized so that larger
    /// is always better.
    pub similarity_score: f64,
    /// Blend of similarity and the feedback confidence lower bound.
    pub final_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_accessors_coerce_strings() {
        let record = Record::new("r1")
            .with_attribute("name", "Apex Roofing")
            .with_attribute("years_in_business", "12")
            .with_attribute("activity_score", 0.9);

        assert_eq!(record.display_name(), "Apex Roofing");
        assert_eq!(record.attribute_i64("years_in_business"), Some(12));
        assert_eq!(record.attribute_f64("activity_score"), Some(0.9));
        assert_eq!(record.attribute_i64("missing"), None);
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let record = Record::new("anonymous-7");
        assert_eq!(record.display_name(), "anonymous-7");
    }
}
