//! User feedback events and their derived aggregates.
//!
//! Events are append-only: no event is ever edited or deleted, and every
//! aggregate is a pure function of the event log. The log is the source of
//! truth; cached aggregates must never be persisted inconsistently with it.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// One user signal about a (query, record) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeedbackSignal {
    /// The record was useful for the query.
    Positive,
    /// The record was not useful for the query.
    Negative,
}

/// An append-only feedback record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    /// The record the signal applies to
    pub record_id: String,
    pub signal: FeedbackSignal,
    /// RFC 3339 timestamp
    pub timestamp: String,
    /// The query that produced the result, when the caller supplies it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl FeedbackEvent {
    /// Creates an event stamped with the current time.
    pub fn new(record_id: impl Into<String>, signal: FeedbackSignal) -> Self {
        Self {
            record_id: record_id.into(),
            signal,
            timestamp: chrono::Utc::now().to_rfc3339(),
            query: None,
        }
    }

    /// Attaches the originating query text.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// Derived per-record counts.
///
/// Invariant: `positive_count <= total_count`. A record with no feedback has
/// the zero aggregate, which is a valid state, not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackAggregate {
    pub positive_count: u64,
    pub total_count: u64,
}

impl FeedbackAggregate {
    /// Folds one more event into the aggregate.
    pub fn apply(&mut self, signal: FeedbackSignal) {
        self.total_count += 1;
        if signal == FeedbackSignal::Positive {
            self.positive_count += 1;
        }
    }

    /// The observed positive proportion, or `None` when there is no data.
    pub fn proportion(&self) -> Option<f64> {
        if self.total_count == 0 {
            None
        } else {
            Some(self.positive_count as f64 / self.total_count as f64)
        }
    }
}

/// Overall counts across the whole event log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub total: u64,
    pub positive: u64,
    pub negative: u64,
    /// positive / total, 0.0 when the log is empty
    pub positive_ratio: f64,
}

impl FeedbackStats {
    /// Builds stats from raw counts.
    pub fn from_counts(positive: u64, negative: u64) -> Self {
        let total = positive + negative;
        let positive_ratio = if total == 0 {
            0.0
        } else {
            positive as f64 / total as f64
        };
        Self {
            total,
            positive,
            negative,
            positive_ratio,
        }
    }
}

/// Durable store for feedback events and their aggregates.
///
/// Implementations must surface storage failures to the caller rather than
/// swallowing them; a stale ranking must never silently mask a failed write.
#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    /// Appends one event to the log.
    async fn append(&self, event: FeedbackEvent) -> Result<()>;

    /// Returns the aggregate for a record; the zero aggregate when unseen.
    async fn aggregate(&self, record_id: &str) -> Result<FeedbackAggregate>;

    /// Returns overall counts across the log.
    async fn stats(&self) -> Result<FeedbackStats>;
}
