//! Contracts with the external collaborators.
//!
//! Everything the engine cannot compute itself sits behind one of these
//! traits: text generation, web lookup, embedding, and the nearest-neighbor
//! index. Implementations live in scout-interaction; tests substitute
//! hand-rolled doubles.

use crate::error::{Result, ScoutError};
use crate::record::Record;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// External text-generation service: prompt in, completion out.
///
/// Used both for the agent loop's action decisions and for context
/// compression. Invoked synchronously from the engine's perspective: the
/// calling task suspends, the process does not block.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// One result from the web-lookup tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// External web-search service.
#[async_trait]
pub trait WebLookup: Send + Sync {
    async fn lookup(&self, query: &str) -> Result<Vec<WebHit>>;
}

/// External embedding function. Deterministic for identical input within a
/// session; the engine treats the vectors as opaque, comparable only through
/// the index.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Whether the index reports distances (smaller is closer) or similarities
/// (larger is closer). The gateway normalizes to larger-is-better before
/// ranking, so the sort direction is always correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreOrder {
    /// Scores are similarities; larger means closer.
    SimilarityDescending,
    /// Scores are distances; smaller means closer.
    DistanceAscending,
}

impl ScoreOrder {
    /// Normalizes a raw index score to larger-is-better.
    pub fn normalize(&self, raw: f64) -> f64 {
        match self {
            Self::SimilarityDescending => raw,
            Self::DistanceAscending => -raw,
        }
    }
}

/// External approximate-nearest-neighbor index.
#[async_trait]
pub trait NeighborIndex: Send + Sync {
    /// Returns up to `k` candidates with raw scores, closest first.
    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<(Record, f64)>>;

    /// How this index's raw scores are ordered.
    fn score_order(&self) -> ScoreOrder;
}

/// Placeholder web lookup for deployments without a search backend.
///
/// Fails as a tool failure (not an empty result) so the reasoning step can
/// tell "nothing found" apart from "nothing configured" and pick another
/// action.
pub struct UnconfiguredWebLookup;

#[async_trait]
impl WebLookup for UnconfiguredWebLookup {
    async fn lookup(&self, _query: &str) -> Result<Vec<WebHit>> {
        Err(ScoutError::tool_failed(
            "web_lookup",
            "no web search backend configured",
        ))
    }
}
