//! The retrieval gateway: embedding, index query, filtering, and ranking.

use scout_core::error::{Result, ScoutError};
use scout_core::ranking::RankingEngine;
use scout_core::record::{RankedResult, Record};
use scout_core::tools::{Embedder, NeighborIndex};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Issues similarity queries against the external index and applies the
/// ranking engine to the raw candidates.
pub struct RetrievalGateway {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn NeighborIndex>,
    ranking: RankingEngine,
    /// Raw candidates fetched per requested result so the ranking engine has
    /// room to reorder beyond the similarity cut.
    overfetch_factor: usize,
}

impl RetrievalGateway {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn NeighborIndex>,
        ranking: RankingEngine,
        overfetch_factor: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            ranking,
            overfetch_factor: overfetch_factor.max(1),
        }
    }

    /// Searches the index and returns the top `top_k` feedback-ranked results.
    ///
    /// An empty result means nothing matched; an unreachable index or
    /// embedding service fails with `RetrievalUnavailable` so the caller can
    /// tell the two apart.
    pub async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<RankedResult>> {
        if top_k == 0 {
            return Err(ScoutError::internal("top_k must be at least 1"));
        }

        let embedding = self.embedder.embed(query_text).await?;
        let raw = self
            .index
            .nearest(&embedding, top_k * self.overfetch_factor)
            .await?;
        let fetched = raw.len();

        let order = self.index.score_order();
        let candidates: Vec<(Record, f64)> = raw
            .into_iter()
            .filter(|(record, _)| matches_filters(record, filters))
            .map(|(record, score)| (record, order.normalize(score)))
            .collect();

        let mut ranked = self.ranking.rank(candidates).await;
        ranked.truncate(top_k);

        tracing::debug!(
            target: "scout::retrieval",
            query = %query_text,
            fetched,
            returned = ranked.len(),
            "search complete"
        );
        Ok(ranked)
    }
}

/// Attribute filters: textual attributes match on case-insensitive substring
/// (addresses and names come from scraped listings with inconsistent
/// formatting); everything else matches on the rendered value.
fn matches_filters(record: &Record, filters: &BTreeMap<String, String>) -> bool {
    filters.iter().all(|(key, expected)| {
        match record.attributes.get(key) {
            Some(serde_json::Value::String(actual)) => {
                actual.to_lowercase().contains(&expected.to_lowercase())
            }
            Some(other) => other.to_string() == *expected,
            None => false,
        }
    })
}
