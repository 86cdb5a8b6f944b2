//! Feedback-adjusted ranking of similarity-search candidates.
//!
//! Raw click-through proportions are unreliable at low sample sizes (a single
//! positive vote yields p = 1.0), so the confidence term is the Wilson score
//! interval lower bound, which discounts high proportions computed from few
//! observations without requiring a Bayesian prior.

use crate::feedback::{FeedbackAggregate, FeedbackRepository};
use crate::record::{RankedResult, Record};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tunable ranking parameters.
///
/// The blend weight and the confidence level are deployment configuration,
/// not constants: `wilson_lower` itself converges toward the observed
/// proportion as the sample grows, so a fixed `alpha` is sufficient and no
/// manual decay schedule is needed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Weight of the raw similarity score in the final blend.
    pub alpha: f64,
    /// Standard normal quantile for the Wilson interval (1.96 = 95%).
    pub confidence_z: f64,
    /// Confidence term used for records with no feedback at all.
    ///
    /// Must lie strictly between 0 and 1 so unseen records are neither
    /// boosted nor ranked below records with mixed negative history.
    pub neutral_score: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            confidence_z: 1.96,
            neutral_score: 0.5,
        }
    }
}

/// Lower bound of the Wilson score interval for a binomial proportion.
///
/// Returns `None` when `total == 0`: "no feedback" is a distinct state the
/// caller maps to its configured neutral value.
pub fn wilson_lower(positive: u64, total: u64, z: f64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let n = total as f64;
    let p = positive as f64 / n;
    let z2 = z * z;

    let centre = p + z2 / (2.0 * n);
    let spread = z * ((p * (1.0 - p) + z2 / (4.0 * n)) / n).sqrt();
    Some(((centre - spread) / (1.0 + z2 / n)).clamp(0.0, 1.0))
}

/// Blends index similarity with the feedback confidence lower bound and
/// produces a totally ordered result list.
pub struct RankingEngine {
    config: RankingConfig,
    feedback: Arc<dyn FeedbackRepository>,
}

impl RankingEngine {
    pub fn new(config: RankingConfig, feedback: Arc<dyn FeedbackRepository>) -> Self {
        Self { config, feedback }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Ranks candidates by `alpha * similarity + (1 - alpha) * confidence`.
    ///
    /// Candidates must carry similarity scores normalized so that larger is
    /// better. When the feedback store cannot be read, the engine falls back
    /// explicitly to the neutral confidence term for every candidate (pure
    /// similarity ordering) instead of guessing; the failure is logged, never
    /// silently masked by stale data.
    ///
    /// The returned order is total: ties on the final score break on record
    /// id, so identical inputs rank identically across runs regardless of
    /// the iteration order of any underlying store.
    pub async fn rank(&self, candidates: Vec<(Record, f64)>) -> Vec<RankedResult> {
        let aggregates = self.fetch_aggregates(&candidates).await;

        let mut results: Vec<RankedResult> = candidates
            .into_iter()
            .zip(aggregates)
            .map(|((record, similarity_score), aggregate)| {
                let confidence = self.confidence(aggregate);
                let final_score = self.config.alpha * similarity_score
                    + (1.0 - self.config.alpha) * confidence;
                RankedResult {
                    record,
                    similarity_score,
                    final_score,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.final_score
                .total_cmp(&a.final_score)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        results
    }

    /// Maps an aggregate to its confidence term.
    pub fn confidence(&self, aggregate: FeedbackAggregate) -> f64 {
        wilson_lower(
            aggregate.positive_count,
            aggregate.total_count,
            self.config.confidence_z,
        )
        .unwrap_or(self.config.neutral_score)
    }

    async fn fetch_aggregates(&self, candidates: &[(Record, f64)]) -> Vec<FeedbackAggregate> {
        let lookups = candidates
            .iter()
            .map(|(record, _)| self.feedback.aggregate(&record.id));

        match futures::future::try_join_all(lookups).await {
            Ok(aggregates) => aggregates,
            Err(err) => {
                tracing::warn!(
                    target: "scout::ranking",
                    error = %err,
                    "feedback store unreachable, ranking on similarity alone"
                );
                vec![FeedbackAggregate::default(); candidates.len()]
            }
        }
    }
}
