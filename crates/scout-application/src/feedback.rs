//! Feedback recording service, closing the loop from answers back into
//! future rankings.

use scout_core::error::{Result, ScoutError};
use scout_core::feedback::{FeedbackAggregate, FeedbackEvent, FeedbackRepository, FeedbackSignal, FeedbackStats};
use std::sync::Arc;

/// Thin validation and logging layer over the feedback repository.
pub struct FeedbackService {
    repository: Arc<dyn FeedbackRepository>,
}

impl FeedbackService {
    pub fn new(repository: Arc<dyn FeedbackRepository>) -> Self {
        Self { repository }
    }

    /// Records one signal for a record. Storage failures propagate: a
    /// dropped feedback event must be visible to the caller, not silently
    /// absorbed into a stale ranking.
    pub async fn record(
        &self,
        record_id: &str,
        signal: FeedbackSignal,
        query: Option<&str>,
    ) -> Result<()> {
        if record_id.trim().is_empty() {
            return Err(ScoutError::internal("feedback requires a record id"));
        }

        let mut event = FeedbackEvent::new(record_id, signal);
        if let Some(query) = query.filter(|q| !q.trim().is_empty()) {
            event = event.with_query(query);
        }

        self.repository.append(event).await?;
        tracing::debug!(
            target: "scout::feedback",
            record_id = %record_id,
            signal = %signal,
            "feedback recorded"
        );
        Ok(())
    }

    /// Per-record counts; the zero aggregate for unseen records.
    pub async fn aggregate(&self, record_id: &str) -> Result<FeedbackAggregate> {
        self.repository.aggregate(record_id).await
    }

    /// Overall counts across the event log.
    pub async fn stats(&self) -> Result<FeedbackStats> {
        self.repository.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_infrastructure::InMemoryFeedbackRepository;

    #[tokio::test]
    async fn record_then_read_aggregate_and_stats() {
        let service = FeedbackService::new(Arc::new(InMemoryFeedbackRepository::new()));

        service
            .record("r1", FeedbackSignal::Positive, Some("roofers in brooklyn"))
            .await
            .unwrap();
        service
            .record("r1", FeedbackSignal::Negative, None)
            .await
            .unwrap();

        let agg = service.aggregate("r1").await.unwrap();
        assert_eq!((agg.positive_count, agg.total_count), (1, 2));

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert!((stats.positive_ratio - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn blank_record_id_is_rejected() {
        let service = FeedbackService::new(Arc::new(InMemoryFeedbackRepository::new()));
        assert!(service
            .record("  ", FeedbackSignal::Positive, None)
            .await
            .is_err());
    }
}
