//! In-memory feedback store for tests and data-dir-less deployments.

use async_trait::async_trait;
use scout_core::error::{Result, ScoutError};
use scout_core::feedback::{FeedbackAggregate, FeedbackEvent, FeedbackRepository, FeedbackSignal, FeedbackStats};
use std::collections::HashMap;
use std::sync::Mutex;

/// [`FeedbackRepository`] holding the event log in memory.
///
/// Same append-only semantics as the durable store; the events vector is the
/// source of truth and aggregates are folded incrementally from it.
#[derive(Default)]
pub struct InMemoryFeedbackRepository {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    events: Vec<FeedbackEvent>,
    aggregates: HashMap<String, FeedbackAggregate>,
}

impl InMemoryFeedbackRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events recorded so far.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FeedbackRepository for InMemoryFeedbackRepository {
    async fn append(&self, event: FeedbackEvent) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ScoutError::internal("feedback state lock poisoned"))?;
        state
            .aggregates
            .entry(event.record_id.clone())
            .or_default()
            .apply(event.signal);
        state.events.push(event);
        Ok(())
    }

    async fn aggregate(&self, record_id: &str) -> Result<FeedbackAggregate> {
        let state = self
            .state
            .lock()
            .map_err(|_| ScoutError::internal("feedback state lock poisoned"))?;
        Ok(state.aggregates.get(record_id).copied().unwrap_or_default())
    }

    async fn stats(&self) -> Result<FeedbackStats> {
        let state = self
            .state
            .lock()
            .map_err(|_| ScoutError::internal("feedback state lock poisoned"))?;
        let positive = state
            .events
            .iter()
            .filter(|e| e.signal == FeedbackSignal::Positive)
            .count() as u64;
        let total = state.events.len() as u64;
        Ok(FeedbackStats::from_counts(positive, total - positive))
    }
}
