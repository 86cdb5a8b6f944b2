//! Query execution facade: wires the services together and runs queries
//! end to end. This is the surface the (external) transport layer calls.

pub mod loop_events;

use scout_application::agent_loop::{AgentLoop, QueryOutcome};
use scout_application::feedback::FeedbackService;
use scout_application::retrieval::RetrievalGateway;
use scout_application::session::SessionManager;
use scout_core::config::ScoutConfig;
use scout_core::context::ConversationContext;
use scout_core::error::Result;
use scout_core::feedback::{FeedbackAggregate, FeedbackRepository, FeedbackSignal, FeedbackStats};
use scout_core::ranking::RankingEngine;
use scout_core::tools::{Embedder, NeighborIndex, TextGenerator, UnconfiguredWebLookup, WebLookup};
use scout_infrastructure::{ConfigStorage, JsonlFeedbackRepository};
use scout_interaction::{ChatCompletionGenerator, GoogleWebLookup, HttpEmbedder, HttpNeighborIndex};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The external collaborators a [`QueryExecutor`] is built from.
pub struct ExecutorTools {
    pub generator: Arc<dyn TextGenerator>,
    pub web: Arc<dyn WebLookup>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn NeighborIndex>,
    pub feedback: Arc<dyn FeedbackRepository>,
}

/// Owns the engine's services and executes one query per call.
pub struct QueryExecutor {
    agent: AgentLoop,
    feedback: FeedbackService,
}

impl QueryExecutor {
    /// Builds an executor from explicit collaborators.
    pub fn new(config: ScoutConfig, tools: ExecutorTools) -> Result<Self> {
        config.validate()?;

        let sessions = Arc::new(SessionManager::new(
            config.compression,
            Duration::from_secs(config.session.ttl_secs),
        ));
        let ranking = RankingEngine::new(config.ranking, tools.feedback.clone());
        let retrieval = Arc::new(RetrievalGateway::new(
            tools.embedder,
            tools.index,
            ranking,
            config.agent.overfetch_factor,
        ));
        let agent = AgentLoop::new(
            sessions,
            retrieval,
            tools.generator,
            tools.web,
            config.agent,
        );
        let feedback = FeedbackService::new(tools.feedback);

        Ok(Self { agent, feedback })
    }

    /// Production wiring: configuration from the default TOML location,
    /// HTTP clients from environment variables, and the durable JSONL
    /// feedback log. Web lookup degrades to an always-failing placeholder
    /// when Google credentials are absent; the reasoning step then simply
    /// sees web lookups fail and routes around them.
    pub fn from_env() -> Result<Self> {
        let config = ConfigStorage::default_location()?.load()?;
        let timeout = Duration::from_secs(config.agent.tool_timeout_secs);

        let generator: Arc<dyn TextGenerator> =
            Arc::new(ChatCompletionGenerator::try_from_env()?.with_timeout(timeout));
        let web: Arc<dyn WebLookup> = match GoogleWebLookup::try_from_env() {
            Ok(lookup) => Arc::new(lookup.with_timeout(timeout)),
            Err(err) => {
                tracing::warn!(
                    target: "scout::executor",
                    error = %err,
                    "web lookup not configured, running retrieval-only"
                );
                Arc::new(UnconfiguredWebLookup)
            }
        };
        let embedder: Arc<dyn Embedder> =
            Arc::new(HttpEmbedder::try_from_env()?.with_timeout(timeout));
        let index: Arc<dyn NeighborIndex> =
            Arc::new(HttpNeighborIndex::try_from_env()?.with_timeout(timeout));
        let feedback: Arc<dyn FeedbackRepository> = Arc::new(JsonlFeedbackRepository::open(
            JsonlFeedbackRepository::default_path()?,
        )?);

        Self::new(
            config,
            ExecutorTools {
                generator,
                web,
                embedder,
                index,
                feedback,
            },
        )
    }

    /// Runs one query to completion.
    pub async fn execute(&self, session_id: &str, query: &str) -> Result<QueryOutcome> {
        self.execute_cancellable(session_id, query, CancellationToken::new())
            .await
    }

    /// Runs one query under a caller-held cancellation token (e.g., tied to
    /// a client disconnect).
    pub async fn execute_cancellable(
        &self,
        session_id: &str,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<QueryOutcome> {
        self.agent.run_query(session_id, query, &cancel).await
    }

    /// Records a feedback signal for a record, closing the loop into future
    /// rankings.
    pub async fn submit_feedback(
        &self,
        record_id: &str,
        signal: FeedbackSignal,
        query: Option<&str>,
    ) -> Result<()> {
        self.feedback.record(record_id, signal, query).await
    }

    /// Per-record feedback counts.
    pub async fn feedback_aggregate(&self, record_id: &str) -> Result<FeedbackAggregate> {
        self.feedback.aggregate(record_id).await
    }

    /// Overall feedback statistics.
    pub async fn feedback_stats(&self) -> Result<FeedbackStats> {
        self.feedback.stats().await
    }

    /// A copy of a session's current context, for inspection.
    pub async fn context_snapshot(&self, session_id: &str) -> Option<ConversationContext> {
        self.agent.sessions().snapshot(session_id).await
    }

    /// Sweeps sessions idle past the configured TTL; returns how many were
    /// removed. Intended to be called periodically by the host.
    pub async fn expire_idle_sessions(&self) -> usize {
        self.agent.sessions().expire_idle().await
    }

    /// Drops one session immediately.
    pub async fn expire_session(&self, session_id: &str) -> bool {
        self.agent.sessions().expire(session_id).await
    }
}

/// Installs the process-wide tracing subscriber: env-filtered, compact
/// console output. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
