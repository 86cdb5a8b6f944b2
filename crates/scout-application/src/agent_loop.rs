//! The reasoning/acting/observing loop.
//!
//! One query runs `Reasoning -> ActionSelected -> Observing -> (Reasoning |
//! Answering) -> Done` with an explicit step counter and an explicit
//! loop-guard key, so termination is provable: the loop ends on an `answer`
//! action, on budget exhaustion (with a best-effort answer, never an
//! unhandled failure), or when the reasoning step repeats an identical tool
//! action back to back.

use crate::outreach::{self, OutreachSuggestion};
use crate::prompts;
use crate::retrieval::RetrievalGateway;
use crate::session::SessionManager;
use scout_core::agent::{AgentAction, Observation, ObservationKind, parse_action};
use scout_core::config::AgentConfig;
use scout_core::context::{ConversationContext, TurnRole};
use scout_core::error::{Result, ScoutError};
use scout_core::record::RankedResult;
use scout_core::tools::{TextGenerator, WebHit, WebLookup};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What a completed query returns to the caller: the recommendation, the
/// records it was actually built from (so feedback can target specific
/// record ids), and the derived follow-up suggestions.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub used_records: Vec<RankedResult>,
    pub suggestions: Vec<OutreachSuggestion>,
    pub steps_taken: u32,
}

/// Drives one query through the reasoning loop against a session's context.
pub struct AgentLoop {
    sessions: Arc<SessionManager>,
    retrieval: Arc<RetrievalGateway>,
    generator: Arc<dyn TextGenerator>,
    web: Arc<dyn WebLookup>,
    config: AgentConfig,
}

impl AgentLoop {
    pub fn new(
        sessions: Arc<SessionManager>,
        retrieval: Arc<RetrievalGateway>,
        generator: Arc<dyn TextGenerator>,
        web: Arc<dyn WebLookup>,
        config: AgentConfig,
    ) -> Self {
        Self {
            sessions,
            retrieval,
            generator,
            web,
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Runs one query to completion.
    ///
    /// Serializes behind any in-flight query for the same session, then
    /// borrows the context exclusively until the answer is appended. The
    /// cancellation token is honored between steps: the context keeps
    /// everything up to the last fully-completed step and nothing partial.
    pub async fn run_query(
        &self,
        session_id: &str,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ScoutError::internal("query cannot be empty"));
        }

        let mut context = self.sessions.begin(session_id).await;
        context.append_turn(TurnRole::User, query);
        context.reset_budget(self.config.step_budget);
        self.sessions
            .maybe_compress(&mut context, self.generator.as_ref())
            .await?;

        let mut observations: Vec<Observation> = Vec::new();
        let mut used_records: Vec<RankedResult> = Vec::new();
        let mut last_guard_key = None;

        let answer = loop {
            if cancel.is_cancelled() {
                return Err(ScoutError::Cancelled(session_id.to_string()));
            }
            if !context.consume_step() {
                tracing::warn!(
                    target: "scout::agent_loop",
                    session_id = %session_id,
                    "step budget exhausted, forcing a best-effort answer"
                );
                break self.best_effort_answer(query, &context).await;
            }
            let step = self.config.step_budget - context.budget_remaining;

            let action = match self.decide(query, &context, &observations).await {
                Ok(action) => action,
                Err(err) if err.is_tool_level() => {
                    tracing::warn!(
                        target: "scout::agent_loop",
                        session_id = %session_id,
                        step,
                        error = %err,
                        "reasoning call failed, retrying within budget"
                    );
                    continue;
                }
                // Protocol violations and storage failures are request-level.
                Err(err) => return Err(err),
            };

            tracing::debug!(
                target: "scout::agent_loop",
                session_id = %session_id,
                step,
                action = %action.kind(),
                "action selected"
            );

            if let Some(key) = action.loop_guard_key() {
                if last_guard_key == Some(key) {
                    tracing::warn!(
                        target: "scout::agent_loop",
                        session_id = %session_id,
                        step,
                        action = %action.kind(),
                        "loop-guard: identical action repeated, terminating"
                    );
                    break self.best_effort_answer(query, &context).await;
                }
                last_guard_key = Some(key);
            }

            let observation = match action {
                AgentAction::Answer { content } => break content,
                AgentAction::Retrieve {
                    query: search,
                    top_k,
                    filters,
                } => {
                    self.observe_retrieval(&search, top_k, &filters, &mut used_records)
                        .await
                }
                AgentAction::WebLookup { query: search } => self.observe_web(&search).await,
            };

            if observation.failed {
                tracing::warn!(
                    target: "scout::agent_loop",
                    session_id = %session_id,
                    step,
                    reason = observation.reason.as_deref().unwrap_or("unknown"),
                    "tool execution failed"
                );
            } else {
                context.record_fact(observation.key.clone(), observation.content.clone());
            }
            observations.push(observation);
        };

        context.append_turn(TurnRole::Assistant, answer.clone());
        let today = chrono::Utc::now().date_naive();
        let suggestions = outreach::suggest_all(used_records.iter().map(|r| &r.record), today);
        let steps_taken = self.config.step_budget - context.budget_remaining;

        Ok(QueryOutcome {
            answer,
            used_records,
            suggestions,
            steps_taken,
        })
    }

    /// One reasoning step: render the prompt, call the generator, validate
    /// the response into the closed action set.
    async fn decide(
        &self,
        query: &str,
        context: &ConversationContext,
        observations: &[Observation],
    ) -> Result<AgentAction> {
        let prompt = prompts::render_reasoning(query, context, observations)?;
        let response = self.call_generator(&prompt).await?;
        parse_action(&response)
    }

    async fn call_generator(&self, prompt: &str) -> Result<String> {
        self.with_deadline("text_generation", self.generator.generate(prompt))
            .await
    }

    async fn observe_retrieval(
        &self,
        search: &str,
        top_k: Option<usize>,
        filters: &BTreeMap<String, String>,
        used_records: &mut Vec<RankedResult>,
    ) -> Observation {
        let k = top_k.unwrap_or(self.config.default_top_k);
        match self
            .with_deadline("retrieval", self.retrieval.search(search, k, filters))
            .await
        {
            Ok(results) if results.is_empty() => Observation::success(
                ObservationKind::Retrieval,
                format!("no records matched '{search}'"),
            ),
            Ok(results) => {
                let content = describe_results(&results);
                for result in results {
                    if !used_records.iter().any(|r| r.record.id == result.record.id) {
                        used_records.push(result);
                    }
                }
                Observation::success(ObservationKind::Retrieval, content)
            }
            Err(err) => Observation::failure(ObservationKind::Retrieval, err.to_string()),
        }
    }

    async fn observe_web(&self, search: &str) -> Observation {
        match self
            .with_deadline("web_lookup", self.web.lookup(search))
            .await
        {
            Ok(hits) if hits.is_empty() => Observation::success(
                ObservationKind::WebLookup,
                format!("no web results for '{search}'"),
            ),
            Ok(hits) => Observation::success(ObservationKind::WebLookup, describe_hits(&hits)),
            Err(err) => Observation::failure(ObservationKind::WebLookup, err.to_string()),
        }
    }

    /// Produces an answer when the loop must stop without the model choosing
    /// one. Tries the generator over the gathered facts first; if it is down
    /// too, synthesizes a plain listing locally. Never fails.
    async fn best_effort_answer(&self, query: &str, context: &ConversationContext) -> String {
        if !context.working_memory.is_empty() {
            if let Ok(prompt) = prompts::render_final_answer(query, &context.working_memory) {
                if let Ok(text) = self.call_generator(&prompt).await {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        return trimmed.to_string();
                    }
                }
            }
        }
        synthesize_answer(query, &context.working_memory)
    }

    async fn with_deadline<T, F>(&self, tool: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let deadline = Duration::from_secs(self.config.tool_timeout_secs);
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(ScoutError::tool_timeout(tool, deadline.as_millis() as u64)),
        }
    }
}

fn describe_results(results: &[RankedResult]) -> String {
    results
        .iter()
        .map(|r| {
            let record = &r.record;
            let mut line = format!("{} (id {})", record.display_name(), record.id);
            for key in ["address", "phone", "url"] {
                if let Some(value) = record.attribute_str(key) {
                    if !value.is_empty() {
                        line.push_str(&format!(" | {value}"));
                    }
                }
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_hits(hits: &[WebHit]) -> String {
    hits.iter()
        .map(|hit| format!("{}: {} ({})", hit.title, hit.snippet, hit.url))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Local fallback answer assembled from working memory alone.
fn synthesize_answer(query: &str, memory: &BTreeMap<String, String>) -> String {
    if memory.is_empty() {
        format!(
            "I could not gather any supporting information for \"{query}\": \
             every lookup failed. Please try again shortly."
        )
    } else {
        let facts: Vec<String> = memory.values().map(|v| format!("- {v}")).collect();
        format!(
            "I ran out of reasoning steps before finishing \"{query}\". \
             Here is what I gathered:\n{}",
            facts.join("\n")
        )
    }
}
