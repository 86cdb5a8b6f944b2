//! Engine configuration.

use crate::context::CompressionPolicy;
use crate::error::{Result, ScoutError};
use crate::ranking::RankingConfig;
use serde::{Deserialize, Serialize};

/// Agent-loop tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Reasoning steps allowed per query.
    pub step_budget: u32,
    /// Deadline for every external tool call, in seconds.
    pub tool_timeout_secs: u64,
    /// Raw candidates fetched per requested result, giving the ranking
    /// engine room to reorder.
    pub overfetch_factor: usize,
    /// Results returned when the reasoning step does not ask for a count.
    pub default_top_k: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            step_budget: 6,
            tool_timeout_secs: 30,
            overfetch_factor: 3,
            default_top_k: 3,
        }
    }
}

/// Session lifecycle tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a session becomes eligible for expiry.
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

/// Top-level engine configuration, persisted as TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub ranking: RankingConfig,
    pub compression: CompressionPolicy,
    pub agent: AgentConfig,
    pub session: SessionConfig,
}

impl ScoutConfig {
    /// Rejects configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.ranking.alpha) {
            return Err(ScoutError::config(format!(
                "ranking.alpha must be within [0, 1], got {}",
                self.ranking.alpha
            )));
        }
        if self.ranking.confidence_z <= 0.0 {
            return Err(ScoutError::config(format!(
                "ranking.confidence_z must be positive, got {}",
                self.ranking.confidence_z
            )));
        }
        if !(self.ranking.neutral_score > 0.0 && self.ranking.neutral_score < 1.0) {
            return Err(ScoutError::config(format!(
                "ranking.neutral_score must lie strictly between 0 and 1, got {}",
                self.ranking.neutral_score
            )));
        }
        if self.agent.step_budget == 0 {
            return Err(ScoutError::config("agent.step_budget must be at least 1"));
        }
        if self.agent.overfetch_factor == 0 || self.agent.default_top_k == 0 {
            return Err(ScoutError::config(
                "agent.overfetch_factor and agent.default_top_k must be at least 1",
            ));
        }
        Ok(())
    }
}
