//! Per-session conversational state.
//!
//! A `ConversationContext` is owned exclusively by the session manager and
//! borrowed by the agent loop for the duration of one query. Transcript
//! growth is held in check by a compression policy that condenses the oldest
//! turns into a single summary entry while the working memory (distilled
//! facts) is always kept whole; facts are cheaper to keep than transcript.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    /// Engine-generated entries, including compression summaries.
    System,
}

/// One (role, content) entry of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl Turn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// When and how much of the transcript gets condensed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionPolicy {
    /// Total transcript size (characters) above which compression triggers.
    pub max_transcript_chars: usize,
    /// Number of most recent turns always preserved verbatim.
    pub keep_recent_turns: usize,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            max_transcript_chars: 6000,
            keep_recent_turns: 4,
        }
    }
}

/// One live session's accumulating state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub session_id: String,
    /// Ordered transcript; insertion order is significant.
    pub turns: Vec<Turn>,
    /// Distilled observations keyed by a stable content-derived key,
    /// deduplicated so a session never re-gathers what it already knows.
    pub working_memory: BTreeMap<String, String>,
    /// Reasoning steps left for the in-flight query.
    pub budget_remaining: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl ConversationContext {
    /// Creates an empty context for a session.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            session_id: session_id.into(),
            turns: Vec::new(),
            working_memory: BTreeMap::new(),
            budget_remaining: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Appends a turn and bumps the modification timestamp.
    pub fn append_turn(&mut self, role: TurnRole, content: impl Into<String>) {
        self.turns.push(Turn::new(role, content));
        self.touch();
    }

    /// Records a distilled fact; returns false when the key was already known.
    pub fn record_fact(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let inserted = self
            .working_memory
            .insert(key.into(), value.into())
            .is_none();
        if inserted {
            self.touch();
        }
        inserted
    }

    /// Resets the step budget at the start of a query.
    pub fn reset_budget(&mut self, steps: u32) {
        self.budget_remaining = steps;
    }

    /// Consumes one reasoning step; returns false once the budget is gone.
    pub fn consume_step(&mut self) -> bool {
        if self.budget_remaining == 0 {
            return false;
        }
        self.budget_remaining -= 1;
        true
    }

    /// Total transcript size in characters.
    pub fn transcript_chars(&self) -> usize {
        self.turns.iter().map(|t| t.content.chars().count()).sum()
    }

    /// Whether the transcript currently exceeds the policy budget and has a
    /// compressible prefix. Compressing a context for which this returns
    /// false is a no-op, which makes compression idempotent in effect.
    pub fn needs_compression(&self, policy: &CompressionPolicy) -> bool {
        self.transcript_chars() > policy.max_transcript_chars
            && self.compression_cut(policy) > 0
    }

    /// Index up to which turns may be condensed.
    ///
    /// The cut never reaches into the `keep_recent_turns` tail and never
    /// passes the most recent user turn, so an unanswered user question is
    /// always preserved verbatim.
    fn compression_cut(&self, policy: &CompressionPolicy) -> usize {
        let tail_start = self.turns.len().saturating_sub(policy.keep_recent_turns);
        let last_user = self
            .turns
            .iter()
            .rposition(|t| t.role == TurnRole::User)
            .unwrap_or(0);
        tail_start.min(last_user)
    }

    /// Returns the turns a summarizer should condense, or `None` when the
    /// context is under budget.
    pub fn compressible_prefix(&self, policy: &CompressionPolicy) -> Option<&[Turn]> {
        if !self.needs_compression(policy) {
            return None;
        }
        Some(&self.turns[..self.compression_cut(policy)])
    }

    /// Replaces the compressible prefix with one condensed system entry.
    ///
    /// `working_memory` is untouched by design. Calling this on an
    /// under-budget context does nothing.
    pub fn apply_compression(&mut self, policy: &CompressionPolicy, summary: impl Into<String>) {
        let cut = self.compression_cut(policy);
        if cut == 0 || !self.needs_compression(policy) {
            return;
        }
        let mut condensed = vec![Turn::new(
            TurnRole::System,
            format!("Earlier conversation (condensed): {}", summary.into()),
        )];
        condensed.extend(self.turns.split_off(cut));
        self.turns = condensed;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_chars: usize, keep: usize) -> CompressionPolicy {
        CompressionPolicy {
            max_transcript_chars: max_chars,
            keep_recent_turns: keep,
        }
    }

    fn filled_context(turn_count: usize) -> ConversationContext {
        let mut ctx = ConversationContext::new("s1");
        for i in 0..turn_count {
            let role = if i % 2 == 0 {
                TurnRole::User
            } else {
                TurnRole::Assistant
            };
            ctx.append_turn(role, format!("turn {i} with some padding text"));
        }
        ctx
    }

    #[test]
    fn under_budget_context_is_not_compressed() {
        let mut ctx = filled_context(4);
        let policy = policy(100_000, 2);
        assert!(!ctx.needs_compression(&policy));

        let before = ctx.turns.clone();
        ctx.apply_compression(&policy, "should not be applied");
        assert_eq!(ctx.turns, before);
    }

    #[test]
    fn compression_preserves_recent_tail_and_memory() {
        let mut ctx = filled_context(10);
        ctx.record_fact("record:r1", "Apex Roofing, Brooklyn");
        let policy = policy(10, 3);

        let prefix_len = ctx.compressible_prefix(&policy).unwrap().len();
        assert_eq!(prefix_len, 7);

        let tail: Vec<String> = ctx.turns[7..].iter().map(|t| t.content.clone()).collect();
        ctx.apply_compression(&policy, "they asked about roofers");

        // one summary turn plus the verbatim tail
        assert_eq!(ctx.turns.len(), 1 + tail.len());
        assert_eq!(ctx.turns[0].role, TurnRole::System);
        assert!(ctx.turns[0].content.contains("they asked about roofers"));
        for (turn, expected) in ctx.turns[1..].iter().zip(tail) {
            assert_eq!(turn.content, expected);
        }
        assert_eq!(
            ctx.working_memory.get("record:r1").map(String::as_str),
            Some("Apex Roofing, Brooklyn")
        );
    }

    #[test]
    fn compression_never_drops_latest_user_turn() {
        let mut ctx = ConversationContext::new("s1");
        ctx.append_turn(TurnRole::User, "old question about siding contractors");
        ctx.append_turn(TurnRole::Assistant, "old answer with several suggestions");
        ctx.append_turn(TurnRole::User, "which roofers have not been contacted?");
        // keep_recent_turns = 0 would otherwise allow condensing everything
        let policy = policy(10, 0);

        ctx.apply_compression(&policy, "summary");
        let last = ctx.turns.last().unwrap();
        assert_eq!(last.role, TurnRole::User);
        assert!(last.content.contains("which roofers"));
    }

    #[test]
    fn compression_is_idempotent_once_under_budget() {
        // ~30 chars per turn, 10 turns: over a 200-char budget before the
        // first pass, comfortably under it afterwards.
        let mut ctx = filled_context(10);
        let policy = policy(200, 3);
        assert!(ctx.needs_compression(&policy));

        ctx.apply_compression(&policy, "short recap");
        assert!(!ctx.needs_compression(&policy));
        let after_first = ctx.turns.clone();

        ctx.apply_compression(&policy, "second pass must not apply");
        assert_eq!(ctx.turns, after_first);
    }

    #[test]
    fn record_fact_deduplicates_by_key() {
        let mut ctx = ConversationContext::new("s1");
        assert!(ctx.record_fact("k", "v1"));
        assert!(!ctx.record_fact("k", "v2"));
        assert_eq!(ctx.working_memory.len(), 1);
    }

    #[test]
    fn step_budget_counts_down_to_zero() {
        let mut ctx = ConversationContext::new("s1");
        ctx.reset_budget(2);
        assert!(ctx.consume_step());
        assert!(ctx.consume_step());
        assert!(!ctx.consume_step());
        assert_eq!(ctx.budget_remaining, 0);
    }
}
