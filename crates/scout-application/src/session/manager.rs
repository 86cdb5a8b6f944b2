//! Session lifecycle and same-session serialization.
//!
//! The manager exclusively owns every [`ConversationContext`], keyed by
//! session id. A query borrows its session's context through a guard that
//! holds the per-session lock, so at most one agent loop is ever in flight
//! per session; a second query for the same session queues behind the first
//! instead of being dropped. Queries for different
//! sessions share no mutable state and proceed fully concurrently.

use crate::prompts;
use scout_core::context::{CompressionPolicy, ConversationContext, TurnRole};
use scout_core::error::{Result, ScoutError};
use scout_core::tools::TextGenerator;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

struct SessionSlot {
    context: Arc<Mutex<ConversationContext>>,
    last_touched: StdRwLock<Instant>,
}

impl SessionSlot {
    fn new(session_id: &str) -> Self {
        Self {
            context: Arc::new(Mutex::new(ConversationContext::new(session_id))),
            last_touched: StdRwLock::new(Instant::now()),
        }
    }

    fn touch(&self) {
        if let Ok(mut touched) = self.last_touched.write() {
            *touched = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_touched
            .read()
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }
}

/// Exclusive borrow of one session's context for the duration of one query.
///
/// Dropping the guard releases the session lock and marks the session as
/// recently used, which is what keeps TTL expiry away from active sessions.
pub struct SessionGuard {
    guard: OwnedMutexGuard<ConversationContext>,
    slot: Arc<SessionSlot>,
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard").finish_non_exhaustive()
    }
}

impl std::ops::Deref for SessionGuard {
    type Target = ConversationContext;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl std::ops::DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.slot.touch();
    }
}

/// Owns all live sessions and their lifecycle.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
    compression: CompressionPolicy,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(compression: CompressionPolicy, ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            compression,
            ttl,
        }
    }

    pub fn compression_policy(&self) -> &CompressionPolicy {
        &self.compression
    }

    /// Acquires the session's context, creating the session on first use.
    /// Queues behind an in-flight query for the same session.
    pub async fn begin(&self, session_id: &str) -> SessionGuard {
        let slot = self.get_or_create(session_id).await;
        let guard = slot.context.clone().lock_owned().await;
        SessionGuard { guard, slot }
    }

    /// Like [`Self::begin`] but fails with `SessionBusy` instead of queuing.
    pub async fn try_begin(&self, session_id: &str) -> Result<SessionGuard> {
        let slot = self.get_or_create(session_id).await;
        let guard = slot
            .context
            .clone()
            .try_lock_owned()
            .map_err(|_| ScoutError::SessionBusy(session_id.to_string()))?;
        Ok(SessionGuard { guard, slot })
    }

    /// Appends a turn outside an agent-loop borrow (queues if one is active).
    pub async fn append_turn(&self, session_id: &str, role: TurnRole, content: &str) {
        let mut guard = self.begin(session_id).await;
        guard.append_turn(role, content);
    }

    /// Records a distilled fact outside an agent-loop borrow.
    pub async fn record_fact(&self, session_id: &str, key: &str, value: &str) -> bool {
        let mut guard = self.begin(session_id).await;
        guard.record_fact(key, value)
    }

    /// Returns a copy of the session's current context, or `None` for an
    /// unknown session. Queues behind an in-flight query.
    pub async fn snapshot(&self, session_id: &str) -> Option<ConversationContext> {
        let slot = {
            let sessions = self.sessions.read().await;
            sessions.get(session_id).cloned()
        }?;
        let context = slot.context.lock().await;
        Some(context.clone())
    }

    /// Condenses the transcript when it exceeds the configured budget.
    ///
    /// Summarization is delegated to the text-generation tool. A tool-level
    /// failure leaves the transcript uncompressed and returns `Ok(false)`
    /// rather than failing the query: an over-long context is still a
    /// correct one. Returns `Ok(true)` when a summary was applied.
    pub async fn maybe_compress(
        &self,
        context: &mut ConversationContext,
        summarizer: &dyn TextGenerator,
    ) -> Result<bool> {
        let Some(prefix) = context.compressible_prefix(&self.compression) else {
            return Ok(false);
        };
        let prompt = prompts::render_summary(prefix)?;

        match summarizer.generate(&prompt).await {
            Ok(summary) => {
                let condensed_turns = prefix.len();
                context.apply_compression(&self.compression, summary.trim());
                tracing::debug!(
                    target: "scout::session",
                    session_id = %context.session_id,
                    condensed_turns,
                    "compressed transcript prefix"
                );
                Ok(true)
            }
            Err(err) if err.is_tool_level() => {
                tracing::warn!(
                    target: "scout::session",
                    session_id = %context.session_id,
                    error = %err,
                    "summarizer unavailable, keeping transcript uncompressed"
                );
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Compresses a session's transcript if it is over budget, queueing
    /// behind any in-flight query first.
    pub async fn compress(
        &self,
        session_id: &str,
        summarizer: &dyn TextGenerator,
    ) -> Result<bool> {
        let mut guard = self.begin(session_id).await;
        self.maybe_compress(&mut guard, summarizer).await
    }

    /// Removes sessions idle past the TTL. Advisory cleanup: an in-flight
    /// session is never touched, and a late expiry costs memory, not
    /// correctness. Returns how many sessions were removed.
    pub async fn expire_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|session_id, slot| {
            // try_lock failing means a query is in flight right now
            let expired = slot.context.try_lock().is_ok() && slot.idle_for() >= self.ttl;
            if expired {
                tracing::debug!(
                    target: "scout::session",
                    session_id = %session_id,
                    "expiring idle session"
                );
            }
            !expired
        });
        before - sessions.len()
    }

    /// Drops a session immediately, regardless of idle time.
    pub async fn expire(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id).is_some()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn get_or_create(&self, session_id: &str) -> Arc<SessionSlot> {
        {
            let sessions = self.sessions.read().await;
            if let Some(slot) = sessions.get(session_id) {
                return slot.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(SessionSlot::new(session_id)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::error::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSummarizer;

    #[async_trait::async_trait]
    impl TextGenerator for FixedSummarizer {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok("they discussed roofers in brooklyn".to_string())
        }
    }

    struct DownSummarizer;

    #[async_trait::async_trait]
    impl TextGenerator for DownSummarizer {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(ScoutError::tool_timeout("text_generation", 30_000))
        }
    }

    fn manager() -> SessionManager {
        SessionManager::new(CompressionPolicy::default(), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn get_or_create_returns_the_same_session() {
        let manager = manager();
        {
            let mut guard = manager.begin("s1").await;
            guard.append_turn(TurnRole::User, "hello");
        }
        let guard = manager.begin("s1").await;
        assert_eq!(guard.turns.len(), 1);
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn try_begin_reports_busy_while_a_query_is_in_flight() {
        let manager = manager();
        let _held = manager.begin("s1").await;

        let err = manager.try_begin("s1").await.unwrap_err();
        assert!(err.is_session_busy());

        // other sessions are unaffected
        assert!(manager.try_begin("s2").await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_session_queries_serialize() {
        let manager = Arc::new(manager());
        let in_flight = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..8 {
            let manager = manager.clone();
            let in_flight = in_flight.clone();
            handles.push(tokio::spawn(async move {
                let mut guard = manager.begin("shared").await;
                // at most one borrow may exist at a time
                assert_eq!(in_flight.fetch_add(1, Ordering::SeqCst), 0);
                guard.append_turn(TurnRole::User, format!("q{i}"));
                tokio::time::sleep(Duration::from_millis(5)).await;
                guard.append_turn(TurnRole::Assistant, format!("a{i}"));
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // every query's two turns are adjacent: mutations never interleaved
        let snapshot = manager.snapshot("shared").await.unwrap();
        assert_eq!(snapshot.turns.len(), 16);
        for pair in snapshot.turns.chunks(2) {
            let q = pair[0].content.strip_prefix('q').unwrap();
            let a = pair[1].content.strip_prefix('a').unwrap();
            assert_eq!(q, a);
        }
    }

    #[tokio::test]
    async fn compression_runs_only_over_budget() {
        let manager = SessionManager::new(
            CompressionPolicy {
                max_transcript_chars: 80,
                keep_recent_turns: 2,
            },
            Duration::from_secs(3600),
        );

        let mut guard = manager.begin("s1").await;
        assert!(!manager
            .maybe_compress(&mut guard, &FixedSummarizer)
            .await
            .unwrap());

        for i in 0..6 {
            guard.append_turn(TurnRole::User, format!("question number {i} about roofers"));
        }
        assert!(manager
            .maybe_compress(&mut guard, &FixedSummarizer)
            .await
            .unwrap());
        assert!(guard.turns[0].content.contains("roofers in brooklyn"));
    }

    #[tokio::test]
    async fn summarizer_outage_leaves_transcript_intact() {
        let manager = SessionManager::new(
            CompressionPolicy {
                max_transcript_chars: 10,
                keep_recent_turns: 1,
            },
            Duration::from_secs(3600),
        );

        let mut guard = manager.begin("s1").await;
        for i in 0..4 {
            guard.append_turn(TurnRole::User, format!("long enough question {i}"));
        }
        let before = guard.turns.len();

        let compressed = manager
            .maybe_compress(&mut guard, &DownSummarizer)
            .await
            .unwrap();
        assert!(!compressed);
        assert_eq!(guard.turns.len(), before);
    }

    #[tokio::test]
    async fn idle_sessions_expire_but_active_ones_do_not() {
        let manager = SessionManager::new(CompressionPolicy::default(), Duration::from_millis(10));

        manager.append_turn("idle", TurnRole::User, "hello").await;
        let _active = manager.begin("active").await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        let removed = manager.expire_idle().await;

        assert_eq!(removed, 1);
        assert!(manager.snapshot("idle").await.is_none());
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn explicit_expiry_removes_the_session() {
        let manager = manager();
        manager.append_turn("s1", TurnRole::User, "hi").await;
        assert!(manager.expire("s1").await);
        assert!(!manager.expire("s1").await);
        assert!(manager.is_empty().await);
    }
}
