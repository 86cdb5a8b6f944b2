//! Durable feedback store backed by an append-only JSONL event log.
//!
//! The log is the source of truth: one JSON event per line, never edited,
//! never deleted. Aggregates are maintained incrementally in memory and
//! rebuilt from the log on open, so they can never drift from the events
//! across restarts. Appends take an exclusive file lock and fsync before the
//! in-memory view is updated; a failed write surfaces to the caller instead
//! of leaving a stale aggregate pretending the event landed.

use async_trait::async_trait;
use fs2::FileExt;
use scout_core::error::{Result, ScoutError};
use scout_core::feedback::{FeedbackAggregate, FeedbackEvent, FeedbackRepository, FeedbackSignal, FeedbackStats};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
struct LogState {
    aggregates: HashMap<String, FeedbackAggregate>,
    positive: u64,
    negative: u64,
}

impl LogState {
    fn apply(&mut self, event: &FeedbackEvent) {
        self.aggregates
            .entry(event.record_id.clone())
            .or_default()
            .apply(event.signal);
        match event.signal {
            FeedbackSignal::Positive => self.positive += 1,
            FeedbackSignal::Negative => self.negative += 1,
        }
    }
}

/// File-backed [`FeedbackRepository`].
pub struct JsonlFeedbackRepository {
    path: PathBuf,
    // One mutex covers both the file append and the aggregate update, so
    // concurrent writers within the process serialize and the in-memory view
    // always reflects a prefix of the log.
    state: Mutex<LogState>,
}

impl JsonlFeedbackRepository {
    /// Opens the log at `path`, creating parent directories as needed, and
    /// rebuilds aggregates from the existing events.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let state = if path.exists() {
            Self::replay(&path)?
        } else {
            LogState::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// The default log location under the user's data directory.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::data_dir()
            .ok_or_else(|| ScoutError::config("no data directory available on this platform"))?;
        Ok(base.join("scout").join("feedback.jsonl"))
    }

    fn replay(path: &Path) -> Result<LogState> {
        let file = File::open(path)
            .map_err(|e| ScoutError::storage(format!("cannot open feedback log: {e}")))?;
        let reader = BufReader::new(file);
        let mut state = LogState::default();

        for (line_no, line) in reader.lines().enumerate() {
            let line =
                line.map_err(|e| ScoutError::storage(format!("cannot read feedback log: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<FeedbackEvent>(&line) {
                Ok(event) => state.apply(&event),
                Err(err) => {
                    // A torn final append can leave a truncated line; skip it
                    // rather than refusing to open the whole log.
                    tracing::warn!(
                        target: "scout::feedback",
                        line = line_no + 1,
                        error = %err,
                        "skipping unreadable feedback log line"
                    );
                }
            }
        }
        Ok(state)
    }

    fn append_line(&self, event: &FeedbackEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ScoutError::storage(format!("cannot open feedback log: {e}")))?;

        file.lock_exclusive()
            .map_err(|e| ScoutError::storage(format!("cannot lock feedback log: {e}")))?;
        let result = Self::write_locked(&file, line.as_bytes());
        let _ = fs2::FileExt::unlock(&file);
        result
    }

    fn write_locked(mut file: &File, bytes: &[u8]) -> Result<()> {
        file.write_all(bytes)
            .map_err(|e| ScoutError::storage(format!("cannot append feedback event: {e}")))?;
        file.sync_data()
            .map_err(|e| ScoutError::storage(format!("cannot sync feedback log: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl FeedbackRepository for JsonlFeedbackRepository {
    async fn append(&self, event: FeedbackEvent) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ScoutError::internal("feedback state lock poisoned"))?;
        self.append_line(&event)?;
        state.apply(&event);
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
        Ok(FeedbackStats::from_counts(state.positive, state.negative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::feedback::FeedbackSignal;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn event(record_id: &str, signal: FeedbackSignal) -> FeedbackEvent {
        FeedbackEvent::new(record_id, signal).with_query("roofers in brooklyn")
    }

    #[tokio::test]
    async fn append_then_aggregate() {
        let dir = TempDir::new().unwrap();
        let repo = JsonlFeedbackRepository::open(dir.path().join("feedback.jsonl")).unwrap();

        repo.append(event("r1", FeedbackSignal::Positive)).await.unwrap();
        repo.append(event("r1", FeedbackSignal::Negative)).await.unwrap();
        repo.append(event("r2", FeedbackSignal::Positive)).await.unwrap();

        let agg = repo.aggregate("r1").await.unwrap();
        assert_eq!(agg.positive_count, 1);
        assert_eq!(agg.total_count, 2);

        // unseen records report the zero aggregate, not an error
        assert_eq!(
            repo.aggregate("never-seen").await.unwrap(),
            FeedbackAggregate::default()
        );

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.positive, 2);
    }

    #[tokio::test]
    async fn aggregates_rebuild_from_log_on_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.jsonl");

        {
            let repo = JsonlFeedbackRepository::open(&path).unwrap();
            repo.append(event("r1", FeedbackSignal::Positive)).await.unwrap();
            repo.append(event("r1", FeedbackSignal::Positive)).await.unwrap();
            repo.append(event("r1", FeedbackSignal::Negative)).await.unwrap();
        }

        let reopened = JsonlFeedbackRepository::open(&path).unwrap();
        let agg = reopened.aggregate("r1").await.unwrap();
        assert_eq!(agg.positive_count, 2);
        assert_eq!(agg.total_count, 3);
    }

    #[tokio::test]
    async fn torn_final_line_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.jsonl");

        {
            let repo = JsonlFeedbackRepository::open(&path).unwrap();
            repo.append(event("r1", FeedbackSignal::Positive)).await.unwrap();
        }
        // simulate a crash mid-append
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"record_id\":\"r2\",\"sig").unwrap();
        drop(file);

        let reopened = JsonlFeedbackRepository::open(&path).unwrap();
        assert_eq!(reopened.aggregate("r1").await.unwrap().total_count, 1);
        assert_eq!(reopened.aggregate("r2").await.unwrap().total_count, 0);
    }

    #[tokio::test]
    async fn concurrent_writers_on_one_record_lose_no_events() {
        let dir = TempDir::new().unwrap();
        let repo =
            Arc::new(JsonlFeedbackRepository::open(dir.path().join("feedback.jsonl")).unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let signal = if i % 2 == 0 {
                    FeedbackSignal::Positive
                } else {
                    FeedbackSignal::Negative
                };
                repo.append(FeedbackEvent::new("shared", signal)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let agg = repo.aggregate("shared").await.unwrap();
        assert_eq!(agg.total_count, 16);
        assert_eq!(agg.positive_count, 8);
    }
}
