//! End-to-end engine tests over stubbed external collaborators.

use async_trait::async_trait;
use scout_core::config::ScoutConfig;
use scout_core::error::{Result, ScoutError};
use scout_core::feedback::FeedbackSignal;
use scout_core::record::Record;
use scout_core::tools::{Embedder, NeighborIndex, ScoreOrder, TextGenerator, WebHit, WebLookup};
use scout_execution::{ExecutorTools, QueryExecutor};
use scout_infrastructure::InMemoryFeedbackRepository;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedGenerator {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ScoutError::tool_failed("text_generation", "script ended"))
    }
}

struct StubEmbedder;

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.25; 8])
    }
}

struct StubIndex {
    candidates: Vec<(Record, f64)>,
}

#[async_trait]
impl NeighborIndex for StubIndex {
    async fn nearest(&self, _embedding: &[f32], _k: usize) -> Result<Vec<(Record, f64)>> {
        Ok(self.candidates.clone())
    }

    fn score_order(&self) -> ScoreOrder {
        ScoreOrder::SimilarityDescending
    }
}

struct NoWeb;

#[async_trait]
impl WebLookup for NoWeb {
    async fn lookup(&self, _query: &str) -> Result<Vec<WebHit>> {
        Ok(Vec::new())
    }
}

fn contractors() -> Vec<(Record, f64)> {
    // identical similarity on purpose: only feedback can separate them
    vec![
        (
            Record::new("r-apex")
                .with_attribute("name", "Apex Roofing")
                .with_attribute("address", "Brooklyn, NY")
                .with_attribute("phone", "(718) 555-0100"),
            0.8,
        ),
        (
            Record::new("r-borough")
                .with_attribute("name", "Borough Siding")
                .with_attribute("address", "Queens, NY")
                .with_attribute("url", "https://borough.example"),
            0.8,
        ),
    ]
}

const RETRIEVE: &str = r#"{"action": "retrieve", "query": "roofers in new york"}"#;
const ANSWER: &str = r#"{"action": "answer", "content": "Start with the top-ranked contractor."}"#;

fn executor(generator: ScriptedGenerator) -> QueryExecutor {
    QueryExecutor::new(
        ScoutConfig::default(),
        ExecutorTools {
            generator: Arc::new(generator),
            web: Arc::new(NoWeb),
            embedder: Arc::new(StubEmbedder),
            index: Arc::new(StubIndex {
                candidates: contractors(),
            }),
            feedback: Arc::new(InMemoryFeedbackRepository::new()),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn query_produces_answer_records_and_suggestions() {
    let executor = executor(ScriptedGenerator::new(&[RETRIEVE, ANSWER]));

    let outcome = executor.execute("s1", "who should we call?").await.unwrap();

    assert_eq!(outcome.answer, "Start with the top-ranked contractor.");
    assert_eq!(outcome.used_records.len(), 2);
    assert_eq!(outcome.suggestions.len(), 2);
    // phone on file wins over email
    assert_eq!(outcome.suggestions[0].contact_method, "phone");

    let snapshot = executor.context_snapshot("s1").await.unwrap();
    assert_eq!(snapshot.turns.len(), 2);
    assert!(!snapshot.working_memory.is_empty());
}

#[tokio::test]
async fn feedback_shifts_the_next_ranking() {
    // Two queries, with accumulating positive feedback on the second-ranked
    // record in between. Identical similarity, so the Wilson-blended
    // confidence decides the order on the second query.
    let executor = executor(ScriptedGenerator::new(&[
        RETRIEVE, ANSWER, RETRIEVE, ANSWER,
    ]));

    let first = executor.execute("s1", "find roofers").await.unwrap();
    // no feedback yet: tie broken by record id
    assert_eq!(first.used_records[0].record.id, "r-apex");

    for _ in 0..10 {
        executor
            .submit_feedback("r-borough", FeedbackSignal::Positive, Some("find roofers"))
            .await
            .unwrap();
    }
    let aggregate = executor.feedback_aggregate("r-borough").await.unwrap();
    assert_eq!((aggregate.positive_count, aggregate.total_count), (10, 10));

    let second = executor.execute("s2", "find roofers").await.unwrap();
    assert_eq!(second.used_records[0].record.id, "r-borough");
    assert!(second.used_records[0].final_score > second.used_records[1].final_score);

    let stats = executor.feedback_stats().await.unwrap();
    assert_eq!(stats.total, 10);
    assert_eq!(stats.positive_ratio, 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_queries_on_one_session_serialize() {
    // Concurrent execution must produce the same final context shape as
    // running the two queries back to back.
    let executor = Arc::new(executor(ScriptedGenerator::new(&[
        RETRIEVE, ANSWER, RETRIEVE, ANSWER,
    ])));

    let a = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.execute("shared", "first question").await })
    };
    let b = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.execute("shared", "second question").await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let snapshot = executor.context_snapshot("shared").await.unwrap();
    assert_eq!(snapshot.turns.len(), 4);
    // each query's user/assistant pair is adjacent: no interleaving
    for pair in snapshot.turns.chunks(2) {
        assert_eq!(pair[0].role, scout_core::context::TurnRole::User);
        assert_eq!(pair[1].role, scout_core::context::TurnRole::Assistant);
    }
}

#[tokio::test]
async fn session_expiry_is_explicit_and_advisory() {
    let executor = executor(ScriptedGenerator::new(&[ANSWER]));
    executor.execute("s1", "anything").await.unwrap();

    assert!(executor.context_snapshot("s1").await.is_some());
    assert!(executor.expire_session("s1").await);
    assert!(executor.context_snapshot("s1").await.is_none());
    // expiring again is a no-op, not an error
    assert!(!executor.expire_session("s1").await);
}
