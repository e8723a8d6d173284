use async_trait::async_trait;
use audit_analyzer::{
    AnalysisError, AnalyzerConfig, ChunkAnalyzer, ClassificationRequest, Classifier,
    ClassifierError, ProtocolViolation, RoundFailure,
};
use audit_chunker::{Chunker, ChunkerConfig};
use audit_context::{ContextBuilder, ContextLimits};
use audit_index::{ChunkIndex, HashEmbedder};
use audit_protocol::{Corpus, Document, Flag};
use audit_references::{ReferenceResolver, ResolverConfig};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const MANUAL: &str = "\
## 1 Scope

The organisation maintains components of the fleet.

## 2 Components

Critical parts are handled per the applicable procedure.
";

const REGULATION: &str = "\
145.A.42 Components

Critical parts shall be identified and controlled.
";

/// Replays a fixed script of responses and records every request it sees
struct Scripted {
    responses: Mutex<VecDeque<Response>>,
    seen: Mutex<Vec<ClassificationRequest>>,
}

enum Response {
    Json(Value),
    Fail,
    Hang,
}

impl Scripted {
    fn new(responses: Vec<Response>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ClassificationRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn classify(&self, request: &ClassificationRequest) -> Result<Value, ClassifierError> {
        self.seen.lock().unwrap().push(request.clone());
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Response::Json(value)) => Ok(value),
            Some(Response::Fail) | None => {
                Err(ClassifierError::Request("connection reset".to_string()))
            }
            Some(Response::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ClassifierError::Unavailable("woke up".to_string()))
            }
        }
    }
}

fn verdict(flag: &str, severity: u8, query: Option<&str>) -> Response {
    Response::Json(json!({
        "flag": flag,
        "severity_score": severity,
        "regulation_references": ["145.A.42"],
        "findings": "Critical part handling is referenced but not described.",
        "gaps": ["No critical part procedure"],
        "citations": {"manual_section": "2", "regulation_sections": ["145.A.42"]},
        "recommendations": ["Describe the critical part procedure."],
        "needs_additional_context": query.is_some(),
        "context_query": query
    }))
}

fn document(id: &str, corpus: Corpus, text: &str) -> Document {
    Chunker::new(ChunkerConfig::default())
        .expect("config")
        .chunk_into_document(id, corpus, id, text)
        .expect("chunks")
}

async fn context_builder() -> (ContextBuilder, Document) {
    let manual = document("moe", Corpus::Manual, MANUAL);
    let regulation = document("part145", Corpus::Regulation, REGULATION);
    let mut index = ChunkIndex::new(Arc::new(HashEmbedder::new(64)));
    index.upsert_document(&manual).await.expect("index manual");
    index.upsert_document(&regulation).await.expect("index regulation");

    let context = ContextBuilder::new(
        index.into_shared(),
        ReferenceResolver::new(ResolverConfig::default()),
        ContextLimits::default(),
    )
    .expect("context");
    (context, manual)
}

async fn analyzer(classifier: Arc<Scripted>, config: AnalyzerConfig) -> (ChunkAnalyzer, Document) {
    let (context, manual) = context_builder().await;
    let analyzer = ChunkAnalyzer::new(Arc::new(context), classifier, config).expect("analyzer");
    (analyzer, manual)
}

#[tokio::test]
async fn two_follow_ups_then_final_verdict() {
    let classifier = Scripted::new(vec![
        verdict("YELLOW", 4, Some("critical part definition")),
        verdict("YELLOW", 4, Some("critical part definition")),
        verdict("RED", 8, None),
    ]);
    let (analyzer, manual) = analyzer(Arc::clone(&classifier), AnalyzerConfig::default()).await;
    let focus = Arc::new(manual.chunks[1].clone());

    let record = analyzer.analyze(focus).await.expect("analysis");

    assert_eq!(record.requests_issued, 3);
    assert_eq!(record.rounds.len(), 3);
    assert_eq!(record.final_verdict.flag, Flag::Red);
    assert_eq!(record.final_verdict, record.rounds[2].verdict);
    assert_eq!(record.queries, vec!["critical part definition".to_string()]);
    assert!(!record.context_truncated);

    let requests = classifier.requests();
    assert_eq!(requests.iter().map(|r| r.round).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(!requests[0].user_prompt.contains("Searches already run"));
    assert!(requests[1]
        .user_prompt
        .contains("Searches already run: critical part definition"));
    assert!(requests[0].system_prompt.contains("JSON schema"));
}

#[tokio::test]
async fn exhausted_round_budget_keeps_last_verdict() {
    let classifier = Scripted::new(vec![
        verdict("YELLOW", 3, Some("tool calibration")),
        verdict("YELLOW", 5, Some("calibration records")),
    ]);
    let config = AnalyzerConfig {
        max_rounds: 2,
        ..Default::default()
    };
    let (analyzer, manual) = analyzer(Arc::clone(&classifier), config).await;

    let record = analyzer
        .analyze(Arc::new(manual.chunks[0].clone()))
        .await
        .expect("analysis");

    assert_eq!(record.requests_issued, 2);
    assert!(record.context_truncated);
    assert_eq!(record.final_verdict.severity_score, 5);
    assert_eq!(record.queries, vec!["tool calibration".to_string()]);
}

#[tokio::test]
async fn distinct_query_budget_truncates() {
    let classifier = Scripted::new(vec![
        verdict("YELLOW", 3, Some("first")),
        verdict("YELLOW", 3, Some("second")),
    ]);
    let config = AnalyzerConfig {
        max_distinct_queries: Some(1),
        ..Default::default()
    };
    let (analyzer, manual) = analyzer(Arc::clone(&classifier), config).await;

    let record = analyzer
        .analyze(Arc::new(manual.chunks[0].clone()))
        .await
        .expect("analysis");
    assert_eq!(record.requests_issued, 2);
    assert!(record.context_truncated);
}

#[tokio::test]
async fn invalid_verdict_is_retried_with_same_prompt() {
    let mut bad = json!({"flag": "PURPLE"});
    bad["severity_score"] = json!(1);
    let classifier = Scripted::new(vec![
        Response::Json(bad),
        Response::Fail,
        verdict("GREEN", 0, None),
    ]);
    let (analyzer, manual) = analyzer(Arc::clone(&classifier), AnalyzerConfig::default()).await;

    let record = analyzer
        .analyze(Arc::new(manual.chunks[0].clone()))
        .await
        .expect("analysis");
    assert_eq!(record.requests_issued, 3);
    assert_eq!(record.rounds[0].attempts, 3);
    assert_eq!(record.final_verdict.flag, Flag::Green);

    let requests = classifier.requests();
    assert_eq!(requests[0], requests[2]);
}

#[tokio::test]
async fn persistent_violation_fails_the_chunk() {
    let bad = || Response::Json(json!({"flag": "RED"}));
    let classifier = Scripted::new(vec![bad(), bad(), bad()]);
    let (analyzer, manual) = analyzer(classifier, AnalyzerConfig::default()).await;

    let err = analyzer
        .analyze(Arc::new(manual.chunks[0].clone()))
        .await
        .expect_err("must fail");

    assert_eq!(err.requests_issued(), 3);
    assert_eq!(err.rounds_attempted(), 1);
    assert!(matches!(
        err.protocol_violation(),
        Some(ProtocolViolation::UnknownField(_) | ProtocolViolation::MissingField(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn timed_out_calls_count_as_failed_attempts() {
    let classifier = Scripted::new(vec![Response::Hang, Response::Hang]);
    let config = AnalyzerConfig {
        max_retries_per_round: 1,
        call_timeout_secs: 5,
        ..Default::default()
    };
    let (analyzer, manual) = analyzer(classifier, config).await;

    let err = analyzer
        .analyze(Arc::new(manual.chunks[0].clone()))
        .await
        .expect_err("must time out");
    match err {
        AnalysisError::RoundFailed {
            attempts, source, ..
        } => {
            assert_eq!(attempts, 2);
            assert_eq!(source, RoundFailure::Timeout(Duration::from_secs(5)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn config_rejects_zero_rounds() {
    let config = AnalyzerConfig {
        max_rounds: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());
    assert!(AnalyzerConfig::default().validate().is_ok());
}

#[tokio::test]
async fn analyzer_rejects_invalid_config() {
    let (context, _manual) = context_builder().await;
    let config = AnalyzerConfig {
        call_timeout_secs: 0,
        ..Default::default()
    };
    let result = ChunkAnalyzer::new(Arc::new(context), Scripted::new(vec![]), config);
    match result {
        Err(err @ AnalysisError::InvalidConfig(_)) => {
            assert_eq!(err.chunk_id(), None);
            assert_eq!(err.requests_issued(), 0);
            assert!(err.to_string().contains("call_timeout_secs"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("zero timeout accepted"),
    }
}
