use crate::classifier::{ClassificationRequest, Classifier};
use crate::error::{AnalysisError, Result, RoundFailure};
use crate::prompts::{system_prompt, user_prompt};
use crate::validate::parse_verdict;
use audit_context::ContextBuilder;
use audit_protocol::{AnalysisRecord, Chunk, RoundRecord, Verdict};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Round and retry budget for one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Classifier rounds per chunk, the first one included
    pub max_rounds: u32,

    /// Extra attempts for a round whose call failed or returned an invalid verdict
    pub max_retries_per_round: u32,

    /// Per-call timeout in seconds
    pub call_timeout_secs: u64,

    /// Distinct follow-up queries per chunk; `None` leaves only `max_rounds`
    pub max_distinct_queries: Option<usize>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_rounds: 4,
            max_retries_per_round: 2,
            call_timeout_secs: 120,
            max_distinct_queries: None,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_rounds == 0 {
            return Err("max_rounds must be > 0".to_string());
        }
        if self.call_timeout_secs == 0 {
            return Err("call_timeout_secs must be > 0".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Where the search-before-flag loop stands after a verdict
enum Next {
    Done { truncated: bool },
    NeedsContext(String),
}

/// Runs the search-before-flag protocol for one chunk at a time.
///
/// ```text
/// INITIAL ──> AWAITING_VERDICT ──> DONE
///                 ▲        │
///                 │        ▼
///              NEEDS_CONTEXT (follow-up query, round < max_rounds)
/// ```
pub struct ChunkAnalyzer {
    context: Arc<ContextBuilder>,
    classifier: Arc<dyn Classifier>,
    config: AnalyzerConfig,
    system_prompt: String,
}

impl ChunkAnalyzer {
    pub fn new(
        context: Arc<ContextBuilder>,
        classifier: Arc<dyn Classifier>,
        config: AnalyzerConfig,
    ) -> Result<Self> {
        config.validate().map_err(AnalysisError::InvalidConfig)?;
        Ok(Self {
            context,
            classifier,
            config,
            system_prompt: system_prompt(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    #[must_use]
    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    /// Analyse `focus` until the classifier settles or the round budget runs out
    pub async fn analyze(&self, focus: Arc<Chunk>) -> Result<AnalysisRecord> {
        let mut queries: Vec<String> = Vec::new();
        let mut rounds: Vec<RoundRecord> = Vec::new();
        let mut requests_issued = 0u32;
        let mut round = 1u32;

        loop {
            let bundle = self
                .context
                .build(Arc::clone(&focus), &queries)
                .await
                .map_err(|source| AnalysisError::Context {
                    chunk_id: focus.id.clone(),
                    requests_issued,
                    rounds_attempted: round - 1,
                    source,
                })?;

            let request = ClassificationRequest {
                chunk_id: focus.id.clone(),
                round,
                system_prompt: self.system_prompt.clone(),
                user_prompt: user_prompt(&bundle, round, self.context.limits().max_entry_chars),
            };
            let outcome = self.await_verdict(&request, &mut requests_issued).await;
            let (verdict, attempts) =
                outcome.map_err(|(attempts, source)| AnalysisError::RoundFailed {
                    chunk_id: focus.id.clone(),
                    round,
                    attempts,
                    requests_issued,
                    source,
                })?;

            log::debug!(
                "{} round {round}: {} (severity {}, {} context chunks)",
                focus.id,
                verdict.flag,
                verdict.severity_score,
                bundle.counts().total()
            );
            let next = self.next_step(&focus.id, &verdict, round, &queries);
            rounds.push(RoundRecord {
                round,
                queries: queries.clone(),
                context_chunks: bundle.counts().total(),
                attempts,
                verdict: verdict.clone(),
            });

            match next {
                Next::Done { truncated } => {
                    return Ok(AnalysisRecord {
                        chunk_id: focus.id.clone(),
                        final_verdict: verdict,
                        rounds,
                        requests_issued,
                        queries,
                        context_truncated: truncated,
                    });
                }
                Next::NeedsContext(query) => {
                    if !queries.iter().any(|q| q.eq_ignore_ascii_case(&query)) {
                        queries.push(query);
                    }
                    round += 1;
                }
            }
        }
    }

    fn next_step(&self, chunk_id: &str, verdict: &Verdict, round: u32, queries: &[String]) -> Next {
        let Some(query) = verdict.follow_up_query() else {
            return Next::Done { truncated: false };
        };
        if round >= self.config.max_rounds {
            log::info!(
                "{chunk_id}: round budget ({}) exhausted with pending query '{query}'",
                self.config.max_rounds
            );
            return Next::Done { truncated: true };
        }
        let is_new = !queries.iter().any(|q| q.eq_ignore_ascii_case(query));
        if is_new
            && self
                .config
                .max_distinct_queries
                .is_some_and(|limit| queries.len() >= limit)
        {
            log::info!("{chunk_id}: distinct query budget exhausted at '{query}'");
            return Next::Done { truncated: true };
        }
        Next::NeedsContext(query.to_string())
    }

    /// One round: call the classifier with the same bundle until a valid verdict or
    /// the retry budget is spent. Returns the verdict and the attempts used.
    async fn await_verdict(
        &self,
        request: &ClassificationRequest,
        requests_issued: &mut u32,
    ) -> std::result::Result<(Verdict, u32), (u32, RoundFailure)> {
        let max_attempts = self.config.max_retries_per_round + 1;
        let timeout = self.config.call_timeout();
        let mut attempt = 0;

        loop {
            attempt += 1;
            *requests_issued += 1;

            let call = tokio::time::timeout(timeout, self.classifier.classify(request));
            let failure = match call.await {
                Ok(Ok(value)) => match parse_verdict(&value) {
                    Ok(verdict) => return Ok((verdict, attempt)),
                    Err(violation) => RoundFailure::Protocol(violation),
                },
                Ok(Err(err)) => RoundFailure::Classifier(err),
                Err(_) => RoundFailure::Timeout(timeout),
            };

            if attempt >= max_attempts {
                log::warn!(
                    "{} round {}: giving up after {attempt} attempts: {failure}",
                    request.chunk_id,
                    request.round
                );
                return Err((attempt, failure));
            }
            log::warn!(
                "{} round {} attempt {attempt}/{max_attempts} failed: {failure}",
                request.chunk_id,
                request.round
            );
        }
    }
}
