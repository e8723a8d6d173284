use crate::error::{EngineError, Result, StoreError};
use crate::store::AuditStore;
use audit_analyzer::ChunkAnalyzer;
use audit_protocol::{current_unix_ms, AuditRun, Chunk, ChunkOutcome, Corpus, Flag, RunStatus};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;

/// Penalty per RED verdict
pub const RED_PENALTY: u32 = 10;

/// Penalty per YELLOW verdict
pub const YELLOW_PENALTY: u32 = 3;

pub const PERFECT_SCORE: u32 = 100;

/// `100 - 10·RED - 3·YELLOW`, floored at 0. Errored chunks do not count.
#[must_use]
pub fn compliance_score(outcomes: &[ChunkOutcome]) -> u32 {
    let penalty: u32 = outcomes
        .iter()
        .filter_map(ChunkOutcome::flag)
        .map(|flag| match flag {
            Flag::Red => RED_PENALTY,
            Flag::Yellow => YELLOW_PENALTY,
            Flag::Green => 0,
        })
        .sum();
    PERFECT_SCORE.saturating_sub(penalty)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Chunks analysed concurrently
    pub max_workers: usize,

    /// Outcomes buffered between workers and the store writer
    pub outcome_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            outcome_buffer: 64,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_workers == 0 {
            return Err("max_workers must be > 0".to_string());
        }
        if self.outcome_buffer == 0 {
            return Err("outcome_buffer must be > 0".to_string());
        }
        Ok(())
    }
}

/// Runs the analyzer over every manual chunk of an audit run
pub struct Orchestrator {
    store: Arc<dyn AuditStore>,
    analyzer: Arc<ChunkAnalyzer>,
    config: EngineConfig,
    run_counter: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn AuditStore>,
        analyzer: Arc<ChunkAnalyzer>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        Ok(Self {
            store,
            analyzer,
            config,
            run_counter: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Create a pending run for a manual document
    pub async fn create_run(&self, document_id: &str) -> Result<AuditRun> {
        let document = self.store.get_document(document_id).await?;
        if document.corpus != Corpus::Manual {
            return Err(EngineError::NotAManual {
                document_id: document.id,
                corpus: document.corpus,
            });
        }

        let n = self.run_counter.fetch_add(1, Ordering::Relaxed);
        let mut run = AuditRun::new(format!("run-{}-{n}", current_unix_ms()), document_id);
        run.total_chunks = document.chunks.len();
        self.store.create_run(run.clone()).await?;
        log::info!("Created audit run {} for {document_id}", run.id);
        Ok(run)
    }

    /// Execute a pending run to completion, failure or cancellation.
    ///
    /// `cancel` is checked before every analyzer invocation; chunks already in
    /// flight finish and are persisted. Returns [`EngineError::RunFailure`] when no
    /// chunk produced a usable verdict.
    pub async fn run(&self, run_id: &str, cancel: watch::Receiver<bool>) -> Result<AuditRun> {
        let mut run = self.store.get_run(run_id).await?;
        if run.status != RunStatus::Pending {
            return Err(EngineError::invalid_state(run_id, run.status));
        }
        let document = self.store.get_document(&run.document_id).await?;

        let mut chunks = document.chunks;
        chunks.sort_by_key(|chunk| chunk.sequence);
        run.status = RunStatus::Running;
        run.started_at_unix_ms = Some(current_unix_ms());
        run.total_chunks = chunks.len();
        self.store.update_run(run.clone()).await?;
        log::info!(
            "Audit run {run_id}: analysing {} chunks of {} with {} workers",
            chunks.len(),
            run.document_id,
            self.config.max_workers
        );

        let cancelled = match self.analyze_all(run_id, chunks, cancel).await {
            Ok(cancelled) => cancelled,
            Err(err) => {
                self.finish(run, RunStatus::Failed, None, Some(err.to_string()))
                    .await?;
                return Err(err.into());
            }
        };

        let outcomes = self.store.outcomes(run_id).await?;
        let usable = outcomes.iter().filter(|o| !o.is_error()).count();
        let errors = outcomes.len() - usable;
        let score = (usable > 0).then(|| compliance_score(&outcomes));

        if cancelled {
            log::info!("Audit run {run_id} cancelled after {} outcomes", outcomes.len());
            return self.finish(run, RunStatus::Cancelled, score, None).await;
        }
        if usable == 0 {
            let reason = if outcomes.is_empty() {
                "no manual chunks to analyse".to_string()
            } else {
                format!("no chunk produced a usable verdict ({errors} errors)")
            };
            log::warn!("Audit run {run_id} failed: {reason}");
            self.finish(run, RunStatus::Failed, None, Some(reason.clone()))
                .await?;
            return Err(EngineError::RunFailure {
                run_id: run_id.to_string(),
                reason,
            });
        }

        log::info!(
            "Audit run {run_id} completed: {usable} verdicts, {errors} errors, score {}",
            score.unwrap_or_default()
        );
        self.finish(run, RunStatus::Completed, score, None).await
    }

    /// Fan chunks out to workers; a single writer task persists outcomes.
    /// Returns whether cancellation stopped the loop early.
    async fn analyze_all(
        &self,
        run_id: &str,
        chunks: Vec<Chunk>,
        mut cancel: watch::Receiver<bool>,
    ) -> std::result::Result<bool, StoreError> {
        let (outcome_tx, outcome_rx) = mpsc::channel(self.config.outcome_buffer);
        let writer = tokio::spawn(write_outcomes(
            Arc::clone(&self.store),
            run_id.to_string(),
            outcome_rx,
        ));

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut workers = JoinSet::new();
        let mut cancelled = false;

        for chunk in chunks {
            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                () = cancellation(&mut cancel) => {
                    cancelled = true;
                    break;
                }
            };
            if *cancel.borrow() {
                cancelled = true;
                break;
            }

            let analyzer = Arc::clone(&self.analyzer);
            let outcome_tx = outcome_tx.clone();
            workers.spawn(async move {
                let _permit = permit;
                let sequence = chunk.sequence;
                let chunk_id = chunk.id.clone();
                let outcome = match tokio::spawn(analyze_chunk(analyzer, chunk)).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        log::error!("{chunk_id}: analysis task aborted: {err}");
                        ChunkOutcome::Error {
                            chunk_id,
                            message: format!("analysis task aborted: {err}"),
                            rounds_attempted: 0,
                            requests_issued: 0,
                        }
                    }
                };
                // Receiver gone means the writer failed; run() reports that error.
                let _ = outcome_tx.send((sequence, outcome)).await;
            });
        }
        drop(outcome_tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                log::error!("Audit run {run_id}: worker task aborted: {err}");
            }
        }

        match writer.await {
            Ok(result) => result.map(|()| cancelled),
            Err(err) => Err(StoreError::IoError(std::io::Error::other(format!(
                "outcome writer aborted: {err}"
            )))),
        }
    }

    async fn finish(
        &self,
        mut run: AuditRun,
        status: RunStatus,
        score: Option<u32>,
        failure_reason: Option<String>,
    ) -> Result<AuditRun> {
        run.status = status;
        run.compliance_score = score;
        run.failure_reason = failure_reason;
        run.finished_at_unix_ms = Some(current_unix_ms());
        self.store.update_run(run.clone()).await?;
        Ok(run)
    }
}

async fn analyze_chunk(analyzer: Arc<ChunkAnalyzer>, chunk: Chunk) -> ChunkOutcome {
    let chunk_id = chunk.id.clone();
    match analyzer.analyze(Arc::new(chunk)).await {
        Ok(record) => {
            log::debug!(
                "{chunk_id}: {} after {} requests",
                record.final_verdict.flag,
                record.requests_issued
            );
            ChunkOutcome::Analyzed(record)
        }
        Err(err) => {
            log::warn!("{chunk_id}: analysis failed: {err}");
            ChunkOutcome::Error {
                chunk_id,
                message: err.to_string(),
                rounds_attempted: err.rounds_attempted(),
                requests_issued: err.requests_issued(),
            }
        }
    }
}

/// Sole writer of outcomes for one run
async fn write_outcomes(
    store: Arc<dyn AuditStore>,
    run_id: String,
    mut outcomes: mpsc::Receiver<(usize, ChunkOutcome)>,
) -> std::result::Result<(), StoreError> {
    while let Some((sequence, outcome)) = outcomes.recv().await {
        store.upsert_outcome(&run_id, sequence, outcome).await?;
    }
    Ok(())
}

/// Resolves once cancellation is requested; never if the sender is gone
async fn cancellation(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_protocol::{AnalysisRecord, Citations, Verdict};

    fn analyzed(flag: Flag) -> ChunkOutcome {
        ChunkOutcome::Analyzed(AnalysisRecord {
            chunk_id: "moe#0".to_string(),
            final_verdict: Verdict {
                flag,
                severity_score: 0,
                regulation_references: vec![],
                findings: "f".to_string(),
                gaps: vec![],
                citations: Citations::default(),
                recommendations: vec![],
                needs_additional_context: false,
                context_query: None,
            },
            rounds: vec![],
            requests_issued: 1,
            queries: vec![],
            context_truncated: false,
        })
    }

    #[test]
    fn score_penalises_flags_and_ignores_errors() {
        let error = ChunkOutcome::Error {
            chunk_id: "moe#9".to_string(),
            message: "x".to_string(),
            rounds_attempted: 1,
            requests_issued: 3,
        };
        let outcomes = vec![
            analyzed(Flag::Red),
            analyzed(Flag::Yellow),
            analyzed(Flag::Yellow),
            analyzed(Flag::Green),
            error,
        ];
        assert_eq!(compliance_score(&outcomes), 84);
        assert_eq!(compliance_score(&[]), 100);
    }

    #[test]
    fn score_floors_at_zero() {
        let outcomes: Vec<ChunkOutcome> = (0..11).map(|_| analyzed(Flag::Red)).collect();
        assert_eq!(compliance_score(&outcomes), 0);
    }

    #[test]
    fn config_rejects_zero_workers() {
        let config = EngineConfig {
            max_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
