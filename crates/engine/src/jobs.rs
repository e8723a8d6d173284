use crate::error::{EngineError, Result};
use crate::orchestrator::Orchestrator;
use audit_protocol::{AuditRun, ChunkOutcome, RunStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Lifecycle of a background audit job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Running,
    Done,
    Cancelled,
}

/// A chunk that has an error marker instead of a verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkError {
    pub chunk_id: String,
    pub message: String,
    pub rounds_attempted: u32,
}

/// Submits audit runs as background tasks
#[derive(Clone)]
pub struct AuditJobs {
    orchestrator: Arc<Orchestrator>,
}

impl AuditJobs {
    #[must_use]
    pub const fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Create a run for `document_id` and start it; returns without waiting for analysis
    pub async fn submit(&self, document_id: &str) -> Result<AuditHandle> {
        let run = self.orchestrator.create_run(document_id).await?;
        Ok(self.start(run.id))
    }

    /// Start an existing pending run
    #[must_use]
    pub fn start(&self, run_id: String) -> AuditHandle {
        let (state_tx, state_rx) = watch::channel(JobState::Submitted);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let orchestrator = Arc::clone(&self.orchestrator);
        let task_run_id = run_id.clone();

        let task = tokio::spawn(async move {
            state_tx.send_replace(JobState::Running);
            let result = orchestrator.run(&task_run_id, cancel_rx).await;
            let final_state = match &result {
                Ok(run) if run.status == RunStatus::Cancelled => JobState::Cancelled,
                _ => JobState::Done,
            };
            state_tx.send_replace(final_state);
            result
        });

        AuditHandle {
            run_id,
            state: state_rx,
            cancel: cancel_tx,
            task,
        }
    }

    /// Persisted run record, queryable at any time
    pub async fn run_status(&self, run_id: &str) -> Result<AuditRun> {
        Ok(self.orchestrator.store().get_run(run_id).await?)
    }

    /// Per-chunk errors recorded so far
    pub async fn chunk_errors(&self, run_id: &str) -> Result<Vec<ChunkError>> {
        let outcomes = self.orchestrator.store().outcomes(run_id).await?;
        Ok(outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                ChunkOutcome::Error {
                    chunk_id,
                    message,
                    rounds_attempted,
                    ..
                } => Some(ChunkError {
                    chunk_id,
                    message,
                    rounds_attempted,
                }),
                ChunkOutcome::Analyzed(_) => None,
            })
            .collect())
    }
}

/// Handle to a background audit run
pub struct AuditHandle {
    run_id: String,
    state: watch::Receiver<JobState>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<Result<AuditRun>>,
}

impl AuditHandle {
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    #[must_use]
    pub fn status(&self) -> JobState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.clone()
    }

    /// Stop issuing new analyses; chunks in flight still finish
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Wait for the run to finish
    pub async fn join(self) -> Result<AuditRun> {
        self.task
            .await
            .map_err(|err| EngineError::TaskFailed(err.to_string()))?
    }
}
