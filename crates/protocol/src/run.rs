use crate::verdict::{Flag, Verdict};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Lifecycle of one audit run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One invocation of the orchestrator over one manual document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRun {
    pub id: String,
    pub document_id: String,
    pub status: RunStatus,
    pub created_at_unix_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_unix_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_unix_ms: Option<u64>,
    pub total_chunks: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl AuditRun {
    #[must_use]
    pub fn new(id: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            status: RunStatus::Pending,
            created_at_unix_ms: current_unix_ms(),
            started_at_unix_ms: None,
            finished_at_unix_ms: None,
            total_chunks: 0,
            compliance_score: None,
            failure_reason: None,
        }
    }
}

/// One classifier round, kept for auditability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: u32,
    /// Follow-up queries the bundle for this round was built with
    pub queries: Vec<String>,
    /// Chunks included in the bundle
    pub context_chunks: usize,
    /// Classifier calls made for this round, retries included
    pub attempts: u32,
    pub verdict: Verdict,
}

/// Final result of analysing one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub chunk_id: String,
    pub final_verdict: Verdict,
    pub rounds: Vec<RoundRecord>,
    pub requests_issued: u32,
    /// Distinct follow-up queries the classifier asked for, in order
    #[serde(default)]
    pub queries: Vec<String>,
    /// Round budget ran out while the classifier still asked for context
    pub context_truncated: bool,
}

/// Persisted per-chunk outcome of an audit run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkOutcome {
    Analyzed(AnalysisRecord),
    Error {
        chunk_id: String,
        message: String,
        rounds_attempted: u32,
        requests_issued: u32,
    },
}

impl ChunkOutcome {
    #[must_use]
    pub fn chunk_id(&self) -> &str {
        match self {
            Self::Analyzed(record) => &record.chunk_id,
            Self::Error { chunk_id, .. } => chunk_id,
        }
    }

    /// Flag of the final verdict; absent for errored chunks
    #[must_use]
    pub fn flag(&self) -> Option<Flag> {
        match self {
            Self::Analyzed(record) => Some(record.final_verdict.flag),
            Self::Error { .. } => None,
        }
    }

    #[must_use]
    pub const fn verdict(&self) -> Option<&Verdict> {
        match self {
            Self::Analyzed(record) => Some(&record.final_verdict),
            Self::Error { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[must_use]
pub fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|dur| u64::try_from(dur.as_millis()).ok())
        .unwrap_or(0)
}
