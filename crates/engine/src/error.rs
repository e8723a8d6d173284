use audit_protocol::{Corpus, RunStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Document already exists: {0}")]
    DocumentExists(String),

    #[error("Audit run not found: {0}")]
    RunNotFound(String),

    #[error("Audit run already exists: {0}")]
    RunExists(String),

    #[error("Unsupported store schema version {found} (expected {expected})")]
    UnsupportedSchema { found: u32, expected: u32 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Document {document_id} is a {corpus} document; audits run on manuals")]
    NotAManual { document_id: String, corpus: Corpus },

    #[error("Audit run {run_id} is {status}, expected pending")]
    InvalidRunState { run_id: String, status: &'static str },

    /// No chunk in the run produced a usable verdict
    #[error("Audit run {run_id} failed: {reason}")]
    RunFailure { run_id: String, reason: String },

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Audit task failed: {0}")]
    TaskFailed(String),
}

impl EngineError {
    pub(crate) fn invalid_state(run_id: &str, status: RunStatus) -> Self {
        Self::InvalidRunState {
            run_id: run_id.to_string(),
            status: status.as_str(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Audit run {run_id} is still {status}; reports need a finished run")]
    RunNotFinished { run_id: String, status: &'static str },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type Result<T> = std::result::Result<T, EngineError>;
