use audit_context::ContextError;
use std::time::Duration;
use thiserror::Error;

/// The classification capability itself failed (transport, auth, malformed body)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("Classifier request failed: {0}")]
    Request(String),

    #[error("Classifier returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("Classifier unavailable: {0}")]
    Unavailable(String),
}

/// A structurally invalid verdict
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("Verdict must be a JSON object")]
    NotAnObject,

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Invalid flag {0} (expected \"RED\", \"YELLOW\" or \"GREEN\")")]
    InvalidFlag(String),

    #[error("Field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Field 'findings' must be a non-empty string")]
    EmptyFindings,

    #[error("Malformed citations: {0}")]
    MalformedCitations(String),
}

/// Why one round produced no verdict
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoundFailure {
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error("Classifier call timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Analyzer setup failed, or analysis of one chunk failed (recorded against that chunk only)
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid analyzer configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to build context for {chunk_id}: {source}")]
    Context {
        chunk_id: String,
        requests_issued: u32,
        rounds_attempted: u32,
        #[source]
        source: ContextError,
    },

    #[error("Round {round} for {chunk_id} failed after {attempts} attempts: {source}")]
    RoundFailed {
        chunk_id: String,
        round: u32,
        attempts: u32,
        requests_issued: u32,
        #[source]
        source: RoundFailure,
    },
}

impl AnalysisError {
    #[must_use]
    pub fn chunk_id(&self) -> Option<&str> {
        match self {
            Self::InvalidConfig(_) => None,
            Self::Context { chunk_id, .. } | Self::RoundFailed { chunk_id, .. } => Some(chunk_id),
        }
    }

    #[must_use]
    pub const fn requests_issued(&self) -> u32 {
        match self {
            Self::InvalidConfig(_) => 0,
            Self::Context { requests_issued, .. } | Self::RoundFailed { requests_issued, .. } => {
                *requests_issued
            }
        }
    }

    #[must_use]
    pub const fn rounds_attempted(&self) -> u32 {
        match self {
            Self::InvalidConfig(_) => 0,
            Self::Context {
                rounds_attempted, ..
            } => *rounds_attempted,
            Self::RoundFailed { round, .. } => *round,
        }
    }

    /// The protocol violation behind the failure, if that is what exhausted the retries
    #[must_use]
    pub const fn protocol_violation(&self) -> Option<&ProtocolViolation> {
        match self {
            Self::RoundFailed {
                source: RoundFailure::Protocol(violation),
                ..
            } => Some(violation),
            _ => None,
        }
    }
}
