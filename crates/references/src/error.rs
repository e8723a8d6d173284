use audit_protocol::Corpus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReferenceResolutionError>;

/// Non-fatal: the resolver records these and continues with fewer references
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceResolutionError {
    #[error("Lookup of '{label}' in {corpus} failed: {reason}")]
    LookupFailed {
        label: String,
        corpus: Corpus,
        reason: String,
    },

    #[error("Invalid resolver configuration: {0}")]
    InvalidConfig(String),
}
