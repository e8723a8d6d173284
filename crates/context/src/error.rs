use audit_index::IndexError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContextError>;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Invalid context limits: {0}")]
    InvalidLimits(String),
}
