use thiserror::Error;

/// Result type for chunker operations
pub type Result<T> = std::result::Result<T, ChunkerError>;

/// Errors that can occur while chunking a document
#[derive(Error, Debug)]
pub enum ChunkerError {
    /// Input produced zero chunks (empty or whitespace-only)
    #[error("Document '{0}' produced no chunks")]
    EmptyDocument(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input bytes are not valid UTF-8
    #[error("Document '{0}' is not valid UTF-8")]
    InvalidEncoding(String),
}

impl ChunkerError {
    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
