use crate::error::ClassifierError;
use async_trait::async_trait;
use serde::Serialize;

/// One classifier call: rendered prompts plus the chunk and round they belong to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationRequest {
    pub chunk_id: String,
    pub round: u32,
    pub system_prompt: String,
    pub user_prompt: String,
}

/// Classification capability.
///
/// Returns the raw JSON object produced for the request; structural validation
/// belongs to the analyzer.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Identifier for logs (model name, fixture path, ...)
    fn name(&self) -> &str;

    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<serde_json::Value, ClassifierError>;
}
