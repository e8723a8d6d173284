use crate::config::{ClassifierEndpoint, EmbeddingSettings};
use async_trait::async_trait;
use audit_analyzer::{ClassificationRequest, Classifier, ClassifierError};
use audit_index::{Embedder, IndexError};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Classifier backed by an OpenAI-compatible `/chat/completions` endpoint
pub struct HttpClassifier {
    client: Client,
    endpoint: ClassifierEndpoint,
    url: String,
}

impl HttpClassifier {
    #[must_use]
    pub fn new(client: Client, endpoint: ClassifierEndpoint) -> Self {
        let url = format!("{}/chat/completions", endpoint.base_url.trim_end_matches('/'));
        Self {
            client,
            endpoint,
            url,
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> &str {
        &self.endpoint.model
    }

    async fn classify(&self, request: &ClassificationRequest) -> Result<Value, ClassifierError> {
        let body = json!({
            "model": self.endpoint.model,
            "temperature": self.endpoint.temperature,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt},
            ],
        });

        let mut builder = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| ClassifierError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error(status, &detail));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ClassifierError::InvalidResponse("response has no message content".to_string())
            })?;
        parse_json_content(&content)
    }
}

fn status_error(status: StatusCode, detail: &str) -> ClassifierError {
    let detail: String = detail.chars().take(300).collect();
    let message = format!("HTTP {status}: {detail}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ClassifierError::Unavailable(message)
    } else {
        ClassifierError::Request(message)
    }
}

/// The JSON object in a message body, tolerating a fenced ```json block
pub fn parse_json_content(content: &str) -> Result<Value, ClassifierError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .map_or(trimmed, str::trim);
    serde_json::from_str(unfenced)
        .map_err(|e| ClassifierError::InvalidResponse(format!("content is not JSON: {e}")))
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint
pub struct HttpEmbedder {
    client: Client,
    settings: EmbeddingSettings,
    api_key: Option<String>,
    url: String,
}

impl HttpEmbedder {
    #[must_use]
    pub fn new(client: Client, settings: EmbeddingSettings, api_key: Option<String>) -> Self {
        let url = format!("{}/embeddings", settings.base_url.trim_end_matches('/'));
        Self {
            client,
            settings,
            api_key,
            url,
        }
    }

    async fn request(&self, texts: &[&str]) -> audit_index::Result<Vec<Vec<f32>>> {
        let mut builder = self
            .client
            .post(&self.url)
            .json(&json!({"model": self.settings.model, "input": texts}));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| IndexError::EmbeddingError(e.to_string()))?;
        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| IndexError::EmbeddingError(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(IndexError::EmbeddingError(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|item| item.index);
        parsed
            .data
            .into_iter()
            .map(|item| {
                if item.embedding.len() == self.settings.dimension {
                    Ok(item.embedding)
                } else {
                    Err(IndexError::InvalidDimension {
                        expected: self.settings.dimension,
                        actual: item.embedding.len(),
                    })
                }
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.settings.dimension
    }

    fn model_id(&self) -> &str {
        &self.settings.model
    }

    async fn embed(&self, text: &str) -> audit_index::Result<Vec<f32>> {
        let mut vectors = self.request(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| IndexError::EmbeddingError("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> audit_index::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.settings.batch_size.max(1)) {
            log::debug!("Embedding batch of {} texts", batch.len());
            out.extend(self.request(batch).await?);
        }
        Ok(out)
    }
}
