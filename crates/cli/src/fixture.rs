use anyhow::{Context as AnyhowContext, Result};
use async_trait::async_trait;
use audit_analyzer::{ClassificationRequest, Classifier, ClassifierError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;

/// Offline classifier replaying verdicts from a fixture file.
///
/// The file maps chunk ids to the responses for rounds 1, 2, ...; the last entry
/// repeats for later rounds. An optional `"*"` key applies to unlisted chunks,
/// which otherwise get a GREEN verdict.
#[derive(Debug, Default)]
pub struct FixtureClassifier {
    name: String,
    responses: HashMap<String, Vec<Value>>,
}

impl FixtureClassifier {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        let responses: HashMap<String, Vec<Value>> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid fixture {}", path.display()))?;
        Ok(Self {
            name: format!("fixture:{}", path.display()),
            responses,
        })
    }

    #[must_use]
    pub fn all_green() -> Self {
        Self {
            name: "fixture:green".to_string(),
            responses: HashMap::new(),
        }
    }
}

#[async_trait]
impl Classifier for FixtureClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn classify(&self, request: &ClassificationRequest) -> Result<Value, ClassifierError> {
        let script = self
            .responses
            .get(&request.chunk_id)
            .or_else(|| self.responses.get("*"));
        let Some(script) = script.filter(|s| !s.is_empty()) else {
            return Ok(green_verdict());
        };
        let idx = usize::try_from(request.round.saturating_sub(1))
            .unwrap_or(usize::MAX)
            .min(script.len() - 1);
        Ok(script[idx].clone())
    }
}

fn green_verdict() -> Value {
    json!({
        "flag": "GREEN",
        "severity_score": 0,
        "regulation_references": [],
        "findings": "No compliance issues identified (fixture).",
        "gaps": [],
        "citations": {"manual_section": null, "regulation_sections": []},
        "recommendations": [],
        "needs_additional_context": false,
        "context_query": null
    })
}
