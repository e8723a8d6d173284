use anyhow::{bail, Context as AnyhowContext, Result};
use audit_analyzer::AnalyzerConfig;
use audit_chunker::ChunkerConfig;
use audit_context::ContextLimits;
use audit_engine::EngineConfig;
use audit_index::HashEmbedder;
use audit_references::ResolverConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "manual-audit.toml";
const DEFAULT_DATA_DIR: &str = ".manual-audit";

/// Which classifier backs audits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// OpenAI-compatible chat completions endpoint
    Http,
    /// Replays verdicts from a fixture file (offline dry runs)
    Fixture,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierEndpoint {
    pub kind: ClassifierKind,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,

    /// Only read from the environment (`AUDIT_API_KEY`), never written back
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Fixture file for `kind = "fixture"`; absent means every chunk is GREEN
    pub fixture: Option<PathBuf>,
}

impl Default for ClassifierEndpoint {
    fn default() -> Self {
        Self {
            kind: ClassifierKind::Http,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            api_key: None,
            fixture: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingKind {
    Hash,
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub kind: EmbeddingKind,
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            kind: EmbeddingKind::Hash,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: HashEmbedder::DEFAULT_DIMENSION,
            batch_size: 64,
        }
    }
}

/// Everything `manual-audit` reads from `manual-audit.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Store and index files live here
    pub data_dir: PathBuf,
    pub chunker: ChunkerConfig,
    pub context: ContextLimits,
    pub resolver: ResolverConfig,
    pub analyzer: AnalyzerConfig,
    pub engine: EngineConfig,
    pub classifier: ClassifierEndpoint,
    pub embedding: EmbeddingSettings,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            chunker: ChunkerConfig::default(),
            context: ContextLimits::default(),
            resolver: ResolverConfig::default(),
            analyzer: AnalyzerConfig::default(),
            engine: EngineConfig::default(),
            classifier: ClassifierEndpoint::default(),
            embedding: EmbeddingSettings::default(),
        }
    }
}

impl AuditConfig {
    /// Load `path` (or `manual-audit.toml` when present), then apply `AUDIT_*` overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Environment overrides for endpoint, model and credentials
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var("AUDIT_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = var("AUDIT_BASE_URL") {
            self.classifier.base_url.clone_from(&url);
            self.embedding.base_url = url;
        }
        if let Some(model) = var("AUDIT_MODEL") {
            self.classifier.model = model;
        }
        if let Some(model) = var("AUDIT_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(key) = var("AUDIT_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.classifier.api_key = Some(key);
        }
        match var("AUDIT_CLASSIFIER").as_deref() {
            Some("fixture") => self.classifier.kind = ClassifierKind::Fixture,
            Some("http") => self.classifier.kind = ClassifierKind::Http,
            _ => {}
        }
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("chunker", self.chunker.validate()),
            ("context", self.context.validate()),
            ("resolver", self.resolver.validate()),
            ("analyzer", self.analyzer.validate()),
            ("engine", self.engine.validate()),
        ];
        for (section, check) in checks {
            if let Err(message) = check {
                bail!("[{section}] {message}");
            }
        }
        if self.embedding.dimension == 0 {
            bail!("[embedding] dimension must be > 0");
        }
        if self.embedding.batch_size == 0 {
            bail!("[embedding] batch_size must be > 0");
        }
        if self.classifier.kind == ClassifierKind::Http
            && self.classifier.base_url.trim().is_empty()
        {
            bail!("[classifier] base_url must be set");
        }
        Ok(())
    }

    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AuditConfig::from_toml(
            r#"
            data_dir = "/tmp/audit"

            [analyzer]
            max_rounds = 2

            [classifier]
            kind = "fixture"
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/audit"));
        assert_eq!(config.analyzer.max_rounds, 2);
        assert_eq!(config.analyzer.max_retries_per_round, 2);
        assert_eq!(config.classifier.kind, ClassifierKind::Fixture);
        assert_eq!(config.context, ContextLimits::default());
        config.validate().unwrap();
    }

    #[test]
    fn env_overrides_endpoint_and_key() {
        let env: HashMap<&str, &str> = [
            ("AUDIT_BASE_URL", "http://localhost:8080/v1"),
            ("AUDIT_MODEL", "local-model"),
            ("AUDIT_API_KEY", "secret"),
        ]
        .into_iter()
        .collect();
        let mut config = AuditConfig::default();
        config.apply_env(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.classifier.base_url, "http://localhost:8080/v1");
        assert_eq!(config.embedding.base_url, "http://localhost:8080/v1");
        assert_eq!(config.classifier.model, "local-model");
        assert_eq!(config.classifier.api_key.as_deref(), Some("secret"));
        assert!(!toml::to_string(&config).unwrap().contains("secret"));
    }

    #[test]
    fn invalid_sections_are_named() {
        let mut config = AuditConfig::default();
        config.engine.max_workers = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.starts_with("[engine]"), "{err}");
    }
}
