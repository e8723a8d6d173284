use crate::config::{AuditConfig, ClassifierKind, EmbeddingKind};
use crate::fixture::FixtureClassifier;
use crate::http::{HttpClassifier, HttpEmbedder};
use anyhow::{Context as AnyhowContext, Result};
use audit_analyzer::{ChunkAnalyzer, Classifier};
use audit_context::ContextBuilder;
use audit_engine::{AuditStore, JsonFileStore, Orchestrator};
use audit_index::{ChunkIndex, Embedder, HashEmbedder};
use audit_references::ReferenceResolver;
use std::sync::Arc;
use std::time::Duration;

/// Components wired from one [`AuditConfig`]
pub struct App {
    pub config: AuditConfig,
    pub store: Arc<JsonFileStore>,
    client: reqwest::Client,
}

impl App {
    pub async fn open(config: AuditConfig) -> Result<Self> {
        config.validate()?;
        let store = JsonFileStore::open(config.store_path())
            .await
            .with_context(|| format!("Failed to open store {}", config.store_path().display()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.analyzer.call_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            store: Arc::new(store),
            client,
        })
    }

    fn embedder(&self) -> Arc<dyn Embedder> {
        match self.config.embedding.kind {
            EmbeddingKind::Hash => Arc::new(HashEmbedder::new(self.config.embedding.dimension)),
            EmbeddingKind::Http => Arc::new(HttpEmbedder::new(
                self.client.clone(),
                self.config.embedding.clone(),
                self.config.classifier.api_key.clone(),
            )),
        }
    }

    fn classifier(&self) -> Result<Arc<dyn Classifier>> {
        let endpoint = &self.config.classifier;
        Ok(match endpoint.kind {
            ClassifierKind::Http => {
                if endpoint.api_key.is_none() {
                    log::warn!("AUDIT_API_KEY is not set; sending unauthenticated requests");
                }
                Arc::new(HttpClassifier::new(self.client.clone(), endpoint.clone()))
            }
            ClassifierKind::Fixture => match &endpoint.fixture {
                Some(path) => Arc::new(FixtureClassifier::load(path)?),
                None => Arc::new(FixtureClassifier::all_green()),
            },
        })
    }

    /// Load the persisted index (if compatible) and bring it up to date with the store
    pub async fn build_index(&self) -> Result<ChunkIndex> {
        let embedder = self.embedder();
        let path = self.config.index_path();
        let mut index = if path.exists() {
            match ChunkIndex::load(&path, Arc::clone(&embedder)).await {
                Ok(index) => index,
                Err(err) => {
                    log::warn!("Rebuilding index {}: {err}", path.display());
                    ChunkIndex::new(Arc::clone(&embedder))
                }
            }
        } else {
            ChunkIndex::new(Arc::clone(&embedder))
        };

        let mut added = 0;
        for document in self.store.documents(None).await? {
            added += index
                .upsert_document(&document)
                .await
                .with_context(|| format!("Failed to index {}", document.id))?;
        }
        if added > 0 {
            index
                .save(&path)
                .await
                .with_context(|| format!("Failed to save index {}", path.display()))?;
        }
        log::info!("Index ready: {} chunks ({added} new)", index.len());
        Ok(index)
    }

    pub async fn orchestrator(&self) -> Result<Orchestrator> {
        let index = self.build_index().await?;
        let context = ContextBuilder::new(
            index.into_shared(),
            ReferenceResolver::new(self.config.resolver.clone()),
            self.config.context.clone(),
        )?;
        let classifier = self.classifier()?;
        log::info!("Classifier: {}", classifier.name());
        let analyzer =
            ChunkAnalyzer::new(Arc::new(context), classifier, self.config.analyzer.clone())?;
        let store: Arc<dyn AuditStore> = self.store.clone();
        Ok(Orchestrator::new(store, Arc::new(analyzer), self.config.engine.clone())?)
    }
}
