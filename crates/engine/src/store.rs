use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use audit_protocol::{AuditRun, ChunkOutcome, Corpus, Document};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Persistence for documents, runs and per-chunk outcomes
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn put_document(&self, document: Document) -> StoreResult<()>;

    async fn get_document(&self, id: &str) -> StoreResult<Document>;

    /// All stored documents, optionally restricted to one corpus, ordered by id
    async fn documents(&self, corpus: Option<Corpus>) -> StoreResult<Vec<Document>>;

    async fn create_run(&self, run: AuditRun) -> StoreResult<()>;

    async fn get_run(&self, id: &str) -> StoreResult<AuditRun>;

    async fn update_run(&self, run: AuditRun) -> StoreResult<()>;

    /// Runs ordered by creation time
    async fn runs(&self) -> StoreResult<Vec<AuditRun>>;

    /// Insert or replace the outcome for `(run_id, outcome.chunk_id())`
    async fn upsert_outcome(
        &self,
        run_id: &str,
        sequence: usize,
        outcome: ChunkOutcome,
    ) -> StoreResult<()>;

    /// Outcomes of a run ordered by chunk sequence
    async fn outcomes(&self, run_id: &str) -> StoreResult<Vec<ChunkOutcome>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoredOutcome {
    pub run_id: String,
    pub sequence: usize,
    pub outcome: ChunkOutcome,
}

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub documents: HashMap<String, Document>,
    pub runs: HashMap<String, AuditRun>,
    /// run id -> chunk id -> outcome
    pub outcomes: HashMap<String, HashMap<String, StoredOutcome>>,
}

impl StoreState {
    pub fn sorted_documents(&self, corpus: Option<Corpus>) -> Vec<Document> {
        let mut documents: Vec<Document> = self
            .documents
            .values()
            .filter(|doc| corpus.map_or(true, |c| doc.corpus == c))
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        documents
    }

    pub fn sorted_runs(&self) -> Vec<AuditRun> {
        let mut runs: Vec<AuditRun> = self.runs.values().cloned().collect();
        runs.sort_by(|a, b| {
            a.created_at_unix_ms
                .cmp(&b.created_at_unix_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        runs
    }

    pub fn sorted_outcomes(&self, run_id: &str) -> Vec<StoredOutcome> {
        let mut outcomes: Vec<StoredOutcome> = self
            .outcomes
            .get(run_id)
            .map(|by_chunk| by_chunk.values().cloned().collect())
            .unwrap_or_default();
        outcomes.sort_by(|a, b| {
            a.sequence
                .cmp(&b.sequence)
                .then_with(|| a.outcome.chunk_id().cmp(b.outcome.chunk_id()))
        });
        outcomes
    }
}

/// In-memory store; also the working set behind [`crate::JsonFileStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub(crate) state: RwLock<StoreState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn put_document(&self, document: Document) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.documents.contains_key(&document.id) {
            return Err(StoreError::DocumentExists(document.id));
        }
        state.documents.insert(document.id.clone(), document);
        Ok(())
    }

    async fn get_document(&self, id: &str) -> StoreResult<Document> {
        self.state
            .read()
            .await
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))
    }

    async fn documents(&self, corpus: Option<Corpus>) -> StoreResult<Vec<Document>> {
        Ok(self.state.read().await.sorted_documents(corpus))
    }

    async fn create_run(&self, run: AuditRun) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.runs.contains_key(&run.id) {
            return Err(StoreError::RunExists(run.id));
        }
        state.runs.insert(run.id.clone(), run);
        Ok(())
    }

    async fn get_run(&self, id: &str) -> StoreResult<AuditRun> {
        self.state
            .read()
            .await
            .runs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::RunNotFound(id.to_string()))
    }

    async fn update_run(&self, run: AuditRun) -> StoreResult<()> {
        let mut state = self.state.write().await;
        match state.runs.get_mut(&run.id) {
            Some(slot) => {
                *slot = run;
                Ok(())
            }
            None => Err(StoreError::RunNotFound(run.id)),
        }
    }

    async fn runs(&self) -> StoreResult<Vec<AuditRun>> {
        Ok(self.state.read().await.sorted_runs())
    }

    async fn upsert_outcome(
        &self,
        run_id: &str,
        sequence: usize,
        outcome: ChunkOutcome,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.runs.contains_key(run_id) {
            return Err(StoreError::RunNotFound(run_id.to_string()));
        }
        state.outcomes.entry(run_id.to_string()).or_default().insert(
            outcome.chunk_id().to_string(),
            StoredOutcome {
                run_id: run_id.to_string(),
                sequence,
                outcome,
            },
        );
        Ok(())
    }

    async fn outcomes(&self, run_id: &str) -> StoreResult<Vec<ChunkOutcome>> {
        let state = self.state.read().await;
        if !state.runs.contains_key(run_id) {
            return Err(StoreError::RunNotFound(run_id.to_string()));
        }
        Ok(state
            .sorted_outcomes(run_id)
            .into_iter()
            .map(|stored| stored.outcome)
            .collect())
    }
}
