use crate::error::{StoreError, StoreResult};
use crate::store::{AuditStore, MemoryStore, StoreState, StoredOutcome};
use async_trait::async_trait;
use audit_protocol::{AuditRun, ChunkOutcome, Corpus, Document, STORE_SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStore {
    schema_version: u32,
    documents: Vec<Document>,
    runs: Vec<AuditRun>,
    outcomes: Vec<StoredOutcome>,
}

/// [`MemoryStore`] snapshotted to one JSON file after every write
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
    /// Serializes mutate + snapshot so an older snapshot never overwrites a newer one
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading it if the file exists
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut state = StoreState::default();

        if tokio::fs::try_exists(&path).await? {
            let bytes = tokio::fs::read(&path).await?;
            let persisted: PersistedStore = serde_json::from_slice(&bytes)?;
            if persisted.schema_version != STORE_SCHEMA_VERSION {
                return Err(StoreError::UnsupportedSchema {
                    found: persisted.schema_version,
                    expected: STORE_SCHEMA_VERSION,
                });
            }
            for document in persisted.documents {
                state.documents.insert(document.id.clone(), document);
            }
            for run in persisted.runs {
                state.runs.insert(run.id.clone(), run);
            }
            for stored in persisted.outcomes {
                state
                    .outcomes
                    .entry(stored.run_id.clone())
                    .or_default()
                    .insert(stored.outcome.chunk_id().to_string(), stored);
            }
            log::debug!(
                "Loaded store {} ({} documents, {} runs)",
                path.display(),
                state.documents.len(),
                state.runs.len()
            );
        }

        let inner = MemoryStore::new();
        *inner.state.write().await = state;
        Ok(Self {
            path,
            inner,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn snapshot(&self) -> StoreResult<()> {
        let persisted = {
            let state = self.inner.state.read().await;
            let mut run_ids: Vec<&String> = state.outcomes.keys().collect();
            run_ids.sort();
            PersistedStore {
                schema_version: STORE_SCHEMA_VERSION,
                documents: state.sorted_documents(None),
                runs: state.sorted_runs(),
                outcomes: run_ids
                    .into_iter()
                    .flat_map(|run_id| state.sorted_outcomes(run_id))
                    .collect(),
            }
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(&persisted)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for JsonFileStore {
    async fn put_document(&self, document: Document) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.inner.put_document(document).await?;
        self.snapshot().await
    }

    async fn get_document(&self, id: &str) -> StoreResult<Document> {
        self.inner.get_document(id).await
    }

    async fn documents(&self, corpus: Option<Corpus>) -> StoreResult<Vec<Document>> {
        self.inner.documents(corpus).await
    }

    async fn create_run(&self, run: AuditRun) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.inner.create_run(run).await?;
        self.snapshot().await
    }

    async fn get_run(&self, id: &str) -> StoreResult<AuditRun> {
        self.inner.get_run(id).await
    }

    async fn update_run(&self, run: AuditRun) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.inner.update_run(run).await?;
        self.snapshot().await
    }

    async fn runs(&self) -> StoreResult<Vec<AuditRun>> {
        self.inner.runs().await
    }

    async fn upsert_outcome(
        &self,
        run_id: &str,
        sequence: usize,
        outcome: ChunkOutcome,
    ) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.inner.upsert_outcome(run_id, sequence, outcome).await?;
        self.snapshot().await
    }

    async fn outcomes(&self, run_id: &str) -> StoreResult<Vec<ChunkOutcome>> {
        self.inner.outcomes(run_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_protocol::RunStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("store.json");

        {
            let store = JsonFileStore::open(&path).await.unwrap();
            store
                .put_document(Document {
                    id: "moe".to_string(),
                    corpus: Corpus::Manual,
                    title: "MOE".to_string(),
                    chunks: Vec::new(),
                })
                .await
                .unwrap();
            let mut run = AuditRun::new("r1", "moe");
            store.create_run(run.clone()).await.unwrap();
            store
                .upsert_outcome(
                    "r1",
                    0,
                    ChunkOutcome::Error {
                        chunk_id: "moe#0".to_string(),
                        message: "timeout".to_string(),
                        rounds_attempted: 1,
                        requests_issued: 3,
                    },
                )
                .await
                .unwrap();
            run.status = RunStatus::Failed;
            store.update_run(run).await.unwrap();
        }

        assert!(!path.with_extension("json.tmp").exists());
        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get_run("r1").await.unwrap().status, RunStatus::Failed);
        assert_eq!(reopened.outcomes("r1").await.unwrap().len(), 1);
        assert_eq!(reopened.get_document("moe").await.unwrap().title, "MOE");
    }

    #[tokio::test]
    async fn rejects_unknown_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(
            &path,
            r#"{"schema_version": 99, "documents": [], "runs": [], "outcomes": []}"#,
        )
        .await
        .unwrap();
        assert!(matches!(
            JsonFileStore::open(&path).await,
            Err(StoreError::UnsupportedSchema { found: 99, .. })
        ));
    }
}
