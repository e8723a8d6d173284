use crate::embedder::{cosine_distance, Embedder};
use crate::error::{IndexError, Result};
use audit_chunker::{normalize_label, strip_subparagraph};
use audit_protocol::{Chunk, Corpus, Document};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// Read-mostly index shared between the ingestion path and concurrent audits
pub type SharedIndex = Arc<RwLock<ChunkIndex>>;

/// A chunk returned by [`ChunkIndex::nearest`] with its cosine distance to the query
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub chunk: Arc<Chunk>,
    pub distance: f32,
}

/// Embedding-backed similarity store, partitioned by corpus
pub struct ChunkIndex {
    embedder: Arc<dyn Embedder>,
    chunks: HashMap<String, Arc<Chunk>>,
    /// Chunk ids per corpus
    corpora: BTreeMap<Corpus, Vec<String>>,
    /// Normalized label → chunk ids, per corpus
    labels: BTreeMap<Corpus, BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    schema_version: u32,
    model_id: String,
    dimension: usize,
    chunks: Vec<Chunk>,
}

impl ChunkIndex {
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            chunks: HashMap::new(),
            corpora: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn into_shared(self) -> SharedIndex {
        Arc::new(RwLock::new(self))
    }

    #[must_use]
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Insert a chunk, computing its embedding once.
    ///
    /// Re-upserting an identical chunk (same id and text) is a no-op and returns `false`.
    pub async fn upsert(&mut self, chunk: Chunk) -> Result<bool> {
        if self.is_unchanged(&chunk) {
            return Ok(false);
        }
        let mut chunk = chunk;
        if chunk.embedding.is_none() {
            chunk.embedding = Some(self.embedder.embed(&chunk.text).await?);
        }
        self.insert(chunk)?;
        Ok(true)
    }

    /// Insert every chunk of a document with one batch embedding call.
    /// Returns the number of chunks that were new or changed.
    pub async fn upsert_document(&mut self, document: &Document) -> Result<usize> {
        let pending: Vec<&Chunk> = document
            .chunks
            .iter()
            .filter(|chunk| !self.is_unchanged(chunk))
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let missing: Vec<&str> = pending
            .iter()
            .filter(|chunk| chunk.embedding.is_none())
            .map(|chunk| chunk.text.as_str())
            .collect();
        let mut vectors = self.embedder.embed_batch(&missing).await?.into_iter();
        if vectors.len() != missing.len() {
            return Err(IndexError::EmbeddingError(format!(
                "Embedder returned {} vectors for {} texts",
                vectors.len(),
                missing.len()
            )));
        }

        let count = pending.len();
        for chunk in pending {
            let mut chunk = chunk.clone();
            if chunk.embedding.is_none() {
                chunk.embedding = vectors.next();
            }
            self.insert(chunk)?;
        }

        log::info!(
            "Indexed {count} chunks of '{}' ({}), total {}",
            document.id,
            document.corpus,
            self.chunks.len()
        );
        Ok(count)
    }

    /// At most `k` chunks of `corpus`, ascending cosine distance, ties by (sequence, id)
    pub fn nearest(&self, corpus: Corpus, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimension(query.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<Neighbor> = self
            .corpus_chunks(corpus)
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_deref()?;
                Some(Neighbor {
                    distance: cosine_distance(query, embedding),
                    chunk: Arc::clone(chunk),
                })
            })
            .collect();

        scored.sort_by(compare_neighbors);
        scored.truncate(k);
        Ok(scored)
    }

    /// Section-label lookup: exact normalized match, then suffix match for
    /// regulation ids (`a.30` finds `145.a.30`), then without a trailing
    /// sub-paragraph letter (`145.a.30.b` finds `145.a.30`).
    ///
    /// Matches are ordered by (document id, sequence); an empty result is not an error.
    #[must_use]
    pub fn lookup_by_label(&self, corpus: Corpus, label: &str) -> Vec<Arc<Chunk>> {
        let Some(query) = normalize_label(label) else {
            return Vec::new();
        };
        let Some(labels) = self.labels.get(&corpus) else {
            return Vec::new();
        };

        let mut ids: Vec<&String> = labels
            .get(&query)
            .map(|ids| ids.iter().collect())
            .unwrap_or_default();

        if ids.is_empty() && query.contains('.') {
            let suffix = format!(".{query}");
            ids = labels
                .iter()
                .filter(|(candidate, _)| candidate.ends_with(&suffix))
                .flat_map(|(_, ids)| ids.iter())
                .collect();
        }

        if ids.is_empty() {
            if let Some(parent) = strip_subparagraph(&query) {
                ids = labels.get(&parent).map(|ids| ids.iter().collect()).unwrap_or_default();
            }
        }

        let mut matches: Vec<Arc<Chunk>> = ids
            .into_iter()
            .filter_map(|id| self.chunks.get(id).cloned())
            .collect();
        matches.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then(a.sequence.cmp(&b.sequence))
        });
        matches
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Chunk>> {
        self.chunks.get(id).cloned()
    }

    /// All indexed chunks of one document in sequence order
    #[must_use]
    pub fn chunks_of(&self, document_id: &str) -> Vec<Arc<Chunk>> {
        let mut chunks: Vec<Arc<Chunk>> = self
            .chunks
            .values()
            .filter(|chunk| chunk.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|chunk| chunk.sequence);
        chunks
    }

    #[must_use]
    pub fn corpus_len(&self, corpus: Corpus) -> usize {
        self.corpora.get(&corpus).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut chunks: Vec<Chunk> = self.chunks.values().map(|c| c.as_ref().clone()).collect();
        chunks.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then(a.sequence.cmp(&b.sequence))
        });
        let persisted = PersistedIndex {
            schema_version: INDEX_SCHEMA_VERSION,
            model_id: self.embedder.model_id().to_string(),
            dimension: self.dimension(),
            chunks,
        };

        let bytes = serde_json::to_vec_pretty(&persisted)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        log::debug!("Saved index with {} chunks to {}", self.chunks.len(), path.display());
        Ok(())
    }

    /// Load a saved index; the embedder must produce vectors of the persisted dimension
    pub async fn load(path: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let persisted: PersistedIndex = serde_json::from_slice(&bytes)?;
        if persisted.schema_version != INDEX_SCHEMA_VERSION {
            return Err(IndexError::UnsupportedSchema {
                found: persisted.schema_version,
                expected: INDEX_SCHEMA_VERSION,
            });
        }
        if persisted.dimension != embedder.dimension() {
            return Err(IndexError::InvalidDimension {
                expected: embedder.dimension(),
                actual: persisted.dimension,
            });
        }
        if persisted.model_id != embedder.model_id() {
            log::warn!(
                "Index at {} was built with embedder '{}', loading with '{}'",
                path.display(),
                persisted.model_id,
                embedder.model_id()
            );
        }

        let mut index = Self::new(embedder);
        for chunk in persisted.chunks {
            index.insert(chunk)?;
        }
        log::info!("Loaded index with {} chunks from {}", index.len(), path.display());
        Ok(index)
    }

    fn is_unchanged(&self, chunk: &Chunk) -> bool {
        self.chunks
            .get(&chunk.id)
            .is_some_and(|existing| existing.text == chunk.text && existing.corpus == chunk.corpus)
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        let expected = self.dimension();
        if actual != expected {
            return Err(IndexError::InvalidDimension { expected, actual });
        }
        Ok(())
    }

    fn insert(&mut self, chunk: Chunk) -> Result<()> {
        if let Some(embedding) = &chunk.embedding {
            self.check_dimension(embedding.len())?;
        }
        self.remove(&chunk.id);

        let id = chunk.id.clone();
        self.corpora.entry(chunk.corpus).or_default().push(id.clone());
        if let Some(label) = chunk.label.as_deref().and_then(normalize_label) {
            self.labels
                .entry(chunk.corpus)
                .or_default()
                .entry(label)
                .or_default()
                .push(id.clone());
        }
        self.chunks.insert(id, Arc::new(chunk));
        Ok(())
    }

    fn remove(&mut self, id: &str) {
        let Some(old) = self.chunks.remove(id) else {
            return;
        };
        if let Some(ids) = self.corpora.get_mut(&old.corpus) {
            ids.retain(|existing| existing != id);
        }
        if let Some(labels) = self.labels.get_mut(&old.corpus) {
            for ids in labels.values_mut() {
                ids.retain(|existing| existing != id);
            }
            labels.retain(|_, ids| !ids.is_empty());
        }
    }

    fn corpus_chunks(&self, corpus: Corpus) -> impl Iterator<Item = &Arc<Chunk>> {
        self.corpora
            .get(&corpus)
            .into_iter()
            .flatten()
            .filter_map(|id| self.chunks.get(id))
    }
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then(a.chunk.sequence.cmp(&b.chunk.sequence))
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}
