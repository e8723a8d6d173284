use crate::bundle::{ContextBundle, ContextEntry, EntryOrigin};
use crate::error::{ContextError, Result};
use crate::limits::ContextLimits;
use audit_index::{ChunkIndex, Neighbor, SharedIndex};
use audit_protocol::{Chunk, Corpus};
use audit_references::ReferenceResolver;
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

/// Assembles bounded context bundles from the shared index
pub struct ContextBuilder {
    index: SharedIndex,
    resolver: ReferenceResolver,
    limits: ContextLimits,
    query_cache: Mutex<LruCache<String, Arc<Vec<f32>>>>,
}

impl ContextBuilder {
    pub fn new(
        index: SharedIndex,
        resolver: ReferenceResolver,
        limits: ContextLimits,
    ) -> Result<Self> {
        limits.validate().map_err(ContextError::InvalidLimits)?;
        resolver
            .config()
            .validate()
            .map_err(ContextError::InvalidLimits)?;
        let capacity = NonZeroUsize::new(limits.query_cache_size)
            .ok_or_else(|| {
                ContextError::InvalidLimits("query_cache_size must be > 0".to_string())
            })?;
        Ok(Self {
            index,
            resolver,
            limits,
            query_cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    #[must_use]
    pub const fn limits(&self) -> &ContextLimits {
        &self.limits
    }

    #[must_use]
    pub const fn index(&self) -> &SharedIndex {
        &self.index
    }

    /// Build the bundle for `focus`, merging hits for every prior follow-up query.
    ///
    /// Order of inclusion (first wins on duplicates): resolved references, nearest
    /// neighbours per corpus, query hits per corpus.
    pub async fn build(
        &self,
        focus: Arc<Chunk>,
        prior_queries: &[String],
    ) -> Result<ContextBundle> {
        let queries = distinct_queries(prior_queries);
        let focus_vector = self.focus_vector(&focus).await?;
        let mut query_vectors = Vec::with_capacity(queries.len());
        for query in &queries {
            query_vectors.push(self.query_vector(query).await?);
        }

        let index = self.index.read().await;
        let mut bundle = ContextBundle::new(Arc::clone(&focus));

        let exclude: HashSet<String> = std::iter::once(focus.id.clone()).collect();
        let resolution = self.resolver.resolve(&*index, &focus, &exclude);
        if !resolution.errors.is_empty() {
            log::warn!(
                "{} reference lookups failed for {}",
                resolution.errors.len(),
                focus.id
            );
        }
        bundle.references_truncated =
            resolution.truncated || resolution.references.len() > self.limits.max_references;
        bundle.dangling_labels = resolution.dangling;
        bundle.references = resolution
            .references
            .into_iter()
            .take(self.limits.max_references)
            .map(|reference| ContextEntry {
                chunk: reference.chunk,
                distance: None,
                origin: EntryOrigin::Reference {
                    label: reference.label,
                    depth: reference.depth,
                },
            })
            .collect();

        let mut included = bundle.included_ids();

        for corpus in Corpus::ALL {
            let k = self.limits.k_for(corpus);
            for hit in nearest_excluding(&index, corpus, &focus_vector, k, &included)? {
                included.insert(hit.chunk.id.clone());
                bundle.slice_mut(corpus).push(ContextEntry {
                    chunk: hit.chunk,
                    distance: Some(hit.distance),
                    origin: EntryOrigin::Similar,
                });
            }
        }

        for (query, vector) in queries.iter().zip(&query_vectors) {
            for corpus in Corpus::ALL {
                let k = self.limits.k_query_per_corpus;
                for hit in nearest_excluding(&index, corpus, vector, k, &included)? {
                    included.insert(hit.chunk.id.clone());
                    bundle.slice_mut(corpus).push(ContextEntry {
                        chunk: hit.chunk,
                        distance: Some(hit.distance),
                        origin: EntryOrigin::Query(query.clone()),
                    });
                }
            }
        }

        for corpus in Corpus::ALL {
            let slice = bundle.slice_mut(corpus);
            if slice.len() > self.limits.max_slice_entries {
                slice.sort_by(|a, b| {
                    a.distance
                        .unwrap_or(f32::MAX)
                        .total_cmp(&b.distance.unwrap_or(f32::MAX))
                        .then(a.chunk.sequence.cmp(&b.chunk.sequence))
                        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
                });
                slice.truncate(self.limits.max_slice_entries);
            }
        }

        bundle.queries = queries;
        log::debug!(
            "Context for {}: {:?} ({} queries)",
            focus.id,
            bundle.counts(),
            bundle.queries.len()
        );
        Ok(bundle)
    }

    async fn focus_vector(&self, focus: &Chunk) -> Result<Vec<f32>> {
        if let Some(vector) = &focus.embedding {
            return Ok(vector.clone());
        }
        let (stored, embedder) = {
            let index = self.index.read().await;
            let stored = index.get(&focus.id).and_then(|c| c.embedding.clone());
            (stored, index.embedder())
        };
        match stored {
            Some(vector) => Ok(vector),
            None => Ok(embedder.embed(&focus.text).await?),
        }
    }

    async fn query_vector(&self, query: &str) -> Result<Arc<Vec<f32>>> {
        let cached = self.cache().get(query).cloned();
        if let Some(hit) = cached {
            return Ok(hit);
        }
        let embedder = self.index.read().await.embedder();
        let vector = Arc::new(embedder.embed(query).await?);
        self.cache().put(query.to_string(), Arc::clone(&vector));
        Ok(vector)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, LruCache<String, Arc<Vec<f32>>>> {
        self.query_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn cached_queries(&self) -> usize {
        self.cache().len()
    }
}

/// Trimmed, non-empty, case-insensitively distinct, in first-seen order
fn distinct_queries(queries: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    queries
        .iter()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.to_lowercase()))
        .map(str::to_string)
        .collect()
}

fn nearest_excluding(
    index: &ChunkIndex,
    corpus: Corpus,
    vector: &[f32],
    k: usize,
    exclude: &HashSet<String>,
) -> Result<Vec<Neighbor>> {
    if k == 0 {
        return Ok(Vec::new());
    }
    Ok(index
        .nearest(corpus, vector, k + exclude.len())?
        .into_iter()
        .filter(|hit| !exclude.contains(&hit.chunk.id))
        .take(k)
        .collect())
}
