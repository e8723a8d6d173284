use crate::error::{ReferenceResolutionError, Result};
use crate::extract::extract_labels;
use crate::graph::ReferenceGraph;
use audit_index::ChunkIndex;
use audit_protocol::{Chunk, Corpus};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Where the resolver looks labels up
pub trait LabelSource {
    fn lookup(&self, corpus: Corpus, label: &str) -> Result<Vec<Arc<Chunk>>>;
}

impl LabelSource for ChunkIndex {
    fn lookup(&self, corpus: Corpus, label: &str) -> Result<Vec<Arc<Chunk>>> {
        Ok(self.lookup_by_label(corpus, label))
    }
}

/// Bounds for recursive reference expansion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Levels of references followed from the focus chunk
    pub max_depth: usize,

    /// Total resolved chunks per focus chunk
    pub max_resolved: usize,

    /// Matches kept for one ambiguous label
    pub max_matches_per_label: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_resolved: 12,
            max_matches_per_label: 2,
        }
    }
}

impl ResolverConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_matches_per_label == 0 {
            return Err("max_matches_per_label must be > 0".to_string());
        }
        Ok(())
    }
}

/// A chunk pulled in by a reference
#[derive(Debug, Clone)]
pub struct ResolvedReference {
    pub chunk: Arc<Chunk>,

    /// Normalized label that matched
    pub label: String,

    /// Chunk whose text carried the label
    pub source_id: String,

    /// 1 for labels in the focus text, 2 for labels in those chunks, ...
    pub depth: usize,
}

#[derive(Debug, Default)]
pub struct Resolution {
    pub references: Vec<ResolvedReference>,
    pub graph: ReferenceGraph,
    pub dangling: Vec<String>,
    pub errors: Vec<ReferenceResolutionError>,

    /// A depth or count cap stopped expansion while new chunks were reachable
    pub truncated: bool,
}

impl Resolution {
    #[must_use]
    pub fn chunk_ids(&self) -> Vec<&str> {
        self.references.iter().map(|r| r.chunk.id.as_str()).collect()
    }
}

/// Iterative breadth-first reference expansion with a visited set
#[derive(Debug, Clone, Default)]
pub struct ReferenceResolver {
    config: ResolverConfig,
}

impl ReferenceResolver {
    #[must_use]
    pub const fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve references reachable from `focus`.
    ///
    /// Chunks in `exclude` (and the focus itself) are never returned or expanded.
    /// Lookup failures degrade to unresolved labels.
    pub fn resolve(
        &self,
        source: &dyn LabelSource,
        focus: &Chunk,
        exclude: &HashSet<String>,
    ) -> Resolution {
        let mut resolution = Resolution::default();
        let mut visited: HashSet<String> = exclude.clone();
        visited.insert(focus.id.clone());
        resolution.graph.add_chunk(&focus.id);

        let mut queue: VecDeque<(String, String, String, usize)> = VecDeque::new();
        queue.push_back((focus.id.clone(), focus.document_id.clone(), focus.text.clone(), 0));

        while let Some((source_id, document_id, text, depth)) = queue.pop_front() {
            let labels = extract_labels(&text);
            if labels.is_empty() {
                continue;
            }

            for label in labels {
                let candidates = match self.candidates(source, &label, &document_id, &source_id) {
                    Ok(candidates) => candidates,
                    Err(err) => {
                        log::warn!("Reference lookup failed for '{label}' in {source_id}: {err}");
                        resolution.errors.push(err);
                        push_unique(&mut resolution.dangling, &label);
                        continue;
                    }
                };

                if candidates.is_empty() {
                    resolution.graph.add_dangling(&source_id, &label, depth);
                    push_unique(&mut resolution.dangling, &label);
                    continue;
                }

                for chunk in candidates {
                    resolution.graph.add_reference(&source_id, &chunk.id, &label, depth);
                    if visited.contains(&chunk.id) {
                        continue;
                    }
                    if depth >= self.config.max_depth
                        || resolution.references.len() >= self.config.max_resolved
                    {
                        resolution.truncated = true;
                        continue;
                    }

                    visited.insert(chunk.id.clone());
                    queue.push_back((
                        chunk.id.clone(),
                        chunk.document_id.clone(),
                        chunk.text.clone(),
                        depth + 1,
                    ));
                    resolution.references.push(ResolvedReference {
                        chunk,
                        label: label.clone(),
                        source_id: source_id.clone(),
                        depth: depth + 1,
                    });
                }
            }
        }

        log::debug!(
            "Resolved {} references for {} ({} dangling, truncated: {})",
            resolution.references.len(),
            focus.id,
            resolution.dangling.len(),
            resolution.truncated
        );
        resolution
    }

    /// Matches for one label: manual (same document first), regulation, guidance, evidence
    fn candidates(
        &self,
        source: &dyn LabelSource,
        label: &str,
        document_id: &str,
        source_id: &str,
    ) -> Result<Vec<Arc<Chunk>>> {
        let limit = self.config.max_matches_per_label;
        let mut out: Vec<Arc<Chunk>> = Vec::new();

        for corpus in Corpus::ALL {
            let mut matches = source.lookup(corpus, label)?;
            matches.retain(|chunk| chunk.id != source_id);
            if corpus == Corpus::Manual {
                matches.sort_by_key(|chunk| chunk.document_id != document_id);
            }
            for chunk in matches {
                if out.len() >= limit {
                    return Ok(out);
                }
                out.push(chunk);
            }
        }
        Ok(out)
    }
}

fn push_unique(labels: &mut Vec<String>, label: &str) {
    if !labels.iter().any(|existing| existing == label) {
        labels.push(label.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_protocol::chunk_id;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    /// In-memory label source keyed by (corpus, normalized label)
    #[derive(Default)]
    struct Labels {
        entries: HashMap<(Corpus, String), Vec<Arc<Chunk>>>,
        failing: Option<String>,
    }

    impl Labels {
        fn add(&mut self, doc: &str, corpus: Corpus, seq: usize, label: &str, text: &str) {
            let chunk = Arc::new(Chunk {
                id: chunk_id(doc, seq),
                document_id: doc.to_string(),
                corpus,
                sequence: seq,
                heading_path: Vec::new(),
                label: Some(label.to_string()),
                text: text.to_string(),
                start: 0,
                end: text.len(),
                embedding: None,
            });
            self.entries
                .entry((corpus, label.to_string()))
                .or_default()
                .push(chunk);
        }

        fn focus(text: &str) -> Chunk {
            Chunk {
                id: "moe#99".to_string(),
                document_id: "moe".to_string(),
                corpus: Corpus::Manual,
                sequence: 99,
                heading_path: Vec::new(),
                label: None,
                text: text.to_string(),
                start: 0,
                end: text.len(),
                embedding: None,
            }
        }
    }

    impl LabelSource for Labels {
        fn lookup(&self, corpus: Corpus, label: &str) -> Result<Vec<Arc<Chunk>>> {
            if self.failing.as_deref() == Some(label) {
                return Err(ReferenceResolutionError::LookupFailed {
                    label: label.to_string(),
                    corpus,
                    reason: "backend unavailable".to_string(),
                });
            }
            Ok(self
                .entries
                .get(&(corpus, label.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    #[test]
    fn circular_references_terminate() {
        let mut labels = Labels::default();
        labels.add("moe", Corpus::Manual, 0, "1", "See section 2.");
        labels.add("moe", Corpus::Manual, 1, "2", "See section 1.");

        let resolver = ReferenceResolver::new(ResolverConfig {
            max_depth: 10,
            ..Default::default()
        });
        let resolution =
            resolver.resolve(&labels, &Labels::focus("Refer to section 1."), &HashSet::new());

        assert_eq!(resolution.chunk_ids(), vec!["moe#0", "moe#1"]);
        assert_eq!(resolution.references[1].depth, 2);
        assert!(resolution.graph.has_cycle());
        assert!(!resolution.truncated);
    }

    #[test]
    fn depth_cap_marks_truncation() {
        let mut labels = Labels::default();
        labels.add("moe", Corpus::Manual, 0, "1", "See section 2.");
        labels.add("moe", Corpus::Manual, 1, "2", "See section 3.");
        labels.add("moe", Corpus::Manual, 2, "3", "End.");

        let resolver = ReferenceResolver::new(ResolverConfig {
            max_depth: 1,
            ..Default::default()
        });
        let resolution = resolver.resolve(&labels, &Labels::focus("section 1"), &HashSet::new());
        assert_eq!(resolution.chunk_ids(), vec!["moe#0"]);
        assert!(resolution.truncated);

        let none = ReferenceResolver::new(ResolverConfig {
            max_depth: 0,
            ..Default::default()
        })
        .resolve(&labels, &Labels::focus("section 1"), &HashSet::new());
        assert!(none.references.is_empty());
    }

    #[test]
    fn count_cap_and_ambiguity_bound() {
        let mut labels = Labels::default();
        for seq in 0..4 {
            labels.add("moe", Corpus::Manual, seq, "4", "Ambiguous heading");
        }
        labels.add("reg", Corpus::Regulation, 0, "5", "Regulation text");
        labels.add("reg", Corpus::Regulation, 1, "6", "Regulation text");

        let resolver = ReferenceResolver::new(ResolverConfig {
            max_resolved: 3,
            ..Default::default()
        });
        let resolution = resolver.resolve(
            &labels,
            &Labels::focus("section 4, section 5 and section 6"),
            &HashSet::new(),
        );
        assert_eq!(resolution.chunk_ids(), vec!["moe#0", "moe#1", "reg#0"]);
        assert!(resolution.truncated);
    }

    #[test]
    fn prefers_same_manual_then_regulations() {
        let mut labels = Labels::default();
        labels.add("other", Corpus::Manual, 0, "4.2", "Other manual");
        labels.add("moe", Corpus::Manual, 3, "4.2", "Same manual");
        labels.add("reg", Corpus::Regulation, 0, "4.2", "Regulation");

        let resolver = ReferenceResolver::new(ResolverConfig {
            max_matches_per_label: 3,
            ..Default::default()
        });
        let resolution = resolver.resolve(&labels, &Labels::focus("section 4.2"), &HashSet::new());
        assert_eq!(resolution.chunk_ids(), vec!["moe#3", "other#0", "reg#0"]);
    }

    #[test]
    fn excluded_and_dangling_and_failing_labels() {
        let mut labels = Labels::default();
        labels.add("moe", Corpus::Manual, 0, "1", "One");
        labels.add("moe", Corpus::Manual, 1, "2", "Two");
        labels.failing = Some("3".to_string());

        let exclude: HashSet<String> = ["moe#0".to_string()].into_iter().collect();
        let resolution = ReferenceResolver::default().resolve(
            &labels,
            &Labels::focus("section 1, section 2, section 3, section 9"),
            &exclude,
        );
        assert_eq!(resolution.chunk_ids(), vec!["moe#1"]);
        assert_eq!(resolution.dangling, vec!["3", "9"]);
        assert_eq!(resolution.errors.len(), 1);
    }
}
