use audit_protocol::{Chunk, Corpus};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

/// Why an entry is in the bundle
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOrigin {
    /// Nearest neighbour of the focus chunk
    Similar,

    /// Pulled in by a section reference
    Reference { label: String, depth: usize },

    /// Hit for a follow-up query
    Query(String),
}

#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub chunk: Arc<Chunk>,

    /// Cosine distance to the focus chunk or query; `None` for references
    pub distance: Option<f32>,
    pub origin: EntryOrigin,
}

impl ContextEntry {
    fn header(&self) -> String {
        let locator = self.chunk.locator();
        match &self.origin {
            EntryOrigin::Similar => format!("[{}] {locator}", self.chunk.id),
            EntryOrigin::Reference { label, depth } => {
                format!("[{}] {locator} (referenced as {label}, depth {depth})", self.chunk.id)
            }
            EntryOrigin::Query(query) => {
                format!("[{}] {locator} (search: \"{query}\")", self.chunk.id)
            }
        }
    }
}

/// Slice sizes, shown to the classifier ahead of the context text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContextCounts {
    pub references: usize,
    pub manual: usize,
    pub regulation: usize,
    pub guidance: usize,
    pub evidence: usize,
}

impl ContextCounts {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.references + self.manual + self.regulation + self.guidance + self.evidence
    }
}

/// Bounded context assembled for one focus chunk in one analysis round.
///
/// Never contains the focus chunk in any slice, never the same chunk id twice.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub focus: Arc<Chunk>,
    pub references: Vec<ContextEntry>,
    pub manual_neighbors: Vec<ContextEntry>,
    pub regulation: Vec<ContextEntry>,
    pub guidance: Vec<ContextEntry>,
    pub evidence: Vec<ContextEntry>,

    /// Follow-up queries applied, in order
    pub queries: Vec<String>,

    /// Labels cited in the focus text (or its references) that matched nothing
    pub dangling_labels: Vec<String>,

    /// Reference expansion stopped at a cap, or `max_references` dropped entries
    pub references_truncated: bool,
}

impl ContextBundle {
    #[must_use]
    pub fn new(focus: Arc<Chunk>) -> Self {
        Self {
            focus,
            references: Vec::new(),
            manual_neighbors: Vec::new(),
            regulation: Vec::new(),
            guidance: Vec::new(),
            evidence: Vec::new(),
            queries: Vec::new(),
            dangling_labels: Vec::new(),
            references_truncated: false,
        }
    }

    #[must_use]
    pub fn slice(&self, corpus: Corpus) -> &[ContextEntry] {
        match corpus {
            Corpus::Manual => &self.manual_neighbors,
            Corpus::Regulation => &self.regulation,
            Corpus::Guidance => &self.guidance,
            Corpus::Evidence => &self.evidence,
        }
    }

    pub(crate) fn slice_mut(&mut self, corpus: Corpus) -> &mut Vec<ContextEntry> {
        match corpus {
            Corpus::Manual => &mut self.manual_neighbors,
            Corpus::Regulation => &mut self.regulation,
            Corpus::Guidance => &mut self.guidance,
            Corpus::Evidence => &mut self.evidence,
        }
    }

    /// All entries: references first, then corpus slices
    pub fn entries(&self) -> impl Iterator<Item = &ContextEntry> {
        self.references
            .iter()
            .chain(Corpus::ALL.into_iter().flat_map(move |corpus| self.slice(corpus)))
    }

    /// Ids of every included chunk, the focus chunk among them
    #[must_use]
    pub fn included_ids(&self) -> HashSet<String> {
        std::iter::once(self.focus.id.clone())
            .chain(self.entries().map(|entry| entry.chunk.id.clone()))
            .collect()
    }

    #[must_use]
    pub fn contains(&self, chunk_id: &str) -> bool {
        self.focus.id == chunk_id || self.entries().any(|entry| entry.chunk.id == chunk_id)
    }

    #[must_use]
    pub fn counts(&self) -> ContextCounts {
        ContextCounts {
            references: self.references.len(),
            manual: self.manual_neighbors.len(),
            regulation: self.regulation.len(),
            guidance: self.guidance.len(),
            evidence: self.evidence.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }

    /// Flattened text grouped by source, each entry with its heading path.
    ///
    /// `max_entry_chars == 0` renders entries in full.
    #[must_use]
    pub fn render_text(&self, max_entry_chars: usize) -> String {
        let mut out = String::new();
        let groups = std::iter::once(("Referenced sections", self.references.as_slice()))
            .chain(Corpus::ALL.into_iter().map(|corpus| (corpus.title(), self.slice(corpus))));

        for (title, entries) in groups {
            if entries.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            let _ = writeln!(out, "### {title}");
            for entry in entries {
                let _ = writeln!(out, "{}", entry.header());
                let _ = writeln!(out, "{}", truncate_chars(&entry.chunk.text, max_entry_chars));
            }
        }

        if !self.dangling_labels.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            let _ = writeln!(
                out,
                "### Unresolved references\n{}",
                self.dangling_labels.join(", ")
            );
        }
        out
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return text.to_string();
    }
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{} […]", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_protocol::chunk_id;

    fn chunk(doc: &str, corpus: Corpus, seq: usize, heading: &[&str], text: &str) -> Arc<Chunk> {
        Arc::new(Chunk {
            id: chunk_id(doc, seq),
            document_id: doc.to_string(),
            corpus,
            sequence: seq,
            heading_path: heading.iter().map(|h| (*h).to_string()).collect(),
            label: None,
            text: text.to_string(),
            start: 0,
            end: text.len(),
            embedding: None,
        })
    }

    #[test]
    fn renders_groups_in_fixed_order() {
        let mut bundle = ContextBundle::new(chunk("moe", Corpus::Manual, 1, &["2 Staff"], "focus"));
        bundle.regulation.push(ContextEntry {
            chunk: chunk("reg", Corpus::Regulation, 0, &["145.A.30 Personnel"], "Regulation text"),
            distance: Some(0.2),
            origin: EntryOrigin::Similar,
        });
        bundle.references.push(ContextEntry {
            chunk: chunk("moe", Corpus::Manual, 0, &["1 Scope"], "Scope text that is long"),
            distance: None,
            origin: EntryOrigin::Reference {
                label: "1".to_string(),
                depth: 1,
            },
        });
        bundle.dangling_labels.push("9.9".to_string());

        let text = bundle.render_text(10);
        assert_eq!(
            text,
            "### Referenced sections\n\
             [moe#0] 1 Scope (referenced as 1, depth 1)\n\
             Scope text […]\n\
             \n\
             ### Regulations\n\
             [reg#0] 145.A.30 Personnel\n\
             Regulation […]\n\
             \n\
             ### Unresolved references\n\
             9.9\n"
        );

        let counts = bundle.counts();
        assert_eq!((counts.references, counts.regulation, counts.total()), (1, 1, 2));
        assert!(bundle.contains("moe#1"));
        assert!(bundle.contains("reg#0"));
        assert_eq!(bundle.included_ids().len(), 3);
    }

    #[test]
    fn empty_bundle_renders_nothing() {
        let bundle = ContextBundle::new(chunk("moe", Corpus::Manual, 0, &[], "focus"));
        assert!(bundle.is_empty());
        assert_eq!(bundle.render_text(0), "");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("äöüß", 2), "äö […]");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("short", 0), "short");
    }
}
