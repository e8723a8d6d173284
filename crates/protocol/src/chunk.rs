use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Document category. Every document and chunk belongs to exactly one corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corpus {
    /// The manual under audit
    Manual,
    /// Binding regulations
    Regulation,
    /// Acceptable means of compliance and guidance material (AMC/GM)
    Guidance,
    /// Evidence, litigation and case law
    Evidence,
}

impl Corpus {
    pub const ALL: [Self; 4] = [
        Self::Manual,
        Self::Regulation,
        Self::Guidance,
        Self::Evidence,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Regulation => "regulation",
            Self::Guidance => "guidance",
            Self::Evidence => "evidence",
        }
    }

    /// Heading used when rendering context for the classifier
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Manual => "Manual neighbours",
            Self::Regulation => "Regulations",
            Self::Guidance => "Guidance (AMC/GM)",
            Self::Evidence => "Evidence / case law",
        }
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown corpus '{0}' (expected manual, regulation, guidance/amc/gm or evidence/litigation)")]
pub struct UnknownCorpus(pub String);

impl FromStr for Corpus {
    type Err = UnknownCorpus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "regulation" | "legislation" => Ok(Self::Regulation),
            "guidance" | "amc" | "gm" => Ok(Self::Guidance),
            "evidence" | "litigation" => Ok(Self::Evidence),
            _ => Err(UnknownCorpus(raw.to_string())),
        }
    }
}

/// Stable chunk identifier: `{document_id}#{sequence}`
#[must_use]
pub fn chunk_id(document_id: &str, sequence: usize) -> String {
    format!("{document_id}#{sequence}")
}

/// An addressable section of a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub corpus: Corpus,

    /// Position within the document (0-based)
    pub sequence: usize,

    /// Section titles from the root down to this chunk
    pub heading_path: Vec<String>,

    /// Normalized numbering of the innermost numbered heading (e.g. `4.2`, `145.a.30`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    pub text: String,

    /// Byte span `[start, end)` in the source text
    pub start: usize,
    pub end: usize,

    /// Cached embedding, computed once on first upsert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    #[must_use]
    pub fn heading_display(&self) -> String {
        self.heading_path.join(" > ")
    }

    /// Human-readable locator: heading path, else label, else id
    #[must_use]
    pub fn locator(&self) -> String {
        if !self.heading_path.is_empty() {
            return self.heading_display();
        }
        self.label.clone().unwrap_or_else(|| self.id.clone())
    }

    #[must_use]
    pub const fn span_len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// A chunked document. Immutable once chunked; re-ingestion creates a new id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub corpus: Corpus,
    pub title: String,
    pub chunks: Vec<Chunk>,
}

impl Document {
    #[must_use]
    pub fn chunk(&self, sequence: usize) -> Option<&Chunk> {
        self.chunks.get(sequence)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
