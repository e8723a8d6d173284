//! # Audit Protocol
//!
//! Shared data model for the manual audit engine: corpora, documents and chunks,
//! the classifier's structured verdict, and the records persisted per audit run.
//!
//! ```text
//! Document ──> Chunk[] ──> (analysis) ──> Verdict per round
//!                                             │
//!                                             └─> ChunkOutcome ──> AuditRun
//! ```

mod chunk;
mod run;
mod verdict;

pub use chunk::{chunk_id, Chunk, Corpus, Document, UnknownCorpus};
pub use run::{
    current_unix_ms, AnalysisRecord, AuditRun, ChunkOutcome, RoundRecord, RunStatus,
};
pub use verdict::{
    verdict_schema, Citations, Flag, Verdict, HIGH_SEVERITY_THRESHOLD, SEVERITY_FLOOR,
    SEVERITY_MAX,
};

pub const STORE_SCHEMA_VERSION: u32 = 1;
