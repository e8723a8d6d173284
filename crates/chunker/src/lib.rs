//! # Audit Chunker
//!
//! Structure-aware splitting of manuals, regulations and guidance into addressable
//! sections.
//!
//! ## Philosophy
//!
//! Chunks follow the document's own structure:
//! - Section boundaries come from headings (Markdown, numbered, part/chapter, regulation ids)
//! - Every chunk carries the heading path from the root to its section
//! - Oversized sections fall back to paragraph, then sentence boundaries
//! - List items and table rows are atomic and never split
//! - Splitting is deterministic: identical input yields identical chunks
//!
//! ## Architecture
//!
//! ```text
//! Raw text
//!     │
//!     ├──> Line classification (heading / list item / table row / text / blank)
//!     │
//!     ├──> Section assembly (heading stack → heading paths + labels)
//!     │
//!     └──> Packing
//!          ├─> Blocks packed up to max_chunk_chars
//!          ├─> Oversized paragraphs split at sentence bounds
//!          └─> Emit Chunk[] with stable ids and byte spans
//! ```
//!
//! ## Example
//!
//! ```rust
//! use audit_chunker::{Chunker, ChunkerConfig};
//! use audit_protocol::Corpus;
//!
//! let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
//! let text = "# 4 Quality\n\n## 4.2 Records\n\nRecords are kept for three years.\n";
//! let chunks = chunker.chunk_document("moe", Corpus::Manual, text).unwrap();
//! assert_eq!(chunks[0].heading_path, vec!["4 Quality", "4.2 Records"]);
//! assert_eq!(chunks[0].label.as_deref(), Some("4.2"));
//! ```

mod chunker;
mod config;
mod error;
mod labels;
mod lines;
mod strategy;

pub use chunker::Chunker;
pub use config::ChunkerConfig;
pub use error::{ChunkerError, Result};
pub use labels::{normalize_label, strip_subparagraph};
