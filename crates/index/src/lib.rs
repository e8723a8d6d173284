//! # Audit Index
//!
//! Embedding-backed similarity store over document chunks, partitioned by corpus.
//!
//! ## Features
//!
//! - **Nearest-neighbour lookup** by cosine distance with deterministic tie-breaking
//! - **Section-label lookup** with normalized exact, suffix and parent matching
//! - **Pluggable embeddings** through the [`Embedder`] trait
//! - **Persistent storage** with JSON serialization and atomic writes
//!
//! ## Architecture
//!
//! ```text
//! Document / Chunk[]
//!     │
//!     ├──> Embedder (HTTP model or HashEmbedder)
//!     │      └─> Vector[dimension], cached on the chunk
//!     │
//!     ├──> Corpus partitions (manual / regulation / guidance / evidence)
//!     │      ├─> nearest(corpus, vector, k)
//!     │      └─> lookup_by_label(corpus, label)
//!     │
//!     └──> Persistent Storage (index.json, schema_version)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use audit_index::{ChunkIndex, Embedder, HashEmbedder};
//! use audit_protocol::Corpus;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let embedder = Arc::new(HashEmbedder::default());
//!     let index = ChunkIndex::load("index.json", embedder.clone()).await?;
//!
//!     let query = embedder.embed("critical part definition").await?;
//!     for hit in index.nearest(Corpus::Regulation, &query, 5)? {
//!         println!("{}: {:.3}", hit.chunk.id, hit.distance);
//!     }
//!     Ok(())
//! }
//! ```

mod embedder;
mod error;
mod index;

pub use embedder::{cosine_distance, cosine_similarity, Embedder, HashEmbedder};
pub use error::{IndexError, Result};
pub use index::{ChunkIndex, Neighbor, SharedIndex, INDEX_SCHEMA_VERSION};

pub use audit_chunker::normalize_label;
