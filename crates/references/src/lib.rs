//! # Audit References
//!
//! Extraction and recursive resolution of in-text section references
//! (`Section 4.2`, `Part-145.A.30`, `OSA 5`, `kohdassa 3.4`, ...).
//!
//! ## Architecture
//!
//! ```text
//! Focus chunk text
//!     │
//!     ├──> Label extraction (regulation ids, keyword + number, localized variants)
//!     │
//!     ├──> Breadth-first expansion
//!     │      ├─ lookup per corpus: manual (same document first), then the rest
//!     │      ├─ visited set by chunk id (terminates on A → B → A)
//!     │      └─ depth, count and per-label caps
//!     │
//!     └──> Resolution
//!            ├─ resolved chunks (label, source, depth)
//!            ├─ reference graph (petgraph)
//!            └─ dangling labels, lookup errors, truncation flag
//! ```

mod error;
mod extract;
mod graph;
mod resolver;

pub use error::{ReferenceResolutionError, Result};
pub use extract::extract_labels;
pub use graph::{ReferenceEdge, ReferenceGraph, ReferenceNode};
pub use resolver::{
    LabelSource, ReferenceResolver, Resolution, ResolvedReference, ResolverConfig,
};
