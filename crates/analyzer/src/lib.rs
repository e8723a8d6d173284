//! # Audit Analyzer
//!
//! Drives the search-before-flag classification protocol for one focus chunk.
//!
//! ## Architecture
//!
//! ```text
//! ContextBuilder ──> ContextBundle ──> prompts ──> Classifier (raw JSON)
//!       ▲                                               │
//!       │ follow-up query                               ▼
//!       └──────────────── ChunkAnalyzer <──── parse_verdict + normalization
//!                              │
//!                              ▼
//!                        AnalysisRecord
//! ```
//!
//! A round whose call fails, times out or returns a structurally invalid verdict is
//! retried with the same bundle. Follow-up queries are bounded by `max_rounds`; a
//! verdict still asking for context when the budget is spent is kept and tagged
//! `context_truncated`.

mod analyzer;
mod classifier;
mod error;
mod prompts;
mod validate;

pub use analyzer::{AnalyzerConfig, ChunkAnalyzer};
pub use classifier::{ClassificationRequest, Classifier};
pub use error::{AnalysisError, ClassifierError, ProtocolViolation, Result, RoundFailure};
pub use prompts::{system_prompt, user_prompt};
pub use validate::parse_verdict;
