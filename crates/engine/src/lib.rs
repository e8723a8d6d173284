//! # Audit Engine
//!
//! Runs audits over whole manuals and turns the results into a report.
//!
//! ## Architecture
//!
//! ```text
//! AuditJobs::submit ──> AuditHandle (status / cancel / join)
//!        │
//!        ▼ tokio::spawn
//! Orchestrator::run
//!   ├─ Semaphore(max_workers) + JoinSet ──> ChunkAnalyzer per manual chunk
//!   └─ mpsc ──> single writer ──> AuditStore (MemoryStore | JsonFileStore)
//!                                       │
//!                                       ▼
//!                              ReportGenerator ──> FinalReport
//! ```
//!
//! A chunk whose analysis fails is stored as an error marker and never aborts the
//! run. The run fails only when no chunk produced a usable verdict.

mod error;
mod jobs;
mod json_store;
mod orchestrator;
mod report;
mod store;

pub use error::{EngineError, ReportError, Result, StoreError, StoreResult};
pub use jobs::{AuditHandle, AuditJobs, ChunkError, JobState};
pub use json_store::JsonFileStore;
pub use orchestrator::{
    compliance_score, EngineConfig, Orchestrator, PERFECT_SCORE, RED_PENALTY, YELLOW_PENALTY,
};
pub use report::{AnalysisErrorEntry, FinalReport, FlagSummary, Issue, ReportGenerator};
pub use store::{AuditStore, MemoryStore};
