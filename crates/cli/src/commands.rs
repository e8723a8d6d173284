use crate::app::App;
use crate::config::AuditConfig;
use anyhow::{bail, Context as AnyhowContext, Result};
use audit_chunker::Chunker;
use audit_engine::{AuditHandle, AuditJobs, AuditStore, EngineError, JobState, ReportGenerator};
use audit_protocol::{current_unix_ms, AuditRun, Corpus, Document, RunStatus};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct DocumentSummary<'a> {
    id: &'a str,
    corpus: Corpus,
    title: &'a str,
    chunks: usize,
}

impl<'a> From<&'a Document> for DocumentSummary<'a> {
    fn from(document: &'a Document) -> Self {
        Self {
            id: &document.id,
            corpus: document.corpus,
            title: &document.title,
            chunks: document.chunks.len(),
        }
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn chunk_file(
    chunker: &Chunker,
    path: &Path,
    id: &str,
    corpus: Corpus,
    title: &str,
) -> Result<Document> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = std::str::from_utf8(&bytes).with_context(|| {
        format!(
            "{} is not UTF-8 text; convert it before ingesting",
            path.display()
        )
    })?;
    Ok(chunker.chunk_into_document(id, corpus, title, text)?)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

pub async fn ingest(
    app: &App,
    corpus: Corpus,
    file: PathBuf,
    id: Option<String>,
    title: Option<String>,
) -> Result<()> {
    let chunker = Chunker::new(app.config.chunker.clone())?;
    let stem = file_stem(&file);
    let id = id.unwrap_or_else(|| format!("{stem}-{}", current_unix_ms()));
    let title = title.unwrap_or(stem);

    let document = chunk_file(&chunker, &file, &id, corpus, &title)?;
    log::info!("Chunked {} into {} chunks", file.display(), document.chunks.len());
    app.store.put_document(document.clone()).await?;
    app.build_index().await?;
    print_json(&DocumentSummary::from(&document))
}

pub fn chunk(config: &AuditConfig, corpus: Corpus, file: PathBuf) -> Result<()> {
    let chunker = Chunker::new(config.chunker.clone())?;
    let stem = file_stem(&file);
    let document = chunk_file(&chunker, &file, &stem, corpus, &stem)?;
    print_json(&document.chunks)
}

pub async fn documents(app: &App, corpus: Option<Corpus>) -> Result<()> {
    let documents = app.store.documents(corpus).await?;
    let summaries: Vec<DocumentSummary<'_>> = documents.iter().map(DocumentSummary::from).collect();
    print_json(&summaries)
}

pub async fn audit(app: &App, document_id: &str) -> Result<()> {
    let orchestrator = Arc::new(app.orchestrator().await?);
    let jobs = AuditJobs::new(orchestrator);
    let handle = jobs.submit(document_id).await?;
    let run_id = handle.run_id().to_string();
    log::info!("Audit run {run_id} submitted");

    let result = join_or_cancel(handle).await;
    let run = match result {
        Ok(run) => run,
        Err(EngineError::RunFailure { .. }) => jobs.run_status(&run_id).await?,
        Err(err) => return Err(err.into()),
    };
    let errors = jobs.chunk_errors(&run_id).await?;
    print_json(&json!({ "run": run, "chunk_errors": errors }))?;
    if run.status == RunStatus::Failed {
        bail!("Audit run {run_id} failed");
    }
    Ok(())
}

/// Join the run, cancelling it on Ctrl-C
async fn join_or_cancel(handle: AuditHandle) -> audit_engine::Result<AuditRun> {
    let cancel_requested = tokio::select! {
        result = tokio::signal::ctrl_c() => result.is_ok(),
        () = wait_finished(&handle) => false,
    };
    if cancel_requested {
        log::warn!("Cancelling audit run {}; chunks in flight will finish", handle.run_id());
        handle.cancel();
    }
    handle.join().await
}

async fn wait_finished(handle: &AuditHandle) {
    let mut states = handle.subscribe();
    let _ = states
        .wait_for(|state| matches!(state, JobState::Done | JobState::Cancelled))
        .await;
}

pub async fn status(app: &App, run_id: &str) -> Result<()> {
    let run = app.store.get_run(run_id).await?;
    let outcomes = app.store.outcomes(run_id).await?;
    let errors: Vec<_> = outcomes
        .iter()
        .filter(|o| o.is_error())
        .map(|o| o.chunk_id())
        .collect();
    print_json(&json!({
        "run": run,
        "outcomes": outcomes.len(),
        "errored_chunks": errors,
    }))
}

pub async fn runs(app: &App) -> Result<()> {
    print_json(&app.store.runs().await?)
}

pub async fn report(app: &App, run_id: &str, output: Option<PathBuf>) -> Result<()> {
    let report = ReportGenerator::new()
        .generate_for_run(app.store.as_ref(), run_id)
        .await?;
    match output {
        Some(path) => {
            let bytes = serde_json::to_vec_pretty(&report)?;
            tokio::fs::write(&path, bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Report written to {}", path.display());
            Ok(())
        }
        None => print_json(&report),
    }
}
