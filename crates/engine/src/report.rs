use crate::error::ReportError;
use crate::orchestrator::compliance_score;
use crate::store::AuditStore;
use audit_protocol::{AuditRun, Chunk, ChunkOutcome, Document, Flag, RunStatus, Verdict};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

/// A RED or YELLOW finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub chunk_id: String,
    pub title: String,
    pub description: String,
    pub severity_score: u8,
    pub gaps: Vec<String>,
    pub regulation_references: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSummary {
    pub red: usize,
    pub yellow: usize,
    pub green: usize,
    pub errors: usize,
    pub unanalyzed: usize,
}

impl FlagSummary {
    /// Chunks with a verdict
    #[must_use]
    pub const fn assessed(&self) -> usize {
        self.red + self.yellow + self.green
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisErrorEntry {
    pub chunk_id: String,
    pub title: String,
    pub message: String,
    pub rounds_attempted: u32,
}

/// Document-level audit report; deterministic for a given run and outcome set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalReport {
    pub run_id: String,
    pub document_id: String,
    pub document_title: String,
    pub run_status: RunStatus,
    /// `None` when no chunk produced a verdict
    pub compliance_score: Option<u32>,
    pub executive_summary: String,
    pub critical_issues: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub recommendations: Vec<String>,
    pub overall_assessment: String,
    pub flag_summary: FlagSummary,
    pub analysis_errors: Vec<AnalysisErrorEntry>,
    /// Chunks without any outcome (cancelled or aborted runs)
    pub unanalyzed_chunks: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportGenerator;

impl ReportGenerator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Load a finished run and its outcomes from `store` and build the report
    pub async fn generate_for_run(
        &self,
        store: &dyn AuditStore,
        run_id: &str,
    ) -> Result<FinalReport, ReportError> {
        let run = store.get_run(run_id).await?;
        ensure_finished(&run)?;
        let document = store.get_document(&run.document_id).await?;
        let outcomes = store.outcomes(run_id).await?;
        self.generate(&run, &document, &outcomes)
    }

    pub fn generate(
        &self,
        run: &AuditRun,
        document: &Document,
        outcomes: &[ChunkOutcome],
    ) -> Result<FinalReport, ReportError> {
        ensure_finished(run)?;

        let chunks: HashMap<&str, &Chunk> =
            document.chunks.iter().map(|c| (c.id.as_str(), c)).collect();
        let mut ordered: Vec<&ChunkOutcome> = outcomes.iter().collect();
        ordered.sort_by_key(|outcome| {
            (
                chunks.get(outcome.chunk_id()).map_or(usize::MAX, |c| c.sequence),
                outcome.chunk_id().to_string(),
            )
        });

        let mut summary = FlagSummary::default();
        let mut critical_issues = Vec::new();
        let mut warnings = Vec::new();
        let mut analysis_errors = Vec::new();

        for outcome in ordered {
            let chunk = chunks.get(outcome.chunk_id()).copied();
            match outcome {
                ChunkOutcome::Analyzed(record) => {
                    let verdict = &record.final_verdict;
                    match verdict.flag {
                        Flag::Red => {
                            summary.red += 1;
                            critical_issues.push(issue(&record.chunk_id, chunk, verdict));
                        }
                        Flag::Yellow => {
                            summary.yellow += 1;
                            warnings.push(issue(&record.chunk_id, chunk, verdict));
                        }
                        Flag::Green => summary.green += 1,
                    }
                }
                ChunkOutcome::Error {
                    chunk_id,
                    message,
                    rounds_attempted,
                    ..
                } => {
                    summary.errors += 1;
                    analysis_errors.push(AnalysisErrorEntry {
                        chunk_id: chunk_id.clone(),
                        title: chunk_title(chunk_id, chunk, None),
                        message: message.clone(),
                        rounds_attempted: *rounds_attempted,
                    });
                }
            }
        }

        let seen: HashSet<&str> = outcomes.iter().map(ChunkOutcome::chunk_id).collect();
        let mut manual_chunks: Vec<&Chunk> = document.chunks.iter().collect();
        manual_chunks.sort_by_key(|c| c.sequence);
        let unanalyzed_chunks: Vec<String> = manual_chunks
            .into_iter()
            .filter(|c| !seen.contains(c.id.as_str()))
            .map(|c| c.id.clone())
            .collect();
        summary.unanalyzed = unanalyzed_chunks.len();

        let score = (summary.assessed() > 0).then(|| compliance_score(outcomes));
        let recommendations = consolidate_recommendations(&critical_issues, &warnings);

        Ok(FinalReport {
            run_id: run.id.clone(),
            document_id: document.id.clone(),
            document_title: document.title.clone(),
            run_status: run.status,
            compliance_score: score,
            executive_summary: executive_summary(document, run.status, &summary, score),
            overall_assessment: overall_assessment(score, &critical_issues, &summary),
            critical_issues,
            warnings,
            recommendations,
            flag_summary: summary,
            analysis_errors,
            unanalyzed_chunks,
        })
    }
}

fn ensure_finished(run: &AuditRun) -> Result<(), ReportError> {
    if run.status.is_finished() {
        Ok(())
    } else {
        Err(ReportError::RunNotFinished {
            run_id: run.id.clone(),
            status: run.status.as_str(),
        })
    }
}

/// Citation's manual section, else heading path, else chunk id
fn chunk_title(chunk_id: &str, chunk: Option<&Chunk>, verdict: Option<&Verdict>) -> String {
    if let Some(section) = verdict.and_then(|v| v.citations.manual_section.as_deref()) {
        return section.to_string();
    }
    match chunk {
        Some(chunk) if !chunk.heading_path.is_empty() => chunk.heading_display(),
        _ => chunk_id.to_string(),
    }
}

fn issue(chunk_id: &str, chunk: Option<&Chunk>, verdict: &Verdict) -> Issue {
    Issue {
        chunk_id: chunk_id.to_string(),
        title: chunk_title(chunk_id, chunk, Some(verdict)),
        description: verdict.findings.clone(),
        severity_score: verdict.severity_score,
        gaps: verdict.gaps.clone(),
        regulation_references: verdict.regulation_references.clone(),
        recommendations: verdict.recommendations.clone(),
    }
}

/// Critical recommendations first, deduplicated ignoring case and whitespace
fn consolidate_recommendations(critical: &[Issue], warnings: &[Issue]) -> Vec<String> {
    let mut seen = HashSet::new();
    critical
        .iter()
        .chain(warnings)
        .flat_map(|issue| issue.recommendations.iter())
        .filter_map(|rec| {
            let key = rec.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
            (!key.is_empty() && seen.insert(key)).then(|| rec.trim().to_string())
        })
        .collect()
}

fn executive_summary(
    document: &Document,
    status: RunStatus,
    summary: &FlagSummary,
    score: Option<u32>,
) -> String {
    let mut text = match score {
        Some(score) => format!(
            "Audit of \"{}\" reviewed {} of {} sections: {} critical issues (RED), \
             {} warnings (YELLOW) and {} compliant sections (GREEN). \
             Compliance score: {score}/100.",
            document.title,
            summary.assessed(),
            document.chunks.len(),
            summary.red,
            summary.yellow,
            summary.green,
        ),
        None => format!(
            "Audit of \"{}\" could not assess any of its {} sections; \
             no compliance score was computed.",
            document.title,
            document.chunks.len(),
        ),
    };
    if summary.errors > 0 {
        let _ = write!(text, " {} sections could not be analysed.", summary.errors);
    }
    if summary.unanalyzed > 0 {
        let _ = write!(text, " {} sections were not reached", summary.unanalyzed);
        text.push_str(if status == RunStatus::Cancelled {
            " because the audit was cancelled."
        } else {
            "."
        });
    }
    text
}

fn overall_assessment(score: Option<u32>, critical: &[Issue], summary: &FlagSummary) -> String {
    let Some(score) = score else {
        return "No section of the manual could be assessed, so no compliance conclusion \
                can be drawn. See the analysis errors and re-run the audit."
            .to_string();
    };
    let mut text = match score {
        90..=u32::MAX => "The manual is substantially compliant with the applicable requirements.",
        70..=89 => {
            "The manual is generally compliant, with improvements required in several areas."
        }
        50..=69 => "The manual shows significant deficiencies that must be corrected.",
        _ => "The manual shows major non-compliance and requires substantial revision.",
    }
    .to_string();

    match critical.len() {
        0 => {}
        1 => {
            let _ = write!(
                text,
                " One critical issue needs immediate attention: {}.",
                critical[0].title
            );
        }
        n => {
            let _ = write!(text, " {n} critical issues need immediate attention.");
        }
    }
    if summary.errors + summary.unanalyzed > 0 {
        text.push_str(
            " The assessment is partial; see the analysis errors and unanalysed sections.",
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_protocol::{chunk_id, AnalysisRecord, Citations, Corpus};
    use pretty_assertions::assert_eq;

    fn document(n: usize) -> Document {
        Document {
            id: "moe".to_string(),
            corpus: Corpus::Manual,
            title: "Maintenance Organisation Exposition".to_string(),
            chunks: (0..n)
                .map(|seq| Chunk {
                    id: chunk_id("moe", seq),
                    document_id: "moe".to_string(),
                    corpus: Corpus::Manual,
                    sequence: seq,
                    heading_path: if seq == 0 { vec![] } else { vec![format!("{seq} Section")] },
                    label: None,
                    text: "text".to_string(),
                    start: 0,
                    end: 4,
                    embedding: None,
                })
                .collect(),
        }
    }

    fn analyzed(seq: usize, flag: Flag, rec: &str, manual_section: Option<&str>) -> ChunkOutcome {
        ChunkOutcome::Analyzed(AnalysisRecord {
            chunk_id: chunk_id("moe", seq),
            final_verdict: Verdict {
                flag,
                severity_score: match flag {
                    Flag::Red => 8,
                    Flag::Yellow => 4,
                    Flag::Green => 0,
                },
                regulation_references: vec!["145.A.30".to_string()],
                findings: format!("finding {seq}"),
                gaps: vec![],
                citations: Citations {
                    manual_section: manual_section.map(str::to_string),
                    regulation_sections: vec![],
                },
                recommendations: if rec.is_empty() { vec![] } else { vec![rec.to_string()] },
                needs_additional_context: false,
                context_query: None,
            },
            rounds: vec![],
            requests_issued: 1,
            queries: vec![],
            context_truncated: false,
        })
    }

    fn run(status: RunStatus) -> AuditRun {
        let mut run = AuditRun::new("r1", "moe");
        run.status = status;
        run
    }

    #[test]
    fn groups_orders_and_deduplicates() {
        let outcomes = vec![
            analyzed(3, Flag::Yellow, "Define tool  calibration", None),
            analyzed(2, Flag::Red, "Appoint a quality manager", Some("1.4 Quality")),
            analyzed(1, Flag::Red, "define tool calibration", None),
            analyzed(0, Flag::Green, "", None),
            ChunkOutcome::Error {
                chunk_id: chunk_id("moe", 4),
                message: "timeout".to_string(),
                rounds_attempted: 1,
                requests_issued: 3,
            },
        ];
        let report = ReportGenerator::new()
            .generate(&run(RunStatus::Completed), &document(5), &outcomes)
            .unwrap();

        let critical: Vec<&str> = report.critical_issues.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(critical, vec!["1 Section", "1.4 Quality"]);
        assert_eq!(report.warnings[0].chunk_id, "moe#3");
        assert_eq!(
            report.recommendations,
            vec!["define tool calibration", "Appoint a quality manager"]
        );
        assert_eq!(report.compliance_score, Some(100 - 20 - 3));
        assert_eq!(
            report.flag_summary,
            FlagSummary {
                red: 2,
                yellow: 1,
                green: 1,
                errors: 1,
                unanalyzed: 0
            }
        );
        assert_eq!(report.analysis_errors[0].title, "4 Section");
        assert!(report
            .overall_assessment
            .starts_with("The manual is generally compliant"));
        assert!(report.executive_summary.contains("1 sections could not be analysed"));
    }

    #[test]
    fn partial_run_lists_unanalyzed_chunks() {
        let outcomes = vec![analyzed(0, Flag::Green, "", None)];
        let report = ReportGenerator::new()
            .generate(&run(RunStatus::Cancelled), &document(3), &outcomes)
            .unwrap();
        assert_eq!(report.unanalyzed_chunks, vec!["moe#1", "moe#2"]);
        assert!(report.executive_summary.ends_with("because the audit was cancelled."));
        assert!(report.overall_assessment.contains("partial"));
    }

    #[test]
    fn no_verdicts_means_no_score() {
        let outcomes: Vec<ChunkOutcome> = (0..2)
            .map(|seq| ChunkOutcome::Error {
                chunk_id: chunk_id("moe", seq),
                message: "rate limited".to_string(),
                rounds_attempted: 1,
                requests_issued: 3,
            })
            .collect();
        let report = ReportGenerator::new()
            .generate(&run(RunStatus::Failed), &document(2), &outcomes)
            .unwrap();

        assert_eq!(report.compliance_score, None);
        assert_eq!(report.flag_summary.errors, 2);
        assert!(report.executive_summary.contains("could not assess any of its 2 sections"));
        assert!(!report.executive_summary.contains("/100"));
        assert!(report
            .overall_assessment
            .starts_with("No section of the manual could be assessed"));
        assert!(!report.overall_assessment.contains("compliant with"));
    }

    #[test]
    fn unfinished_run_is_rejected() {
        for status in [RunStatus::Pending, RunStatus::Running] {
            assert!(matches!(
                ReportGenerator::new().generate(&run(status), &document(1), &[]),
                Err(ReportError::RunNotFinished { .. })
            ));
        }
    }

    #[test]
    fn is_deterministic() {
        let outcomes = vec![
            analyzed(1, Flag::Yellow, "a", None),
            analyzed(0, Flag::Red, "b", None),
        ];
        let a = ReportGenerator::new()
            .generate(&run(RunStatus::Completed), &document(2), &outcomes)
            .unwrap();
        let mut reversed = outcomes.clone();
        reversed.reverse();
        let b = ReportGenerator::new()
            .generate(&run(RunStatus::Completed), &document(2), &reversed)
            .unwrap();
        assert_eq!(a, b);
    }
}
