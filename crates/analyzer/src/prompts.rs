use audit_context::ContextBundle;
use audit_protocol::verdict_schema;
use std::fmt::Write as _;

const INSTRUCTIONS: &str = "\
You are an aviation maintenance compliance auditor. You review one section of an \
organisation's manual at a time against the applicable regulations, AMC/GM guidance \
and evidence supplied as context.

Rules:
1. Search before you flag. If a requirement seems unaddressed, first check whether the \
context answers it. If it might be covered elsewhere in the manual or in material not \
shown, set needs_additional_context to true and put a short search query in \
context_query instead of flagging.
2. Flag RED only for a clear non-compliance with a cited regulation (severity_score 7-10).
3. Flag YELLOW for partial coverage, ambiguity or weak evidence (severity_score 1-6).
4. Flag GREEN when the section is compliant or the topic is outside regulatory scope \
(severity_score 0).
5. Every RED or YELLOW verdict lists at least one concrete recommendation.
6. Cite manual and regulation sections exactly as they appear in the text.

Reply with a single JSON object and nothing else. It must contain exactly these fields: \
flag, severity_score, regulation_references, findings, gaps, citations, recommendations, \
needs_additional_context, context_query.";

/// Instructions plus the verdict JSON schema
#[must_use]
pub fn system_prompt() -> String {
    let schema = serde_json::to_string_pretty(&verdict_schema()).unwrap_or_default();
    format!("{INSTRUCTIONS}\n\nJSON schema:\n{schema}")
}

/// Focus section, context sizes, grouped context text and the round's standing queries
#[must_use]
pub fn user_prompt(bundle: &ContextBundle, round: u32, max_entry_chars: usize) -> String {
    let focus = &bundle.focus;
    let counts = bundle.counts();
    let mut out = String::new();

    let _ = writeln!(out, "## Section under review");
    let _ = writeln!(out, "Chunk: {}", focus.id);
    if !focus.heading_path.is_empty() {
        let _ = writeln!(out, "Heading: {}", focus.heading_display());
    }
    if let Some(label) = &focus.label {
        let _ = writeln!(out, "Section number: {label}");
    }
    let _ = writeln!(out, "\n{}\n", focus.text.trim());

    let _ = writeln!(out, "## Context (round {round})");
    let _ = writeln!(
        out,
        "References: {}, manual: {}, regulations: {}, guidance: {}, evidence: {}",
        counts.references, counts.manual, counts.regulation, counts.guidance, counts.evidence
    );
    if !bundle.queries.is_empty() {
        let _ = writeln!(out, "Searches already run: {}", bundle.queries.join("; "));
    }
    if bundle.references_truncated {
        let _ = writeln!(
            out,
            "Reference expansion was cut short; not every cited section is shown."
        );
    }

    let context = bundle.render_text(max_entry_chars);
    if context.is_empty() {
        let _ = writeln!(out, "\nNo related material was found.");
    } else {
        let _ = write!(out, "\n{context}");
    }
    out
}
