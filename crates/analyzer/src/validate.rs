use crate::error::ProtocolViolation;
use audit_protocol::{Citations, Flag, Verdict, SEVERITY_MAX};
use serde_json::{Map, Value};

const VERDICT_FIELDS: [&str; 9] = [
    "flag",
    "severity_score",
    "regulation_references",
    "findings",
    "gaps",
    "citations",
    "recommendations",
    "needs_additional_context",
    "context_query",
];

const CITATION_FIELDS: [&str; 2] = ["manual_section", "regulation_sections"];

/// Validate a raw classifier response and normalize it into a [`Verdict`].
///
/// The object must carry exactly the verdict fields. `context_query` and
/// `citations.manual_section` may be `null`; everything else is required with
/// its declared type. A fractional severity is rounded, out-of-range severity is
/// clamped into the flag's band by normalization.
pub fn parse_verdict(value: &Value) -> Result<Verdict, ProtocolViolation> {
    let object = value.as_object().ok_or(ProtocolViolation::NotAnObject)?;
    check_fields(object, &VERDICT_FIELDS)?;

    let raw_flag = field(object, "flag")?;
    let flag = raw_flag
        .as_str()
        .and_then(Flag::parse_exact)
        .ok_or_else(|| ProtocolViolation::InvalidFlag(raw_flag.to_string()))?;

    let severity = field(object, "severity_score")?
        .as_f64()
        .ok_or(ProtocolViolation::WrongType {
            field: "severity_score",
            expected: "a number",
        })?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let severity_score = severity.round().clamp(0.0, f64::from(SEVERITY_MAX)) as u8;

    let findings = field(object, "findings")?
        .as_str()
        .ok_or(ProtocolViolation::WrongType {
            field: "findings",
            expected: "a string",
        })?;
    if findings.trim().is_empty() {
        return Err(ProtocolViolation::EmptyFindings);
    }

    let needs_additional_context = field(object, "needs_additional_context")?
        .as_bool()
        .ok_or(ProtocolViolation::WrongType {
            field: "needs_additional_context",
            expected: "a boolean",
        })?;

    let verdict = Verdict {
        flag,
        severity_score,
        regulation_references: string_list(object, "regulation_references")?,
        findings: findings.to_string(),
        gaps: string_list(object, "gaps")?,
        citations: citations(field(object, "citations")?)?,
        recommendations: string_list(object, "recommendations")?,
        needs_additional_context,
        context_query: optional_string(field(object, "context_query")?, "context_query")?,
    };
    Ok(verdict.normalized())
}

fn check_fields(
    object: &Map<String, Value>,
    allowed: &[&'static str],
) -> Result<(), ProtocolViolation> {
    if let Some(unknown) = object.keys().find(|key| !allowed.contains(&key.as_str())) {
        return Err(ProtocolViolation::UnknownField(unknown.clone()));
    }
    if let Some(missing) = allowed.iter().find(|name| !object.contains_key(**name)) {
        return Err(ProtocolViolation::MissingField(*missing));
    }
    Ok(())
}

fn field<'a>(
    object: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a Value, ProtocolViolation> {
    object.get(name).ok_or(ProtocolViolation::MissingField(name))
}

fn string_list(
    object: &Map<String, Value>,
    name: &'static str,
) -> Result<Vec<String>, ProtocolViolation> {
    strings(field(object, name)?, name)
}

fn strings(value: &Value, name: &'static str) -> Result<Vec<String>, ProtocolViolation> {
    let wrong_type = ProtocolViolation::WrongType {
        field: name,
        expected: "an array of strings",
    };
    let items = value.as_array().ok_or_else(|| wrong_type.clone())?;
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(|| wrong_type.clone()))
        .collect()
}

fn optional_string(value: &Value, name: &'static str) -> Result<Option<String>, ProtocolViolation> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(ProtocolViolation::WrongType {
            field: name,
            expected: "a string or null",
        }),
    }
}

fn citations(value: &Value) -> Result<Citations, ProtocolViolation> {
    let object = value
        .as_object()
        .ok_or_else(|| ProtocolViolation::MalformedCitations("expected an object".to_string()))?;
    check_fields(object, &CITATION_FIELDS)
        .map_err(|violation| ProtocolViolation::MalformedCitations(violation.to_string()))?;

    let manual_section = optional_string(field(object, "manual_section")?, "manual_section")
        .map_err(|violation| ProtocolViolation::MalformedCitations(violation.to_string()))?;
    let regulation_sections = strings(field(object, "regulation_sections")?, "regulation_sections")
        .map_err(|violation| ProtocolViolation::MalformedCitations(violation.to_string()))?;

    Ok(Citations {
        manual_section,
        regulation_sections,
    })
}
