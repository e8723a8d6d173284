use crate::config::ChunkerConfig;
use crate::labels::normalize_label;
use once_cell::sync::Lazy;
use regex::Regex;

static MARKDOWN_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").expect("valid regex"));

// `4.2 Records`, `4.2.1. Retention`
static NUMBERED_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3}(?:\.\d{1,3})+)\.?\s+(\S.*)$").expect("valid regex"));

// `4 QUALITY SYSTEM`, `1. INTRODUCTION`
static TOP_NUMBERED_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3})\.?\s+(\S.*)$").expect("valid regex"));

// `PART 145`, `Chapter 3`, `OSA 5`, `LUKU 2`, `Subpart A`
static PART_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i:part|subpart|chapter|osa|luku)[\s\-]+(\d{1,4}[A-Za-z]?|[A-Z]|[IVXLC]{1,6})\b")
        .expect("valid regex")
});

// `145.A.30 Personnel requirements`, `AMC1 145.A.30(b) ...`
static REGULATION_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^((?:AMC\d*|GM\d*)\s+)?(\d{1,4}\.[A-Z]\.\d{1,4}(?:\([a-z0-9]{1,4}\))*)(?:\s+(\S.*))?$",
    )
    .expect("valid regex")
});

static LIST_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*+•–]|\d{1,3}[.)]|[a-zA-Z][.)]|\((?:[a-zA-Z]{1,4}|\d{1,3})\))\s+\S")
        .expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Heading {
    pub depth: usize,
    pub title: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LineKind {
    Blank,
    Heading(Heading),
    ListItem,
    TableRow,
    Text,
}

/// One source line with its byte span (newline excluded)
#[derive(Debug, Clone)]
pub(crate) struct Line {
    pub start: usize,
    pub end: usize,
    pub kind: LineKind,
}

pub(crate) fn classify_lines(source: &str, config: &ChunkerConfig) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for raw in source.split_inclusive('\n') {
        let start = offset;
        offset += raw.len();
        let content = raw.trim_end_matches(['\n', '\r']);
        let end = start + content.len();
        lines.push(Line {
            start,
            end,
            kind: classify(content, config),
        });
    }
    lines
}

fn classify(content: &str, config: &ChunkerConfig) -> LineKind {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if trimmed.starts_with('|') {
        return LineKind::TableRow;
    }
    if let Some(heading) = detect_heading(trimmed, config) {
        return LineKind::Heading(heading);
    }
    if LIST_ITEM.is_match(content) {
        return LineKind::ListItem;
    }
    LineKind::Text
}

fn detect_heading(trimmed: &str, config: &ChunkerConfig) -> Option<Heading> {
    if let Some(caps) = MARKDOWN_HEADING.captures(trimmed) {
        let depth = caps[1].len();
        let title = caps[2].trim().to_string();
        let label = structural_heading(&title, usize::MAX, config)
            .and_then(|h| h.label)
            .or_else(|| {
                TOP_NUMBERED_HEADING
                    .captures(&title)
                    .and_then(|caps| normalize_label(&caps[1]))
            });
        return Some(Heading {
            depth,
            title,
            label,
        });
    }

    if trimmed.chars().count() > config.max_heading_chars {
        return None;
    }
    structural_heading(trimmed, config.max_heading_chars, config)
}

/// Numbered, part/chapter and regulation-id headings
fn structural_heading(line: &str, max_chars: usize, config: &ChunkerConfig) -> Option<Heading> {
    if line.chars().count() > max_chars {
        return None;
    }

    if let Some(caps) = REGULATION_HEADING.captures(line) {
        let title_ok = caps.get(3).map_or(true, |t| is_title(t.as_str()));
        if title_ok {
            let prefix = caps.get(1).map_or("", |m| m.as_str());
            let depth = if prefix.is_empty() { 2 } else { 3 };
            return Some(Heading {
                depth,
                title: line.to_string(),
                label: normalize_label(&format!("{prefix}{}", &caps[2])),
            });
        }
    }

    if let Some(caps) = PART_HEADING
        .captures(line)
        .filter(|_| !line.ends_with(['.', ';', ':', ',']))
    {
        return Some(Heading {
            depth: 1,
            title: line.to_string(),
            label: normalize_label(&caps[0]),
        });
    }

    if !config.numbered_headings {
        return None;
    }

    if let Some(caps) = NUMBERED_HEADING.captures(line) {
        if is_title(&caps[2]) {
            let number = &caps[1];
            return Some(Heading {
                depth: number.split('.').count(),
                title: line.to_string(),
                label: normalize_label(number),
            });
        }
    }

    if let Some(caps) = TOP_NUMBERED_HEADING.captures(line) {
        if is_title(&caps[2]) && is_upper_title(&caps[2]) {
            return Some(Heading {
                depth: 1,
                title: line.to_string(),
                label: normalize_label(&caps[1]),
            });
        }
    }

    None
}

/// Heading titles start with a letter and do not end like a sentence
fn is_title(title: &str) -> bool {
    let title = title.trim();
    let starts_with_letter = title.chars().next().map_or(false, char::is_alphabetic);
    let sentence_end = title.ends_with(['.', ';', ':', ',']);
    starts_with_letter && !sentence_end
}

fn is_upper_title(title: &str) -> bool {
    let letters: Vec<char> = title.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase())
}
