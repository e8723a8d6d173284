/// Words that introduce a section number and carry no identity of their own.
/// Longer forms first so `paragraph` wins over `para`.
const LABEL_PREFIXES: &[&str] = &[
    "subsection",
    "section",
    "sect",
    "sec",
    "kohdassa",
    "kohdan",
    "kohta",
    "osassa",
    "osan",
    "osa",
    "subpart",
    "part",
    "chapter",
    "luku",
    "paragraph",
    "para",
    "article",
    "art",
    "§",
];

/// Normalize a section label for matching.
///
/// Lowercases, drops introducing words (`Section`, `Part`, `OSA`, `kohdassa`, `§`, ...),
/// and unifies whitespace, `-`, `_`, `/`, `:` and parentheses into `.` separators:
/// `Part-145.A.30(b)` → `145.a.30.b`, `kohdassa 3.4` → `3.4`.
#[must_use]
pub fn normalize_label(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    let mut rest = lowered.as_str();

    loop {
        let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || is_separator(c));
        let stripped = LABEL_PREFIXES.iter().find_map(|prefix| {
            let after = trimmed.strip_prefix(prefix)?;
            let boundary = after.chars().next().map_or(true, |c| !c.is_alphabetic());
            boundary.then_some(after)
        });
        match stripped {
            Some(after) => rest = after,
            None => {
                rest = trimmed;
                break;
            }
        }
    }

    let mut out = String::with_capacity(rest.len());
    let mut pending_sep = false;
    for ch in rest.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('.');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }

    (!out.is_empty()).then_some(out)
}

/// Drop a trailing alphabetic sub-paragraph component: `145.a.30.b` → `145.a.30`.
///
/// Numeric components are kept, so `4.2.1` is returned unchanged as `None`.
#[must_use]
pub fn strip_subparagraph(label: &str) -> Option<String> {
    let (head, last) = label.rsplit_once('.')?;
    if head.is_empty() || !last.chars().all(char::is_alphabetic) {
        return None;
    }
    Some(head.to_string())
}

fn is_separator(c: char) -> bool {
    matches!(c, '.' | '-' | '_' | '/' | ':' | '(' | ')' | ',' | ';')
}
