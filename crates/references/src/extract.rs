use audit_index::normalize_label;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::ops::Range;

// `145.A.30`, `145.A.30(b)(2)`, `Part-145.A.30`, `AMC1 145.A.30`, `GM 145.A.30`
static REGULATION_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:(?:AMC|GM)\d*\s+)?(?:(?i:part)[\s\-]?)?\d{1,4}\.[A-Z]\.\d{1,4}(?:\s?\([a-z0-9]{1,4}\))*",
    )
    .expect("valid regex")
});

// `Section 4.2`, `§ 4.2`, `para 3(a)`, `OSA 5`, `kohdassa 3.4`, `chapter 3`
static KEYWORD_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:§|\b(?:subsection|section|sect|sec|paragraph|para|kohdassa|kohdan|kohta|chapter|luku|osassa|osan|osa|subpart|part|article|art)\b\.?)\s*(\d{1,3}(?:\.\d{1,3})*(?:\s?\([a-z0-9]{1,3}\))*)",
    )
    .expect("valid regex")
});

/// Extract normalized reference labels from chunk text.
///
/// Deduplicated, in order of first appearance. Regulation ids win over a
/// keyword match on the same span (`Part-145.A.30` is one label, not `145`).
#[must_use]
pub fn extract_labels(text: &str) -> Vec<String> {
    let mut found: Vec<(Range<usize>, String)> = Vec::new();

    for m in REGULATION_ID.find_iter(text) {
        if let Some(label) = normalize_label(m.as_str()) {
            found.push((m.range(), label));
        }
    }

    for caps in KEYWORD_SECTION.captures_iter(text) {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let range = whole.range();
        if found.iter().any(|(taken, _)| overlaps(taken, &range)) {
            continue;
        }
        if let Some(label) = normalize_label(number.as_str()) {
            found.push((range, label));
        }
    }

    found.sort_by_key(|(range, _)| range.start);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter_map(|(_, label)| seen.insert(label.clone()).then_some(label))
        .collect()
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_known_shapes() {
        let text = "See Section 4.2 and § 5.1, para 3(a), Part-145.A.30, 145.A.35(b), \
                    AMC1 145.A.30 and GM 145.A.50. Katso OSA 5 ja kohdassa 3.4 sekä chapter 7.";
        assert_eq!(
            extract_labels(text),
            vec![
                "4.2",
                "5.1",
                "3.a",
                "145.a.30",
                "145.a.35.b",
                "amc1.145.a.30",
                "gm.145.a.50",
                "5",
                "3.4",
                "7",
            ]
        );
    }

    #[test]
    fn deduplicates_in_first_seen_order() {
        let text = "Section 4.2 refers to section 4.2 and to kohta 4.2; also Section 2.";
        assert_eq!(extract_labels(text), vec!["4.2", "2"]);
    }

    #[test]
    fn ignores_plain_numbers_and_words() {
        assert!(extract_labels("The 3 inspectors worked 4.2 hours in the partition.").is_empty());
        assert!(extract_labels("").is_empty());
    }
}
