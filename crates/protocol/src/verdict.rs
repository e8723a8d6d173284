use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Lowest severity; every GREEN verdict scores here
pub const SEVERITY_FLOOR: u8 = 0;

/// RED verdicts score at or above this value
pub const HIGH_SEVERITY_THRESHOLD: u8 = 7;

pub const SEVERITY_MAX: u8 = 10;

/// Severity classification of a verdict
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Flag {
    Red,
    Yellow,
    Green,
}

impl Flag {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Red => "RED",
            Self::Yellow => "YELLOW",
            Self::Green => "GREEN",
        }
    }

    /// Accepts exactly `RED`, `YELLOW` or `GREEN`
    #[must_use]
    pub fn parse_exact(raw: &str) -> Option<Self> {
        match raw {
            "RED" => Some(Self::Red),
            "YELLOW" => Some(Self::Yellow),
            "GREEN" => Some(Self::Green),
            _ => None,
        }
    }

    /// Severity scores permitted for this flag
    #[must_use]
    pub const fn severity_band(self) -> RangeInclusive<u8> {
        match self {
            Self::Green => SEVERITY_FLOOR..=SEVERITY_FLOOR,
            Self::Yellow => (SEVERITY_FLOOR + 1)..=(HIGH_SEVERITY_THRESHOLD - 1),
            Self::Red => HIGH_SEVERITY_THRESHOLD..=SEVERITY_MAX,
        }
    }

    #[must_use]
    pub const fn requires_recommendation(self) -> bool {
        matches!(self, Self::Red | Self::Yellow)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Citations {
    /// Section of the manual the finding is about
    pub manual_section: Option<String>,
    /// Regulation sections the finding is measured against
    pub regulation_sections: Vec<String>,
}

/// Structured compliance judgment for one chunk in one analysis round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Verdict {
    pub flag: Flag,
    pub severity_score: u8,
    pub regulation_references: Vec<String>,
    pub findings: String,
    pub gaps: Vec<String>,
    pub citations: Citations,
    pub recommendations: Vec<String>,
    pub needs_additional_context: bool,
    pub context_query: Option<String>,
}

impl Verdict {
    /// Follow-up query, if the verdict asks for one and it is non-empty
    #[must_use]
    pub fn follow_up_query(&self) -> Option<&str> {
        if !self.needs_additional_context {
            return None;
        }
        self.context_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    /// Bring severity and recommendations in line with the flag.
    ///
    /// Severity is clamped into the flag's band. RED and YELLOW verdicts without a
    /// usable recommendation get one derived from the first gap, else from the findings.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let band = self.flag.severity_band();
        self.severity_score = self.severity_score.clamp(*band.start(), *band.end());
        self.findings = self.findings.trim().to_string();
        self.gaps = clean_list(self.gaps);
        self.recommendations = clean_list(self.recommendations);
        self.regulation_references = clean_list(self.regulation_references);
        self.citations.regulation_sections = clean_list(self.citations.regulation_sections);
        self.citations.manual_section = self
            .citations
            .manual_section
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self.context_query = self
            .context_query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        if self.flag.requires_recommendation() && self.recommendations.is_empty() {
            let derived = match self.gaps.first() {
                Some(gap) => format!("Address the identified gap: {gap}"),
                None => format!("Review and remediate: {}", first_sentence(&self.findings)),
            };
            self.recommendations.push(derived);
        }
        self
    }

    /// Severity matches the flag band and RED/YELLOW carry a recommendation
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.flag.severity_band().contains(&self.severity_score)
            && !self.findings.trim().is_empty()
            && (!self.flag.requires_recommendation()
                || self.recommendations.iter().any(|r| !r.trim().is_empty()))
    }
}

/// JSON schema of [`Verdict`], embedded in classifier instructions
#[must_use]
pub fn verdict_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(Verdict)).unwrap_or(serde_json::Value::Null)
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn first_sentence(text: &str) -> String {
    const MAX_CHARS: usize = 200;
    let sentence = text
        .split_terminator(['.', '\n'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("finding");
    sentence.chars().take(MAX_CHARS).collect()
}
