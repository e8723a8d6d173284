use audit_protocol::Corpus;
use serde::{Deserialize, Serialize};

/// Size bounds for one context bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextLimits {
    pub k_manual: usize,
    pub k_regulation: usize,
    pub k_guidance: usize,
    pub k_evidence: usize,

    /// Hits per corpus for each follow-up query
    pub k_query_per_corpus: usize,

    /// Hard cap for any corpus slice once query hits are merged
    pub max_slice_entries: usize,

    pub max_references: usize,

    /// Rendered entries are cut to this many characters (0 = no limit)
    pub max_entry_chars: usize,

    /// Cached query embeddings
    pub query_cache_size: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            k_manual: 4,
            k_regulation: 4,
            k_guidance: 3,
            k_evidence: 2,
            k_query_per_corpus: 2,
            max_slice_entries: 8,
            max_references: 8,
            max_entry_chars: 1600,
            query_cache_size: 128,
        }
    }
}

impl ContextLimits {
    #[must_use]
    pub const fn k_for(&self, corpus: Corpus) -> usize {
        match corpus {
            Corpus::Manual => self.k_manual,
            Corpus::Regulation => self.k_regulation,
            Corpus::Guidance => self.k_guidance,
            Corpus::Evidence => self.k_evidence,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for corpus in Corpus::ALL {
            if self.k_for(corpus) > self.max_slice_entries {
                return Err(format!(
                    "k for {corpus} ({}) cannot exceed max_slice_entries ({})",
                    self.k_for(corpus),
                    self.max_slice_entries
                ));
            }
        }
        if self.query_cache_size == 0 {
            return Err("query_cache_size must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_are_valid() {
        assert!(ContextLimits::default().validate().is_ok());
    }

    #[test]
    fn seed_size_cannot_exceed_slice_cap() {
        let limits = ContextLimits {
            k_regulation: 12,
            ..Default::default()
        };
        assert!(limits.validate().is_err());

        let limits = ContextLimits {
            query_cache_size: 0,
            ..Default::default()
        };
        assert!(limits.validate().is_err());
    }
}
