use serde::{Deserialize, Serialize};

/// Configuration for document chunking behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Maximum chunk size in characters (hard limit except for atomic list items/table rows)
    pub max_chunk_chars: usize,

    /// Lines longer than this are never treated as headings
    pub max_heading_chars: usize,

    /// Recognise `4.2 Title` style numbered headings
    pub numbered_headings: bool,

    /// Drop heading-only sections whose content lives entirely in sub-sections
    pub skip_empty_parents: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 2400,
            max_heading_chars: 120,
            numbered_headings: true,
            skip_empty_parents: true,
        }
    }
}

impl ChunkerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_chars == 0 {
            return Err("max_chunk_chars must be > 0".to_string());
        }

        if self.max_heading_chars == 0 {
            return Err("max_heading_chars must be > 0".to_string());
        }

        if self.max_heading_chars > self.max_chunk_chars {
            return Err(format!(
                "max_heading_chars ({}) cannot exceed max_chunk_chars ({})",
                self.max_heading_chars, self.max_chunk_chars
            ));
        }

        Ok(())
    }
}
