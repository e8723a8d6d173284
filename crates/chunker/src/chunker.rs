use crate::config::ChunkerConfig;
use crate::error::{ChunkerError, Result};
use crate::lines::{classify_lines, Heading, LineKind};
use crate::strategy::{pack_blocks, Block};
use audit_protocol::{chunk_id, Chunk, Corpus, Document};

/// Main chunker interface for splitting documents into sections
pub struct Chunker {
    config: ChunkerConfig,
}

/// A structural section: everything between one heading and the next
#[derive(Debug)]
struct Section {
    depth: usize,
    heading_path: Vec<String>,
    label: Option<String>,
    blocks: Vec<Block>,
    has_heading: bool,
}

impl Section {
    const fn root() -> Self {
        Self {
            depth: 0,
            heading_path: Vec::new(),
            label: None,
            blocks: Vec::new(),
            has_heading: false,
        }
    }

    /// Only the heading line, no body
    fn is_heading_only(&self) -> bool {
        self.has_heading && self.blocks.len() == 1
    }
}

impl Chunker {
    /// Create a new chunker, validating the configuration
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate().map_err(ChunkerError::invalid_config)?;
        Ok(Self { config })
    }

    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split document text into ordered chunks.
    ///
    /// Identical input always yields identical ids, heading paths and spans.
    pub fn chunk_document(
        &self,
        document_id: &str,
        corpus: Corpus,
        text: &str,
    ) -> Result<Vec<Chunk>> {
        let sections = self.assemble_sections(text);
        let mut chunks = Vec::new();

        for section in &sections {
            for (start, end) in pack_blocks(text, &section.blocks, self.config.max_chunk_chars) {
                let sequence = chunks.len();
                chunks.push(Chunk {
                    id: chunk_id(document_id, sequence),
                    document_id: document_id.to_string(),
                    corpus,
                    sequence,
                    heading_path: section.heading_path.clone(),
                    label: section.label.clone(),
                    text: text[start..end].to_string(),
                    start,
                    end,
                    embedding: None,
                });
            }
        }

        if chunks.is_empty() {
            return Err(ChunkerError::EmptyDocument(document_id.to_string()));
        }

        log::debug!(
            "Chunked '{document_id}' ({corpus}) into {} chunks from {} sections",
            chunks.len(),
            sections.len()
        );
        Ok(chunks)
    }

    /// Chunk raw uploaded bytes; the intake layer guarantees a text format
    pub fn chunk_bytes(
        &self,
        document_id: &str,
        corpus: Corpus,
        bytes: &[u8],
    ) -> Result<Vec<Chunk>> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ChunkerError::InvalidEncoding(document_id.to_string()))?;
        self.chunk_document(document_id, corpus, text)
    }

    /// Chunk and wrap into an immutable [`Document`]
    pub fn chunk_into_document(
        &self,
        document_id: &str,
        corpus: Corpus,
        title: &str,
        text: &str,
    ) -> Result<Document> {
        let chunks = self.chunk_document(document_id, corpus, text)?;
        Ok(Document {
            id: document_id.to_string(),
            corpus,
            title: title.to_string(),
            chunks,
        })
    }

    fn assemble_sections(&self, text: &str) -> Vec<Section> {
        let mut sections = vec![Section::root()];
        let mut stack: Vec<Heading> = Vec::new();
        let mut open: Option<Block> = None;

        for line in classify_lines(text, &self.config) {
            let current = sections.len() - 1;
            match line.kind {
                LineKind::Blank => {
                    if let Some(block) = open.take() {
                        sections[current].blocks.push(block);
                    }
                }
                LineKind::Heading(heading) => {
                    if let Some(block) = open.take() {
                        sections[current].blocks.push(block);
                    }
                    while stack.last().is_some_and(|top| top.depth >= heading.depth) {
                        stack.pop();
                    }
                    let depth = heading.depth;
                    stack.push(heading);
                    sections.push(Section {
                        depth,
                        heading_path: stack.iter().map(|h| h.title.clone()).collect(),
                        label: stack.iter().rev().find_map(|h| h.label.clone()),
                        blocks: vec![Block {
                            start: line.start,
                            end: line.end,
                            atomic: true,
                        }],
                        has_heading: true,
                    });
                }
                LineKind::TableRow => {
                    if let Some(block) = open.take() {
                        sections[current].blocks.push(block);
                    }
                    sections[current].blocks.push(Block {
                        start: line.start,
                        end: line.end,
                        atomic: true,
                    });
                }
                LineKind::ListItem => {
                    if let Some(block) = open.take() {
                        sections[current].blocks.push(block);
                    }
                    open = Some(Block {
                        start: line.start,
                        end: line.end,
                        atomic: true,
                    });
                }
                LineKind::Text => match open.as_mut() {
                    // Continuation of a paragraph or a wrapped list item
                    Some(block) => block.end = line.end,
                    None => {
                        open = Some(Block {
                            start: line.start,
                            end: line.end,
                            atomic: false,
                        });
                    }
                },
            }
        }

        if let Some(block) = open.take() {
            if let Some(last) = sections.last_mut() {
                last.blocks.push(block);
            }
        }

        if !self.config.skip_empty_parents {
            return sections;
        }

        let depths: Vec<usize> = sections.iter().map(|s| s.depth).collect();
        sections
            .into_iter()
            .enumerate()
            .filter(|(idx, section)| {
                let has_deeper_child =
                    depths.get(idx + 1).is_some_and(|&next| next > section.depth);
                !(section.is_heading_only() && has_deeper_child)
            })
            .map(|(_, section)| section)
            .collect()
    }
}
