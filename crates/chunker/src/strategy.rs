use unicode_segmentation::UnicodeSegmentation;

/// A contiguous byte span of the source that is packed as a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Block {
    pub start: usize,
    pub end: usize,

    /// Headings, list items and table rows are never split
    pub atomic: bool,
}

#[derive(Debug, Clone, Copy)]
enum Granularity {
    Sentence,
    Word,
    Grapheme,
}

impl Granularity {
    const fn finer(self) -> Option<Self> {
        match self {
            Self::Sentence => Some(Self::Word),
            Self::Word => Some(Self::Grapheme),
            Self::Grapheme => None,
        }
    }

    fn segments(self, slice: &str) -> Vec<(usize, &str)> {
        match self {
            Self::Sentence => slice.split_sentence_bound_indices().collect(),
            Self::Word => slice.split_word_bound_indices().collect(),
            Self::Grapheme => slice.grapheme_indices(true).collect(),
        }
    }
}

/// Pack the blocks of one section into spans of at most `max_chars` characters.
///
/// Oversized non-atomic blocks are first split at sentence bounds (then words,
/// then graphemes). Oversized atomic blocks are emitted whole.
pub(crate) fn pack_blocks(text: &str, blocks: &[Block], max_chars: usize) -> Vec<(usize, usize)> {
    let mut pieces = Vec::with_capacity(blocks.len());
    for block in blocks {
        let Some((start, end)) = trim_span(text, block.start, block.end) else {
            continue;
        };
        if !block.atomic && char_len(text, start, end) > max_chars {
            log::debug!(
                "Splitting oversized paragraph at {start}..{end} ({} chars)",
                char_len(text, start, end)
            );
            pieces.extend(
                split_span(text, start, end, max_chars, Granularity::Sentence)
                    .into_iter()
                    .filter_map(|(s, e)| trim_span(text, s, e)),
            );
        } else {
            pieces.push((start, end));
        }
    }

    let mut spans = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    for (start, end) in pieces {
        current = match current {
            None => Some((start, end)),
            Some((cur_start, _)) if char_len(text, cur_start, end) <= max_chars => {
                Some((cur_start, end))
            }
            Some(done) => {
                spans.push(done);
                Some((start, end))
            }
        };
    }
    spans.extend(current);
    spans
}

fn split_span(
    text: &str,
    start: usize,
    end: usize,
    max_chars: usize,
    granularity: Granularity,
) -> Vec<(usize, usize)> {
    let mut pieces = Vec::new();
    let mut piece_start = start;
    let mut piece_chars = 0;

    for (offset, segment) in granularity.segments(&text[start..end]) {
        let seg_start = start + offset;
        let seg_end = seg_start + segment.len();
        let seg_chars = segment.chars().count();

        if piece_chars > 0 && piece_chars + seg_chars > max_chars {
            pieces.push((piece_start, seg_start));
            piece_start = seg_start;
            piece_chars = 0;
        }

        if seg_chars > max_chars {
            if let Some(finer) = granularity.finer() {
                pieces.extend(split_span(text, seg_start, seg_end, max_chars, finer));
                piece_start = seg_end;
                continue;
            }
        }

        piece_chars += seg_chars;
    }

    if piece_chars > 0 {
        pieces.push((piece_start, end));
    }
    pieces
}

fn trim_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lead = slice.len() - slice.trim_start().len();
    Some((start + lead, start + lead + trimmed.len()))
}

fn char_len(text: &str, start: usize, end: usize) -> usize {
    text[start..end].chars().count()
}
