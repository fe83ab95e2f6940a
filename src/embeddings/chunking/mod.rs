
use serde::{Deserialize, Serialize};
use tracing::debug;

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const LINE_SEPARATOR: char = '\n';

/// Configuration for content chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub max_chunk_size: usize,
    /// Overlap in characters between adjacent chunks.
    /// Carried for compatibility with existing configs; chunk boundaries never overlap.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Running buffer that tracks its length in characters
#[derive(Debug, Default)]
struct ChunkBuffer {
    text: String,
    chars: usize,
}

impl ChunkBuffer {
    fn push(&mut self, piece: &str, separator: &str) {
        self.text.push_str(piece);
        self.text.push_str(separator);
        self.chars += piece.chars().count() + separator.chars().count();
    }

    fn fits(&self, piece: &str, separator_len: usize, max_size: usize) -> bool {
        self.chars + piece.chars().count() + separator_len <= max_size
    }

    fn take(&mut self) -> String {
        self.chars = 0;
        std::mem::take(&mut self.text)
    }

    /// Flush the trimmed buffer into `chunks`, skipping whitespace-only content
    fn flush_into(&mut self, chunks: &mut Vec<String>) {
        let text = self.take();
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
    }

    /// Slice `max_size` characters off the front of the buffer while it is oversized
    fn force_split_into(&mut self, chunks: &mut Vec<String>, max_size: usize) {
        while self.chars > max_size {
            let split_at = self
                .text
                .char_indices()
                .nth(max_size)
                .map_or(self.text.len(), |(idx, _)| idx);
            let rest = self.text.split_off(split_at);
            let head = std::mem::replace(&mut self.text, rest);
            self.chars -= max_size;
            if !head.trim().is_empty() {
                chunks.push(head);
            }
        }
    }
}

/// Split text into chunks of at most `max_size` characters.
///
/// Paragraphs (`\n\n`) are packed greedily; a paragraph that cannot fit on its own
/// is re-split by line, and a single line longer than `max_size` is hard-sliced
/// without regard for word boundaries. Output order follows the input and no chunk
/// is empty.
#[inline]
pub fn split_text(text: &str, max_size: usize) -> Vec<String> {
    let max_size = max_size.max(1);

    if text.trim().is_empty() {
        return Vec::new();
    }

    if text.chars().count() <= max_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = ChunkBuffer::default();

    for paragraph in text.split(PARAGRAPH_SEPARATOR) {
        if current.fits(paragraph, PARAGRAPH_SEPARATOR.len(), max_size) {
            current.push(paragraph, PARAGRAPH_SEPARATOR);
            continue;
        }

        current.flush_into(&mut chunks);
        current.push(paragraph, PARAGRAPH_SEPARATOR);

        if current.chars <= max_size {
            continue;
        }

        // Paragraph alone is too big, fall back to lines
        let oversized = current.take();
        for line in oversized.split(LINE_SEPARATOR) {
            if current.fits(line, 1, max_size) {
                current.push(line, "\n");
                continue;
            }

            current.flush_into(&mut chunks);
            current.push(line, "\n");
            current.force_split_into(&mut chunks, max_size);
        }
    }

    current.flush_into(&mut chunks);

    debug!(
        "Split {} characters into {} chunks (max {} chars)",
        text.len(),
        chunks.len(),
        max_size
    );

    chunks
}

/// Build the citation header that is prepended to every page before chunking
#[inline]
pub fn citation_header(source: &str, page: Option<u32>) -> String {
    match page {
        Some(page) => format!("Source Document: {}\nPage: {}\n\n", source, page),
        None => format!("Source Document: {}\n\n", source),
    }
}

/// Chunk one page of a document, keeping its source and page visible in the text
#[inline]
pub fn chunk_page(
    source: &str,
    page: Option<u32>,
    text: &str,
    config: &ChunkingConfig,
) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut contextual = citation_header(source, page);
    contextual.push_str(text);
    split_text(&contextual, config.max_chunk_size)
}
