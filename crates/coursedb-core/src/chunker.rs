//! Overlapping fixed-size chunking.
//!
//! Sizes and offsets are counted in chars. Each chunk after the first starts
//! exactly `overlap_size` chars before the previous chunk's end, so dropping
//! the declared overlap from every chunk and concatenating gives back the
//! original text. Chunk ends snap to the nearest paragraph, line, sentence or
//! word boundary within the lookback window; without one the cut is hard.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Chunk, Document};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chunk_size: usize,
    pub overlap_size: usize,
    /// How far back from the hard limit a natural boundary may be taken.
    /// Defaults to a quarter of `max_chunk_size`.
    pub lookback: Option<usize>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chunk_size: 1000, overlap_size: 150, lookback: None }
    }
}

impl ChunkingConfig {
    pub fn new(max_chunk_size: usize, overlap_size: usize) -> Self {
        Self { max_chunk_size, overlap_size, lookback: None }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 || self.overlap_size == 0 {
            return Err(Error::InvalidConfig(format!(
                "chunk sizes must be positive (max_chunk_size={}, overlap_size={})",
                self.max_chunk_size, self.overlap_size
            )));
        }
        if self.overlap_size >= self.max_chunk_size {
            return Err(Error::InvalidConfig(format!(
                "overlap_size ({}) must be smaller than max_chunk_size ({})",
                self.overlap_size, self.max_chunk_size
            )));
        }
        Ok(())
    }

    pub fn lookback(&self) -> usize {
        self.lookback.unwrap_or(self.max_chunk_size / 4)
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split one document. Empty text yields no chunks.
    pub fn split(&self, doc: &Document) -> Vec<Chunk> {
        let chars: Vec<char> = doc.text.chars().collect();
        let spans = self.spans(&chars);
        let total_chunks = spans.len();
        spans
            .into_iter()
            .enumerate()
            .map(|(chunk_index, (start, end))| Chunk {
                id: format!("{}:{}", doc.id, chunk_index),
                doc_id: doc.id.clone(),
                doc_path: doc.path.clone(),
                category: doc.category.clone(),
                source_type: doc.source_type,
                loaded_at: doc.loaded_at,
                chunk_index,
                total_chunks,
                start,
                end,
                overlap: if chunk_index == 0 { 0 } else { self.config.overlap_size },
                text: chars[start..end].iter().collect(),
            })
            .collect()
    }

    pub fn split_all(&self, docs: &[Document]) -> Vec<Chunk> {
        docs.iter().flat_map(|doc| self.split(doc)).collect()
    }

    fn spans(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let len = chars.len();
        let max = self.config.max_chunk_size;
        let overlap = self.config.overlap_size;
        let mut spans = Vec::new();
        if len == 0 {
            return spans;
        }
        let mut start = 0;
        loop {
            if len - start <= max {
                spans.push((start, len));
                break;
            }
            let hard_end = start + max;
            // A chunk must outgrow the overlap or the next start would not advance.
            let min_end = start + (overlap + 1).max(max.saturating_sub(self.config.lookback()));
            let end = find_boundary(chars, min_end, hard_end).unwrap_or(hard_end);
            spans.push((start, end));
            start = end - overlap;
        }
        spans
    }
}

/// Rightmost end position in `[min_end, hard_end]` sitting just after a
/// boundary, trying paragraph, line, sentence and word boundaries in turn.
fn find_boundary(chars: &[char], min_end: usize, hard_end: usize) -> Option<usize> {
    let paragraph = |e: usize| e >= 2 && chars[e - 2] == '\n' && chars[e - 1] == '\n';
    let line = |e: usize| chars[e - 1] == '\n';
    let sentence = |e: usize| {
        e >= 2 && chars[e - 1].is_whitespace() && matches!(chars[e - 2], '.' | '!' | '?')
    };
    let word = |e: usize| chars[e - 1].is_whitespace();

    let rules: [&dyn Fn(usize) -> bool; 4] = [&paragraph, &line, &sentence, &word];
    rules
        .iter()
        .find_map(|is_boundary| (min_end.max(1)..=hard_end).rev().find(|&e| is_boundary(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn boundary_prefers_paragraph_over_word() {
        let text = chars("aaaa\n\nbbb ccc ddd");
        // window covers both the paragraph break (end=6) and later spaces
        assert_eq!(find_boundary(&text, 3, 14), Some(6));
    }

    #[test]
    fn boundary_falls_back_to_word() {
        let text = chars("aaa bbb ccc");
        assert_eq!(find_boundary(&text, 2, 10), Some(8));
    }

    #[test]
    fn boundary_none_without_whitespace() {
        let text = chars("abcdefghij");
        assert_eq!(find_boundary(&text, 2, 10), None);
    }
}
