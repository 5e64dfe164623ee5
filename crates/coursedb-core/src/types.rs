//! Domain types shared by the loader, chunker, index and pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Error;

pub type ChunkId = String;

/// How a document's text was extracted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Text,
    Markdown,
    Pdf,
    Docx,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "markdown" => Ok(Self::Markdown),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            other => Err(Error::InvalidInput(format!("unknown source type '{other}'"))),
        }
    }
}

/// A source file converted to plain text.
///
/// - `id`: path relative to the corpus root, `/`-separated
/// - `path`: path of the file as it was read
/// - `category`: parent directory relative to the root (`misc` at the root)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub path: String,
    pub category: String,
    pub source_type: SourceType,
    pub loaded_at: DateTime<Utc>,
    pub text: String,
}

/// A window of a document's text.
///
/// `start`/`end` are character offsets into the document text. `overlap` is
/// the number of leading characters shared with the previous chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub id: ChunkId,
    pub doc_id: String,
    pub doc_path: String,
    pub category: String,
    pub source_type: SourceType,
    pub loaded_at: DateTime<Utc>,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start: usize,
    pub end: usize,
    pub overlap: usize,
    pub text: String,
}

impl Chunk {
    pub fn content_hash(&self) -> String {
        content_hash(&self.text)
    }

    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            chunk_id: self.id.clone(),
            doc_id: self.doc_id.clone(),
            doc_path: self.doc_path.clone(),
            category: self.category.clone(),
            source_type: self.source_type,
            chunk_index: self.chunk_index,
            total_chunks: self.total_chunks,
            start: self.start,
            end: self.end,
            loaded_at: Some(self.loaded_at),
            content_hash: self.content_hash(),
        }
    }
}

/// Hex blake3 digest used to recognise chunks that are already indexed.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// False when any component is NaN or infinite.
pub fn is_finite_vector(vector: &[f32]) -> bool {
    vector.iter().all(|x| x.is_finite())
}

/// Source metadata carried by every index entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryMetadata {
    pub chunk_id: ChunkId,
    pub doc_id: String,
    pub doc_path: String,
    pub category: String,
    pub source_type: SourceType,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start: usize,
    pub end: usize,
    pub loaded_at: Option<DateTime<Utc>>,
    pub content_hash: String,
}

/// An embedded chunk waiting to be appended to an index.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: EntryMetadata,
}

/// A stored entry. `ordinal` is assigned by the index in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub ordinal: u64,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: EntryMetadata,
}

/// Similarity metric an index is tagged with at build time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    L2,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
        }
    }

    /// Score of `candidate` against `query`; higher is always better.
    ///
    /// Cosine returns the cosine similarity (0 when either vector has zero
    /// norm). L2 returns the negated Euclidean distance.
    pub fn score(self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(query, candidate),
            Self::L2 => -l2_distance(query, candidate),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "l2" | "euclidean" => Ok(Self::L2),
            other => Err(Error::InvalidInput(format!("unknown metric '{other}'"))),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

/// One ranked result of a nearest-neighbour search.
///
/// `score` follows [`Metric::score`]: higher is better.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub entry: Arc<IndexEntry>,
    pub score: f32,
}

impl SearchHit {
    pub fn ordinal(&self) -> u64 {
        self.entry.ordinal
    }

    pub fn text(&self) -> &str {
        &self.entry.text
    }
}
