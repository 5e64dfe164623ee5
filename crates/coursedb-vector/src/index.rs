//! In-memory vector index with exact nearest-neighbour search.
//!
//! An index is immutable once built. [`VectorIndex::add`] returns a new
//! generation that shares the existing entries, so holders of the previous
//! handle keep seeing exactly what they saw before.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use coursedb_core::types::{is_finite_vector, IndexEntry, Metric, NewEntry, SearchHit};
use coursedb_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct VectorIndex {
    metric: Metric,
    dim: usize,
    generation: u64,
    embedder_id: String,
    entries: Vec<Arc<IndexEntry>>,
}

impl VectorIndex {
    /// Build generation 0 from a non-empty batch. The first vector fixes
    /// the dimensionality.
    pub fn build(
        metric: Metric,
        embedder_id: impl Into<String>,
        entries: Vec<NewEntry>,
    ) -> Result<Self> {
        let first = entries.first().ok_or(Error::EmptyInput)?;
        let dim = first.vector.len();
        if dim == 0 {
            return Err(Error::InvalidInput("embedding vectors must not be empty".into()));
        }
        let mut index = Self {
            metric,
            dim,
            generation: 0,
            embedder_id: embedder_id.into(),
            entries: Vec::new(),
        };
        index.append(entries)?;
        Ok(index)
    }

    /// Append a batch and return the next generation; `self` is untouched.
    pub fn add(&self, entries: Vec<NewEntry>) -> Result<Self> {
        let mut next = self.clone();
        next.generation += 1;
        next.append(entries)?;
        Ok(next)
    }

    fn append(&mut self, entries: Vec<NewEntry>) -> Result<()> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != self.dim) {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: bad.vector.len() });
        }
        if let Some(bad) = entries.iter().find(|e| !is_finite_vector(&e.vector)) {
            return Err(Error::InvalidInput(format!(
                "vector for chunk {} has a NaN or infinite component",
                bad.metadata.chunk_id
            )));
        }
        let base = self.entries.len() as u64;
        self.entries.reserve(entries.len());
        for (i, e) in entries.into_iter().enumerate() {
            self.entries.push(Arc::new(IndexEntry {
                ordinal: base + i as u64,
                vector: e.vector,
                text: e.text,
                metadata: e.metadata,
            }));
        }
        Ok(())
    }

    /// Reassemble a loaded index. Entries must already be validated and
    /// ordered by ordinal.
    pub(crate) fn from_parts(
        metric: Metric,
        dim: usize,
        generation: u64,
        embedder_id: String,
        entries: Vec<IndexEntry>,
    ) -> Self {
        let entries = entries.into_iter().map(Arc::new).collect();
        Self { metric, dim, generation, embedder_id, entries }
    }

    /// The `k` best entries for `query`, best first. Equal scores keep
    /// insertion order. Returns every entry when `k` exceeds the size.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        if !is_finite_vector(query) {
            return Err(Error::InvalidInput("query vector has a NaN or infinite component".into()));
        }
        let mut scored: Vec<(f32, &Arc<IndexEntry>)> =
            self.entries.iter().map(|e| (self.metric.score(query, &e.vector), e)).collect();
        scored.sort_by(|a, b| match b.0.total_cmp(&a.0) {
            Ordering::Equal => a.1.ordinal.cmp(&b.1.ordinal),
            other => other,
        });
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| SearchHit { entry: Arc::clone(entry), score })
            .collect())
    }

    /// `(doc_id, content_hash)` of every stored chunk.
    pub fn indexed_chunks(&self) -> HashSet<(&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.metadata.doc_id.as_str(), e.metadata.content_hash.as_str()))
            .collect()
    }

    pub fn entries(&self) -> &[Arc<IndexEntry>] {
        &self.entries
    }

    pub fn get(&self, ordinal: u64) -> Option<&Arc<IndexEntry>> {
        self.entries.get(usize::try_from(ordinal).ok()?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn embedder_id(&self) -> &str {
        &self.embedder_id
    }
}
