//! Batched embedding with per-item failure isolation.
//!
//! A failing batch is retried one item at a time; items that still fail are
//! dropped and reported, as are vectors with NaN or infinite components.
//! Vectors of the wrong length are never tolerated.

use indicatif::{ProgressBar, ProgressStyle};

use coursedb_core::config::EmbeddingSettings;
use coursedb_core::traits::Embedder;
use coursedb_core::types::{is_finite_vector, Chunk, ChunkId, NewEntry};
use coursedb_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct EmbeddingPolicy {
    pub batch_size: usize,
    /// Largest tolerated fraction of dropped chunks.
    pub max_failure_ratio: f32,
    pub show_progress: bool,
}

impl Default for EmbeddingPolicy {
    fn default() -> Self {
        Self { batch_size: 32, max_failure_ratio: 0.1, show_progress: false }
    }
}

impl From<&EmbeddingSettings> for EmbeddingPolicy {
    fn from(s: &EmbeddingSettings) -> Self {
        Self {
            batch_size: s.batch_size.max(1),
            max_failure_ratio: s.max_failure_ratio,
            show_progress: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedChunk {
    pub chunk_id: ChunkId,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct EmbeddedBatch {
    pub entries: Vec<NewEntry>,
    pub dropped: Vec<DroppedChunk>,
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}",
        )
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

fn check_dim(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(Error::DimensionMismatch { expected, actual: vector.len() });
    }
    Ok(())
}

/// Accept `vector` for `chunk`, or drop the chunk when the vector holds a
/// NaN or infinite component.
fn accept(out: &mut EmbeddedBatch, dim: usize, chunk: &Chunk, vector: Vec<f32>) -> Result<()> {
    check_dim(dim, &vector)?;
    if !is_finite_vector(&vector) {
        tracing::warn!("Dropping chunk {}: embedding has non-finite components", chunk.id);
        out.dropped.push(DroppedChunk {
            chunk_id: chunk.id.clone(),
            reason: "embedding has NaN or infinite components".to_string(),
        });
        return Ok(());
    }
    out.entries.push(NewEntry { vector, text: chunk.text.clone(), metadata: chunk.metadata() });
    Ok(())
}

/// Embed `chunks` in batches of `policy.batch_size`.
///
/// Fails with `DimensionMismatch` on any vector whose length differs from
/// `embedder.dim()`, and with `EmbeddingService` when the dropped fraction
/// exceeds `policy.max_failure_ratio` or nothing could be embedded.
pub fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: &[Chunk],
    policy: &EmbeddingPolicy,
) -> Result<EmbeddedBatch> {
    let dim = embedder.dim();
    let mut out =
        EmbeddedBatch { entries: Vec::with_capacity(chunks.len()), dropped: Vec::new() };
    let pb = progress_bar(chunks.len(), policy.show_progress);

    for batch in chunks.chunks(policy.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        match embedder.embed_many(&texts) {
            Ok(vectors) if vectors.len() == batch.len() => {
                for (chunk, vector) in batch.iter().zip(vectors) {
                    accept(&mut out, dim, chunk, vector)?;
                }
            }
            outcome => {
                let reason = match outcome {
                    Ok(vectors) => {
                        format!("returned {} vectors for {} texts", vectors.len(), batch.len())
                    }
                    Err(e) => format!("{e:#}"),
                };
                tracing::warn!(
                    "Embedding batch of {} failed ({}); retrying item by item",
                    batch.len(),
                    reason
                );
                for chunk in batch {
                    match embedder.embed(&chunk.text) {
                        Ok(vector) => accept(&mut out, dim, chunk, vector)?,
                        Err(e) => {
                            tracing::warn!("Dropping chunk {}: {:#}", chunk.id, e);
                            out.dropped.push(DroppedChunk {
                                chunk_id: chunk.id.clone(),
                                reason: format!("{e:#}"),
                            });
                        }
                    }
                }
            }
        }
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();

    let total = chunks.len();
    let failed = out.dropped.len();
    if failed > 0 {
        let ratio = failed as f32 / total as f32;
        if ratio > policy.max_failure_ratio || out.entries.is_empty() {
            let reason = out.dropped.first().map(|d| d.reason.clone()).unwrap_or_default();
            return Err(Error::EmbeddingService {
                failed,
                total,
                reason: format!("{reason} (tolerated ratio {})", policy.max_failure_ratio),
            });
        }
        tracing::warn!("Dropped {} of {} chunks that could not be embedded", failed, total);
    }
    Ok(out)
}
