//! Ingestion: corpus directory to persisted index.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use coursedb_core::chunker::Chunker;
use coursedb_core::config::Settings;
use coursedb_core::loader::{DocumentLoader, FileFailure};
use coursedb_core::traits::Embedder;
use coursedb_core::types::Metric;
use coursedb_core::{Error, Result};
use coursedb_vector::{store, VectorIndex};

use crate::embedding::{embed_chunks, DroppedChunk, EmbeddingPolicy};

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub docs_path: PathBuf,
    pub index_path: PathBuf,
    /// Merge into the index at `index_path` instead of replacing it.
    pub incremental: bool,
}

/// How the persisted index was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    Fresh,
    Merged,
    /// Incremental run with nothing new; the bundle was left as is.
    Unchanged,
    /// Incremental run that found no index and built one from scratch.
    FreshAfterMissingIndex,
}

#[derive(Debug)]
pub struct IngestReport {
    pub mode: IngestMode,
    pub documents: usize,
    pub file_failures: Vec<FileFailure>,
    pub skipped_files: usize,
    pub chunks: usize,
    pub duplicates_skipped: usize,
    pub embedded: usize,
    pub dropped: Vec<DroppedChunk>,
    pub total_entries: usize,
    pub generation: u64,
}

pub struct Ingestor {
    loader: DocumentLoader,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    policy: EmbeddingPolicy,
    metric: Metric,
}

impl Ingestor {
    pub fn new(
        loader: DocumentLoader,
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        policy: EmbeddingPolicy,
        metric: Metric,
    ) -> Self {
        Self { loader, chunker, embedder, policy, metric }
    }

    pub fn from_settings(settings: &Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Ok(Self::new(
            DocumentLoader::new(settings.loader.clone()),
            Chunker::new(settings.chunking.clone())?,
            embedder,
            EmbeddingPolicy::from(&settings.embedding),
            settings.retrieval.metric,
        ))
    }

    pub async fn ingest(&self, req: &IngestRequest) -> Result<IngestReport> {
        check_paths_disjoint(&req.docs_path, &req.index_path)?;
        store::ensure_replaceable(&req.index_path)?;
        let _lock = WriterLock::acquire(&req.index_path)?;

        let loaded = self.loader.load(&req.docs_path)?;
        if loaded.is_empty() {
            return Err(Error::EmptyCorpus {
                path: req.docs_path.clone(),
                reason: format!(
                    "no readable documents ({} failed, {} skipped)",
                    loaded.failures.len(),
                    loaded.skipped.len()
                ),
            });
        }
        let chunks = self.chunker.split_all(&loaded.documents);
        tracing::info!("Split {} documents into {} chunks", loaded.documents.len(), chunks.len());
        if chunks.is_empty() {
            return Err(Error::EmptyCorpus {
                path: req.docs_path.clone(),
                reason: format!("{} documents contain no text", loaded.documents.len()),
            });
        }

        let (base, mode) = if req.incremental {
            self.open_existing(&req.index_path).await?
        } else {
            (None, IngestMode::Fresh)
        };

        // A chunk counts as indexed only for the document it came from.
        let (pending, duplicates_skipped) = match &base {
            Some(index) => {
                let known = index.indexed_chunks();
                let pending: Vec<_> = chunks
                    .iter()
                    .filter(|c| !known.contains(&(c.doc_id.as_str(), c.content_hash().as_str())))
                    .cloned()
                    .collect();
                let skipped = chunks.len() - pending.len();
                (pending, skipped)
            }
            None => (chunks.clone(), 0),
        };

        let mut report = IngestReport {
            mode,
            documents: loaded.documents.len(),
            file_failures: loaded.failures,
            skipped_files: loaded.skipped.len(),
            chunks: chunks.len(),
            duplicates_skipped,
            embedded: 0,
            dropped: Vec::new(),
            total_entries: 0,
            generation: 0,
        };

        if let (Some(index), true) = (&base, pending.is_empty()) {
            tracing::info!("All {} chunks are already indexed; nothing to write", chunks.len());
            report.mode = IngestMode::Unchanged;
            report.total_entries = index.len();
            report.generation = index.generation();
            return Ok(report);
        }

        tracing::info!("Embedding {} chunks with {}", pending.len(), self.embedder.embedder_id());
        let batch = embed_chunks(self.embedder.as_ref(), &pending, &self.policy)?;
        report.embedded = batch.entries.len();
        report.dropped = batch.dropped;

        let index = match base {
            Some(index) => index.add(batch.entries)?,
            None => {
                VectorIndex::build(self.metric, self.embedder.embedder_id(), batch.entries)?
            }
        };
        store::save(&index, &req.index_path).await?;

        report.total_entries = index.len();
        report.generation = index.generation();
        tracing::info!(
            "Ingest finished ({:?}): {} new entries, {} total, {} dropped",
            report.mode,
            report.embedded,
            report.total_entries,
            report.dropped.len()
        );
        Ok(report)
    }

    async fn open_existing(&self, path: &Path) -> Result<(Option<VectorIndex>, IngestMode)> {
        match store::load(path).await {
            Ok(index) => {
                if index.dim() != self.embedder.dim() {
                    return Err(Error::DimensionMismatch {
                        expected: index.dim(),
                        actual: self.embedder.dim(),
                    });
                }
                if index.embedder_id() != self.embedder.embedder_id() {
                    tracing::warn!(
                        "Index at {} was built with '{}' but '{}' is configured; \
                     vectors may not be comparable",
                        path.display(),
                        index.embedder_id(),
                        self.embedder.embedder_id()
                    );
                }
                tracing::info!(
                    "Merging into existing index at {} ({} entries)",
                    path.display(),
                    index.len()
                );
                Ok((Some(index), IngestMode::Merged))
            }
            Err(Error::IndexNotFound { .. }) => {
                tracing::warn!(
                    "INCREMENTAL INGEST FELL BACK TO A FRESH BUILD: no index found at {}; \
                     previously indexed content will not be carried over",
                    path.display()
                );
                Ok((None, IngestMode::FreshAfterMissingIndex))
            }
            Err(e) => Err(e),
        }
    }
}

/// Rejects an index path that equals the corpus directory or lies on either
/// side of it, since saving replaces everything at the index path.
fn check_paths_disjoint(docs_path: &Path, index_path: &Path) -> Result<()> {
    let docs = resolve(docs_path);
    let index = resolve(index_path);
    if index.starts_with(&docs) || docs.starts_with(&index) {
        return Err(Error::InvalidInput(format!(
            "index path {} overlaps the documents directory {}",
            index_path.display(),
            docs_path.display()
        )));
    }
    Ok(())
}

/// Absolute form of `path` with symlinks resolved for the part that exists.
fn resolve(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(real) = existing.canonicalize() {
            return missing.iter().rev().fold(real, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

/// Exclusive `<index>.lock` file held for the duration of one ingest.
struct WriterLock {
    path: PathBuf,
}

impl WriterLock {
    fn acquire(index_path: &Path) -> Result<Self> {
        let mut name = index_path.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Informational only; removal of the file releases the lock.
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(Error::IndexLocked { path: index_path.to_path_buf() })
            }
            Err(e) => Err(Error::io(&path, e)),
        }
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Could not remove lock file {}: {}", self.path.display(), e);
        }
    }
}
