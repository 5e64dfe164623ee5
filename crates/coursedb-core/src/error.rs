use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy shared by the loader, the index and the pipeline.
///
/// `FileLoad` is recovered per file by the loader and only surfaces inside a
/// load report. Everything else is structural and propagates to the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to load {}: {reason}", .path.display())]
    FileLoad { path: PathBuf, reason: String },

    #[error("Empty corpus at {}: {reason}", .path.display())]
    EmptyCorpus { path: PathBuf, reason: String },

    #[error("Embedding service failed for {failed} of {total} items: {reason}")]
    EmbeddingService { failed: usize, total: usize, reason: String },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Cannot build an index from an empty batch")]
    EmptyInput,

    #[error("No index found at {}", .path.display())]
    IndexNotFound { path: PathBuf },

    #[error("Corrupt index at {}: {reason}", .path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("Failed to persist index to {}: {reason}", .path.display())]
    Persist { path: PathBuf, reason: String },

    #[error(
        "Index at {} is locked by another writer; \
         remove the .lock file next to it if no ingest is running",
        .path.display()
    )]
    IndexLocked { path: PathBuf },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptIndex { path: path.into(), reason: reason.into() }
    }

    pub fn persist(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Persist { path: path.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
