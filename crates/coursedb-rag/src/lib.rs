//! Ingestion and query-time retrieval over a persisted vector index.

pub mod embedding;
pub mod ingest;
pub mod prompt;
pub mod retrieve;

pub use embedding::{embed_chunks, DroppedChunk, EmbeddedBatch, EmbeddingPolicy};
pub use ingest::{IngestMode, IngestReport, IngestRequest, Ingestor};
pub use retrieve::{Answer, RetrievedChunk, Retrieval, Retriever};
