//! Query-time retrieval: embed the question, search, assemble context.

use std::sync::Arc;

use coursedb_core::traits::{Completer, Embedder, Prompt};
use coursedb_core::{Error, Result};
use coursedb_vector::{IndexHandle, VectorIndex};

use crate::prompt::{build_prompt, DEFAULT_SYSTEM_PROMPT};

/// Separator between chunk texts in the assembled context.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f32,
    /// Source file path.
    pub source: String,
    pub doc_id: String,
    pub chunk_index: usize,
    pub ordinal: u64,
}

#[derive(Debug, Clone)]
pub struct Retrieval {
    pub question: String,
    /// Best first.
    pub chunks: Vec<RetrievedChunk>,
    pub context: String,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub prompt: Prompt,
    pub retrieval: Retrieval,
}

enum IndexSource {
    Fixed(Arc<VectorIndex>),
    Cached(IndexHandle),
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    source: IndexSource,
    system_prompt: String,
}

impl Retriever {
    /// Retrieve from the bundle behind `handle`, reloading it when it changes on disk.
    pub fn new(embedder: Arc<dyn Embedder>, handle: IndexHandle) -> Self {
        Self {
            embedder,
            source: IndexSource::Cached(handle),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Retrieve from an index already in memory.
    pub fn with_index(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        Self {
            embedder,
            source: IndexSource::Fixed(index),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    async fn index(&self) -> Result<Arc<VectorIndex>> {
        match &self.source {
            IndexSource::Fixed(index) => Ok(Arc::clone(index)),
            IndexSource::Cached(handle) => handle.get().await,
        }
    }

    /// The `k` chunks nearest to `question`, best first, and their texts
    /// joined into one context string. `k` larger than the index returns
    /// every entry.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Retrieval> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("question must not be empty".into()));
        }
        if k == 0 {
            return Err(Error::InvalidInput("k must be at least 1".into()));
        }
        let index = self.index().await?;
        let query = self.embedder.embed(question).map_err(|e| Error::EmbeddingService {
            failed: 1,
            total: 1,
            reason: format!("{e:#}"),
        })?;
        let hits = index.search(&query, k)?;
        tracing::debug!("Retrieved {} chunks for '{}'", hits.len(), question);

        let chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                text: hit.entry.text.clone(),
                score: hit.score,
                source: hit.entry.metadata.doc_path.clone(),
                doc_id: hit.entry.metadata.doc_id.clone(),
                chunk_index: hit.entry.metadata.chunk_index,
                ordinal: hit.entry.ordinal,
            })
            .collect();
        let context =
            chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(CONTEXT_SEPARATOR);
        Ok(Retrieval { question: question.to_string(), chunks, context })
    }

    /// Prompt for `question` grounded in the top `k` chunks.
    pub async fn prompt(&self, question: &str, k: usize) -> Result<(Prompt, Retrieval)> {
        let retrieval = self.retrieve(question, k).await?;
        let prompt = build_prompt(&self.system_prompt, &retrieval.context, &retrieval.question);
        Ok((prompt, retrieval))
    }

    /// Retrieve, build the prompt and hand it to `completer`.
    pub async fn answer(
        &self,
        completer: &dyn Completer,
        question: &str,
        k: usize,
    ) -> anyhow::Result<Answer> {
        let (prompt, retrieval) = self.prompt(question, k).await?;
        let text = completer.complete(&prompt)?;
        Ok(Answer { text, prompt, retrieval })
    }
}
