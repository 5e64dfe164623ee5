//! Capability traits for the external collaborators.
//!
//! The retrieval core only talks to providers through these traits, so
//! swapping an embedding or completion provider means swapping the adapter.

/// Text → fixed-dimension vector.
///
/// Implementations must return vectors of length [`Embedder::dim`] for every
/// input and should L2-normalise them. Retries and rate limiting belong to the
/// implementation; an `Err` is treated as a hard failure for the inputs
/// involved.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model, e.g. `hashed:d1024`.
    fn embedder_id(&self) -> &str;
    /// Embedding dimensionality.
    fn dim(&self) -> usize;
    /// Embed a batch of texts, one vector per input in input order.
    fn embed_many(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_many(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Prompt handed to a completion provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub context: String,
    pub question: String,
}

/// Opaque text-completion service (the language model).
pub trait Completer: Send + Sync {
    fn complete(&self, prompt: &Prompt) -> anyhow::Result<String>;
}
