//! Embedding providers behind [`coursedb_core::traits::Embedder`].

mod bge;
mod device;
mod hashed;
mod pool;
mod tokenize;

pub use bge::BgeM3Embedder;
pub use device::select_device;
pub use hashed::HashedEmbedder;
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_batch;

use anyhow::Result;
use coursedb_core::config::{expand_path, EmbeddingProvider, EmbeddingSettings};
use coursedb_core::traits::Embedder;

/// True when `APP_USE_FAKE_EMBEDDINGS` is `1` or `true`.
pub fn fake_embeddings_forced() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Build the configured provider. `APP_USE_FAKE_EMBEDDINGS` forces the
/// hashed embedder regardless of configuration.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>> {
    if fake_embeddings_forced() || settings.provider == EmbeddingProvider::Hashed {
        tracing::info!("Using hashed embeddings (dim={})", settings.dim);
        return Ok(Box::new(HashedEmbedder::new(settings.dim)));
    }
    let model_dir = settings.model_dir.as_deref().map(expand_path);
    Ok(Box::new(BgeM3Embedder::new(model_dir.as_deref())?))
}
