use std::hash::Hasher;
use twox_hash::XxHash64;

use coursedb_core::traits::Embedder;

/// Feature-hashed bag of words. Deterministic and offline; used by tests and
/// by deployments without a model on disk.
///
/// Every lowercase alphanumeric token adds 1.0 to bucket `xxh64(token) % dim`
/// and the result is L2-normalised. Texts without tokens embed to zeros.
pub struct HashedEmbedder {
    dim: usize,
    id: String,
}

impl HashedEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("hashed:d{dim}") }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in tokens(text) {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.as_bytes());
            let idx = (hasher.finish() % self.dim as u64) as usize;
            v[idx] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase)
}

impl Embedder for HashedEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_many(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_lowercased_and_split_on_punctuation() {
        let got: Vec<String> = tokens("Data-driven, Decision MAKING!").collect();
        assert_eq!(got, vec!["data", "driven", "decision", "making"]);
    }
}
