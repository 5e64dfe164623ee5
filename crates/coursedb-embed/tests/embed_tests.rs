use coursedb_core::config::{EmbeddingProvider, EmbeddingSettings};
use coursedb_core::traits::Embedder;
use coursedb_embed::{get_default_embedder, HashedEmbedder};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
fn hashed_embedder_shapes_and_determinism() {
    let embedder = HashedEmbedder::new(1024);
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_many(&texts).expect("embed_many");
    let (v1, v2) = (&embs[0], &embs[1]);

    assert_eq!(v1.len(), 1024);
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    assert_eq!(v1, v2);
    assert_eq!(embedder.embedder_id(), "hashed:d1024");
}

#[test]
fn shared_vocabulary_scores_higher() {
    let embedder = HashedEmbedder::new(512);
    let q = embedder.embed("what is data-driven decision making?").unwrap();
    let near = embedder.embed("Data-driven decision making uses evidence.").unwrap();
    let far = embedder.embed("The cafeteria opens at noon on Fridays.").unwrap();
    assert!(cosine(&q, &near) > cosine(&q, &far));
}

#[test]
fn empty_text_embeds_to_zeros() {
    let embedder = HashedEmbedder::new(16);
    let v = embedder.embed("  ... ").unwrap();
    assert_eq!(v, vec![0.0; 16]);
}

#[test]
fn default_embedder_honours_hashed_provider() {
    let settings =
        EmbeddingSettings { provider: EmbeddingProvider::Hashed, dim: 64, ..Default::default() };
    let embedder = get_default_embedder(&settings).expect("embedder");
    assert_eq!(embedder.dim(), 64);
    assert_eq!(embedder.embed_many(&["a b".to_string()]).unwrap()[0].len(), 64);
}
