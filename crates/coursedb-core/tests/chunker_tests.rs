use chrono::Utc;
use coursedb_core::chunker::{Chunker, ChunkingConfig};
use coursedb_core::types::{Chunk, Document, SourceType};

fn doc(id: &str, text: &str) -> Document {
    Document {
        id: id.to_string(),
        path: format!("/corpus/{id}"),
        category: "misc".to_string(),
        source_type: SourceType::Text,
        loaded_at: Utc::now(),
        text: text.to_string(),
    }
}

/// Deterministic prose of exactly `len` chars with words, sentences and paragraphs.
fn prose(len: usize, seed: u64) -> String {
    let words = [
        "data", "driven", "decision", "making", "model", "course", "analytics", "strategy", "is",
        "a",
    ];
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut out = String::new();
    while out.chars().count() < len {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let r = (state >> 33) as usize;
        out.push_str(words[r % words.len()]);
        out.push_str(match r % 17 { 0 => ".\n\n", 1 => ".\n", 2 | 3 => ". ", _ => " " });
    }
    out.chars().take(len).collect()
}

fn reconstruct(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    for c in chunks {
        text.extend(c.text.chars().skip(c.overlap));
    }
    text
}

fn assert_chunk_invariants(text: &str, chunks: &[Chunk], config: &ChunkingConfig) {
    for (i, c) in chunks.iter().enumerate() {
        assert!(c.text.chars().count() <= config.max_chunk_size, "chunk {i} exceeds max size");
        assert_eq!(c.text.chars().count(), c.end - c.start);
        assert_eq!(c.chunk_index, i);
        assert_eq!(c.total_chunks, chunks.len());
        if i == 0 {
            assert_eq!(c.start, 0);
            assert_eq!(c.overlap, 0);
        } else {
            assert_eq!(c.overlap, config.overlap_size);
            assert_eq!(
                c.start,
                chunks[i - 1].end - config.overlap_size,
                "chunk {i} must start overlap chars before previous end"
            );
        }
    }
    if let Some(last) = chunks.last() {
        assert_eq!(last.end, text.chars().count());
    }
    assert_eq!(reconstruct(chunks), text, "dropping overlaps must give back the original text");
}

#[test]
fn empty_document_yields_no_chunks() {
    let chunker = Chunker::new(ChunkingConfig::new(1000, 150)).expect("chunker");
    assert!(chunker.split(&doc("empty.txt", "")).is_empty());
}

#[test]
fn short_document_is_one_chunk_equal_to_text() {
    let chunker = Chunker::new(ChunkingConfig::new(1000, 150)).expect("chunker");
    for len in [1, 50, 500, 999, 1000] {
        let text = prose(len, len as u64);
        let chunks = chunker.split(&doc("short.txt", &text));
        assert_eq!(chunks.len(), 1, "len={len}");
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].id, "short.txt:0");
    }
}

#[test]
fn scenario_500_1500_50_gives_four_chunks() {
    let chunker = Chunker::new(ChunkingConfig::new(1000, 150)).expect("chunker");
    let docs = vec![
        doc("a.txt", &prose(500, 1)),
        doc("b.txt", &prose(1500, 2)),
        doc("c.txt", &prose(50, 3)),
    ];
    let counts: Vec<usize> = docs.iter().map(|d| chunker.split(d).len()).collect();
    assert_eq!(counts, vec![1, 2, 1]);
    assert_eq!(chunker.split_all(&docs).len(), 4);
}

#[test]
fn reconstruction_holds_across_configs_and_lengths() {
    let configs = [
        ChunkingConfig::new(1000, 150),
        ChunkingConfig::new(100, 20),
        ChunkingConfig::new(37, 36),
        ChunkingConfig { max_chunk_size: 64, overlap_size: 8, lookback: Some(64) },
        ChunkingConfig { max_chunk_size: 64, overlap_size: 8, lookback: Some(0) },
    ];
    for config in &configs {
        let chunker = Chunker::new(config.clone()).expect("chunker");
        for (seed, len) in [(1u64, 10usize), (2, 101), (3, 999), (4, 2500), (5, 7777)] {
            let text = prose(len, seed);
            let chunks = chunker.split(&doc("p.txt", &text));
            assert_chunk_invariants(&text, &chunks, config);
        }
    }
}

#[test]
fn text_without_whitespace_is_hard_cut() {
    let config = ChunkingConfig::new(10, 3);
    let chunker = Chunker::new(config.clone()).expect("chunker");
    let text = "abcdefghijklmnopqrstuvwxyz";
    let chunks = chunker.split(&doc("alpha.txt", text));
    assert_eq!(chunks[0].text, "abcdefghij");
    assert_eq!(chunks[1].text, "hijklmnopq");
    assert_chunk_invariants(text, &chunks, &config);
}

#[test]
fn prefers_paragraph_boundary_inside_lookback() {
    let config = ChunkingConfig { max_chunk_size: 30, overlap_size: 5, lookback: Some(15) };
    let chunker = Chunker::new(config.clone()).expect("chunker");
    let text = "first paragraph here.\n\nsecond paragraph goes on and on";
    let chunks = chunker.split(&doc("para.txt", text));
    assert_eq!(chunks[0].text, "first paragraph here.\n\n");
    assert_chunk_invariants(text, &chunks, &config);
}

#[test]
fn multibyte_text_is_counted_in_chars() {
    let config = ChunkingConfig::new(12, 4);
    let chunker = Chunker::new(config.clone()).expect("chunker");
    let text = "decisão baseada em dados é essencial para gestão";
    let chunks = chunker.split(&doc("pt.txt", text));
    assert!(chunks.len() > 1);
    assert_chunk_invariants(text, &chunks, &config);
}

#[test]
fn invalid_configs_are_rejected() {
    assert!(Chunker::new(ChunkingConfig::new(100, 100)).is_err());
    assert!(Chunker::new(ChunkingConfig::new(100, 150)).is_err());
    assert!(Chunker::new(ChunkingConfig::new(0, 0)).is_err());
    assert!(Chunker::new(ChunkingConfig::new(100, 0)).is_err());
}
