#![allow(dead_code)]

use mdmerge::{BlockKind, BlockParser, LineBlockParser, Session, Snapshot};

/// Write every chunk, finalize, and return the committed blocks as `(kind, raw)` pairs.
pub fn collect_final_blocks(chunks: impl IntoIterator<Item = String>) -> Vec<(BlockKind, String)> {
    collect_final_blocks_with(chunks, LineBlockParser::default())
}

pub fn collect_final_raw(chunks: impl IntoIterator<Item = String>) -> Vec<String> {
    collect_final_blocks(chunks)
        .into_iter()
        .map(|(_, raw)| raw)
        .collect()
}

pub fn collect_final_blocks_with<P: BlockParser>(
    chunks: impl IntoIterator<Item = String>,
    parser: P,
) -> Vec<(BlockKind, String)> {
    let (_, last) = collect_snapshots(chunks, parser);
    last.committed
        .iter()
        .map(|b| (b.kind, b.raw.to_string()))
        .collect()
}

/// Every snapshot produced by the writes, plus the snapshot returned by `finalize`.
pub fn collect_snapshots<P: BlockParser>(
    chunks: impl IntoIterator<Item = String>,
    parser: P,
) -> (Vec<Snapshot>, Snapshot) {
    let mut session = Session::create(parser, None);
    let mut snaps = Vec::new();
    for chunk in chunks {
        snaps.push(session.write(&chunk).unwrap());
    }
    let last = session.finalize(None);
    (snaps, last)
}

pub fn raws(blocks: &[mdmerge::Block]) -> Vec<&str> {
    blocks.iter().map(|b| &*b.raw).collect()
}

pub fn chunk_whole(text: &str) -> Vec<String> {
    vec![text.to_string()]
}

pub fn chunk_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(|s| s.to_string()).collect()
}

pub fn chunk_chars(text: &str) -> Vec<String> {
    text.chars().map(|c| c.to_string()).collect()
}

fn fnv1a64(s: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for &b in s.as_bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn xorshift64(state: &mut u64) -> u64 {
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    *state = x;
    x
}

/// Deterministic pseudo-random chunking, always cut on `char` boundaries.
pub fn chunk_pseudo_random(
    text: &str,
    seed_label: &str,
    trial: u64,
    max_bytes: usize,
) -> Vec<String> {
    assert!(max_bytes > 0);
    let mut state = (fnv1a64(seed_label) ^ trial.wrapping_mul(0x9e3779b97f4a7c15)) | 1;

    let mut out = Vec::new();
    let mut start = 0usize;
    while start < text.len() {
        let want = (xorshift64(&mut state) as usize % max_bytes) + 1;
        let mut end = (start + want).min(text.len());
        while end < text.len() && !text.is_char_boundary(end) {
            end += 1;
        }
        out.push(text[start..end].to_string());
        start = end;
    }
    out
}
