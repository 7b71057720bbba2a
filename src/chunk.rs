//! Paragraph-boundary text chunker.
//!
//! Splits a note's text into [`Chunk`]s that respect a configurable
//! `max_tokens` limit. Splitting occurs on paragraph boundaries (`\n\n`)
//! to preserve semantic coherence within each chunk.
//!
//! Chunks are keyed by `(path, chunk_index)`, so the same text always maps
//! to the same remote records.

use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into chunks on paragraph boundaries, respecting max_tokens.
/// Returns chunks with contiguous indices starting at 0.
pub fn chunk_text(path: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;

    if text.is_empty() {
        return vec![make_chunk(path, 0, text)];
    }

    let mut chunks = Vec::new();
    let mut current_buf = String::new();
    let mut chunk_index = 0usize;

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            chunks.push(make_chunk(path, chunk_index, &current_buf));
            chunk_index += 1;
            current_buf.clear();
        }

        if trimmed.len() > max_chars {
            // Oversized paragraph: hard split near max_chars.
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = split_point(remaining, max_chars);
                let piece = remaining[..split_at].trim();
                if !piece.is_empty() {
                    chunks.push(make_chunk(path, chunk_index, piece));
                    chunk_index += 1;
                }
                remaining = &remaining[split_at..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        chunks.push(make_chunk(path, chunk_index, &current_buf));
    }

    // Whitespace-only notes still get one record.
    if chunks.is_empty() {
        chunks.push(make_chunk(path, 0, text.trim()));
    }

    chunks
}

/// Byte offset to cut `text` at, preferring a newline or space and never
/// landing inside a UTF-8 sequence.
fn split_point(text: &str, max_chars: usize) -> usize {
    if text.len() <= max_chars {
        return text.len();
    }
    let mut limit = max_chars;
    while !text.is_char_boundary(limit) {
        limit -= 1;
    }
    if limit == 0 {
        // A single character wider than the budget.
        return text.chars().next().map(char::len_utf8).unwrap_or(text.len());
    }
    text[..limit]
        .rfind('\n')
        .or_else(|| text[..limit].rfind(' '))
        .map(|pos| pos + 1)
        .unwrap_or(limit)
}

fn make_chunk(path: &str, index: usize, text: &str) -> Chunk {
    Chunk {
        path: path.to_string(),
        chunk_index: index,
        text: text.to_string(),
    }
}
