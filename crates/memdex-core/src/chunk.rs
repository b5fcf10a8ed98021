//! Line-addressable overlapping text chunker.
//!
//! Splits a document into [`ChunkDraft`]s sized for embedding. Every draft
//! records the 1-indexed, inclusive line range it covers, so search results
//! can point straight back into the source file.
//!
//! # Algorithm
//!
//! 1. Convert `target_tokens` and `overlap_tokens` to character budgets
//!    using a 4 chars/token ratio. Each line costs its char count plus one
//!    for the newline.
//! 2. Accumulate lines into a buffer. Once the buffer reaches the target
//!    budget, emit a chunk spanning the buffer's first line to the current
//!    line, with the joined lines trimmed as its text.
//! 3. Seed the next buffer with a trailing window of the emitted lines
//!    whose size reaches the overlap budget (at least one line, never the
//!    whole buffer when it holds more than one line).
//! 4. After the last line, flush lines not yet emitted as a final chunk.
//!
//! Single pass, no backtracking once a chunk is cut.
//!
//! # Example
//!
//! ```rust
//! use memdex_core::chunk::chunk_lines;
//!
//! let drafts = chunk_lines("# Log\n\nShipped the sync engine.", 400, 80);
//! assert_eq!(drafts.len(), 1);
//! assert_eq!((drafts[0].start_line, drafts[0].end_line), (1, 3));
//! ```

use crate::models::ChunkDraft;

/// Approximate characters-per-token ratio. No real tokenizer is involved.
pub const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into overlapping, line-addressed chunk drafts.
///
/// # Guarantees
///
/// - Empty and whitespace-only documents yield no drafts.
/// - A document under one budget yields exactly one draft covering every line.
/// - Drafts never have empty text and always satisfy `start_line <= end_line`.
/// - Together the drafts cover every line of the document.
/// - Consecutive drafts overlap: `next.start_line <= prev.end_line`.
pub fn chunk_lines(text: &str, target_tokens: usize, overlap_tokens: usize) -> Vec<ChunkDraft> {
    let budget = target_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap_budget = overlap_tokens * CHARS_PER_TOKEN;

    let lines: Vec<&str> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();

    let mut drafts: Vec<ChunkDraft> = Vec::new();
    let mut buf: Vec<(usize, &str)> = Vec::new();
    let mut buf_chars = 0usize;
    // Lines in `buf` that no emitted draft covers yet.
    let mut fresh = 0usize;

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        buf.push((line_no, *line));
        buf_chars += line_cost(line);
        fresh += 1;

        if buf_chars < budget {
            continue;
        }

        let joined = join_trimmed(&buf);
        if joined.is_empty() {
            // Whitespace-only buffers are never cut.
            continue;
        }

        drafts.push(ChunkDraft {
            text: joined,
            start_line: buf[0].0,
            end_line: line_no,
        });

        let keep = overlap_window(&buf, overlap_budget);
        buf.drain(..buf.len() - keep);
        buf_chars = buf.iter().map(|(_, l)| line_cost(l)).sum();
        fresh = 0;
    }

    // Lines already emitted as overlap are not flushed again on their own.
    if fresh > 0 {
        let tail_is_blank = buf[buf.len() - fresh..]
            .iter()
            .all(|(_, l)| l.trim().is_empty());

        if tail_is_blank {
            // Nothing new to say; stretch the last draft over the blank tail.
            if let Some(last) = drafts.last_mut() {
                last.end_line = lines.len();
            }
        } else {
            drafts.push(ChunkDraft {
                text: join_trimmed(&buf),
                start_line: buf[0].0,
                end_line: lines.len(),
            });
        }
    }

    drafts
}

fn line_cost(line: &str) -> usize {
    line.chars().count() + 1
}

fn join_trimmed(buf: &[(usize, &str)]) -> String {
    buf.iter()
        .map(|(_, l)| *l)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Number of trailing lines of `buf` to carry into the next chunk.
fn overlap_window(buf: &[(usize, &str)], overlap_budget: usize) -> usize {
    let max_keep = if buf.len() > 1 { buf.len() - 1 } else { 1 };
    let mut kept = 0usize;
    let mut chars = 0usize;
    for (_, line) in buf.iter().rev() {
        kept += 1;
        chars += line_cost(line);
        if chars >= overlap_budget || kept >= max_keep {
            break;
        }
    }
    kept
}
