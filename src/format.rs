//! Reply chunking: converts completion text into transport units.
//!
//! Splitting is markdown-aware. Block-level structure comes from a real
//! markdown tokenizer so a sentence is never split across blocks; fenced
//! code blocks stay atomic (or become attachments when oversized);
//! adjacent plain-text pieces are merged back together to minimize the
//! number of units sent.

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag};

use crate::outbound::TransportUnit;

/// Transport ceiling for a single inline message, in characters.
/// Slightly under the platform's hard 2000 limit to leave headroom for
/// separators added downstream.
pub const MAX_MESSAGE_LENGTH: usize = 1996;

/// Split points for plain prose, in order of preference.
const SENTENCE_DELIMITERS: &str = "\n.;?!";

/// A top-level markdown block, as a slice of the source text.
struct Block<'a> {
    text: &'a str,
    /// Info string when this block is a fenced code block.
    fence: Option<String>,
}

/// Tokenize text into top-level blocks, preserving source order.
fn block_split(text: &str) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    let mut depth = 0usize;

    for (event, range) in Parser::new(text).into_offset_iter() {
        match event {
            Event::Start(tag) => {
                if depth == 0 {
                    let fence = match &tag {
                        Tag::CodeBlock(CodeBlockKind::Fenced(info)) => {
                            Some(info.split_whitespace().next().unwrap_or("").to_string())
                        }
                        Tag::CodeBlock(CodeBlockKind::Indented) => Some(String::new()),
                        _ => None,
                    };
                    blocks.push(Block {
                        text: text[range.clone()].trim_end(),
                        fence,
                    });
                }
                depth += 1;
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            // Standalone top-level events (thematic breaks, raw HTML)
            Event::Rule | Event::Html(_) if depth == 0 => {
                blocks.push(Block {
                    text: text[range.clone()].trim_end(),
                    fence: None,
                });
            }
            _ => {}
        }
    }

    blocks.retain(|b| !b.text.is_empty());
    blocks
}

/// The inner text of a fenced code block (fence lines stripped).
fn fence_inner(block: &str) -> &str {
    let trimmed = block.trim();
    let mut inner = trimmed;
    if let Some(first_break) = inner.find('\n') {
        let (head, rest) = inner.split_at(first_break);
        if head.starts_with("```") || head.starts_with("~~~") {
            inner = &rest[1..];
        }
    }
    if let Some(last_break) = inner.rfind('\n') {
        let (rest, tail) = inner.split_at(last_break);
        if tail[1..].trim_start().starts_with("```") || tail[1..].trim_start().starts_with("~~~") {
            inner = rest;
        }
    }
    inner
}

/// Break prose into pieces of at most `maxlen` characters, cutting just
/// after the latest delimiter seen, or mid-line when a single run has
/// no delimiter at all.
pub fn divide_text(text: &str, maxlen: usize, delimiters: &str) -> Vec<String> {
    assert!(maxlen > 0, "cannot divide into zero-length pieces");

    let mut pieces = Vec::new();
    let mut begin = 0usize; // byte offset of the current piece
    let mut count = 0usize; // chars accumulated since `begin`
    let mut last_sep = 0usize; // byte offset just after the last delimiter

    for (idx, ch) in text.char_indices() {
        count += 1;
        if count > maxlen {
            let cut = if last_sep > begin { last_sep } else { idx };
            pieces.push(text[begin..cut].to_string());
            begin = cut;
            count = text[begin..idx + ch.len_utf8()].chars().count();
        }
        if delimiters.contains(ch) {
            last_sep = idx + ch.len_utf8();
        }
    }

    if begin < text.len() {
        pieces.push(text[begin..].to_string());
    }

    pieces
}

/// Whether a unit must not be merged with its neighbors.
fn is_rich(unit: &TransportUnit) -> bool {
    match unit {
        TransportUnit::Attachment { .. } | TransportUnit::Notice(_) => true,
        TransportUnit::Content(text) => text.starts_with("```"),
    }
}

/// Greedily re-merge consecutive plain-text units into batches whose
/// joined length stays within `limit`.
fn consolidate(units: Vec<TransportUnit>, limit: usize) -> Vec<TransportUnit> {
    let mut results = Vec::new();
    let mut batch: Vec<String> = Vec::new();
    let mut batch_len = 0usize;

    let flush = |batch: &mut Vec<String>, batch_len: &mut usize, out: &mut Vec<TransportUnit>| {
        if !batch.is_empty() {
            out.push(TransportUnit::Content(batch.join("\n")));
            batch.clear();
            *batch_len = 0;
        }
    };

    for unit in units {
        if is_rich(&unit) {
            flush(&mut batch, &mut batch_len, &mut results);
            results.push(unit);
            continue;
        }
        let TransportUnit::Content(text) = unit else {
            continue;
        };
        let chars = text.chars().count();
        let joined = if batch.is_empty() { chars } else { batch_len + 1 + chars };
        if !batch.is_empty() && joined > limit {
            flush(&mut batch, &mut batch_len, &mut results);
            batch_len = chars;
        } else {
            batch_len = joined;
        }
        batch.push(text);
    }
    flush(&mut batch, &mut batch_len, &mut results);

    results
}

/// Convert completion text into an ordered sequence of transport units.
///
/// Code blocks become individual units; code blocks too long for one
/// message become attachments named `code.<lang>`. Everything else is
/// split at line/sentence boundaries and re-merged up to `limit`.
pub fn chunk_markdown(text: &str, limit: usize) -> Vec<TransportUnit> {
    let mut units: Vec<TransportUnit> = Vec::new();

    for block in block_split(text) {
        if let Some(lang) = &block.fence {
            if block.text.chars().count() > limit {
                let name = if lang.is_empty() {
                    "code.txt".to_string()
                } else {
                    format!("code.{}", lang)
                };
                units.push(TransportUnit::attachment(
                    name,
                    fence_inner(block.text).as_bytes().to_vec(),
                ));
            } else {
                units.push(TransportUnit::content(block.text));
            }
            continue;
        }

        for piece in divide_text(block.text, limit, SENTENCE_DELIMITERS) {
            let piece = piece.trim();
            if !piece.is_empty() {
                units.push(TransportUnit::content(piece));
            }
        }
    }

    consolidate(units, limit)
}

/// Chunk with the default transport ceiling.
pub fn chunk_message(text: &str) -> Vec<TransportUnit> {
    chunk_markdown(text, MAX_MESSAGE_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_units() {
        assert!(chunk_message("").is_empty());
    }

    #[test]
    fn short_text_is_one_unit() {
        let units = chunk_message("Hello there.");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].as_content(), Some("Hello there."));
    }

    #[test]
    fn single_block_at_limit_is_not_split() {
        let text = "a".repeat(MAX_MESSAGE_LENGTH);
        let units = chunk_message(&text);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].as_content(), Some(text.as_str()));
    }

    #[test]
    fn long_paragraph_divides_into_bounded_units() {
        let text = "a".repeat(5000);
        let units = chunk_message(&text);
        assert_eq!(units.len(), 3); // ceil(5000 / 1996)
        for unit in &units {
            let content = unit.as_content().expect("all plain");
            assert!(!content.is_empty());
            assert!(content.chars().count() <= MAX_MESSAGE_LENGTH);
        }
    }

    #[test]
    fn divide_prefers_sentence_boundaries() {
        let text = "First sentence. Second sentence.";
        let pieces = divide_text(text, 20, SENTENCE_DELIMITERS);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0], "First sentence.");
        assert_eq!(pieces[1], " Second sentence.");
    }

    #[test]
    fn divide_prefers_newlines() {
        let text = "line one\nline two\nline three";
        let pieces = divide_text(text, 12, SENTENCE_DELIMITERS);
        assert!(pieces.iter().all(|p| p.chars().count() <= 12));
        assert_eq!(pieces.join(""), text);
    }

    #[test]
    fn short_code_fence_is_an_atomic_unit() {
        let text = "Before.\n\n```rust\nfn main() {}\n```\n\nAfter.";
        let units = chunk_message(text);
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].as_content(), Some("Before."));
        assert!(units[1].as_content().unwrap().starts_with("```rust"));
        assert_eq!(units[2].as_content(), Some("After."));
    }

    #[test]
    fn oversized_code_fence_becomes_attachment() {
        let body = "x();\n".repeat(600); // 3000 chars
        let text = format!("```python\n{}```", body);
        let units = chunk_message(&text);
        assert_eq!(units.len(), 1);
        match &units[0] {
            TransportUnit::Attachment { name, data } => {
                assert_eq!(name, "code.python");
                assert_eq!(std::str::from_utf8(data).unwrap().trim_end(), body.trim_end());
            }
            _ => panic!("expected attachment"),
        }
    }

    #[test]
    fn no_oversized_fence_ever_inlined() {
        let text = format!("```\n{}\n```", "y".repeat(4000));
        for unit in chunk_message(&text) {
            if let Some(content) = unit.as_content() {
                assert!(content.chars().count() <= MAX_MESSAGE_LENGTH);
            }
        }
    }

    #[test]
    fn adjacent_paragraphs_merge_up_to_limit() {
        let text = "One.\n\nTwo.\n\nThree.";
        let units = chunk_message(text);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].as_content(), Some("One.\nTwo.\nThree."));
    }

    #[test]
    fn merge_never_crosses_a_fence() {
        let text = "One.\n\n```\ncode\n```\n\nTwo.";
        let units = chunk_message(text);
        assert_eq!(units.len(), 3);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = format!("Intro.\n\n{}\n\n```js\nlet x = 1;\n```", "b".repeat(2500));
        assert_eq!(chunk_message(&text), chunk_message(&text));
    }

    #[test]
    fn round_trips_text_modulo_whitespace() {
        let text = "Alpha beta.\n\nGamma delta!\n\nEpsilon?";
        let units = chunk_message(text);
        let rejoined: String = units
            .iter()
            .filter_map(|u| u.as_content())
            .collect::<Vec<_>>()
            .join("\n");
        let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(normalize(&rejoined), normalize(text));
    }
}
