//! Sentence-based chunking engine.
//!
//! Splits raw text into bounded, overlapping chunks suitable for embedding:
//!
//! - Sentences are detected on terminal punctuation (`.`, `!`, `?`) followed by
//!   whitespace and accumulated into a chunk until the target size would be
//!   exceeded; the next chunk is seeded with the last sentence of the previous
//!   one so retrieval keeps boundary context.
//! - Sentences longer than the target size fall back to word-level splitting
//!   with a trailing three-word overlap between pieces.
//! - A single word longer than the target size is emitted verbatim as its own
//!   chunk rather than being truncated.
//!
//! The function is deterministic, total, and has no external dependencies, so
//! it is unit-testable in isolation.

/// Number of trailing words carried over between word-level pieces.
const WORD_OVERLAP: usize = 3;

/// Split `text` into ordered chunks of at most `target_size` characters.
///
/// `overlap_hint` controls whether boundary overlap is applied at all: a value
/// of zero disables the sentence/word carry-over, any positive value enables
/// it. The overlap unit itself is structural (one sentence, or three words in
/// the word-level fallback), not a character count.
///
/// Whitespace-only sentences are dropped and no returned chunk is empty.
pub fn split_into_chunks(text: &str, target_size: usize, overlap_hint: usize) -> Vec<String> {
    let target_size = target_size.max(1);
    let overlap = overlap_hint > 0;

    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0usize;

    for sentence in split_sentences(text) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        let sentence_size = sentence.len();

        if sentence_size > target_size {
            if !current.is_empty() {
                chunks.push(current.join(" "));
                current.clear();
                current_size = 0;
            }
            split_long_sentence(sentence, target_size, overlap, &mut chunks);
            continue;
        }

        if current_size + sentence_size + 1 > target_size {
            if current.is_empty() {
                chunks.push(sentence.to_string());
            } else {
                chunks.push(current.join(" "));
                // Seed the next chunk with the previous tail sentence.
                let tail = if overlap { current.last().copied() } else { None };
                current.clear();
                if let Some(tail) = tail {
                    current.push(tail);
                }
                current.push(sentence);
                current_size = current.iter().map(|s| s.len() + 1).sum();
            }
        } else {
            current.push(sentence);
            current_size += sentence_size + 1;
        }
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

/// Word-level fallback for sentences that exceed the chunk budget.
fn split_long_sentence(
    sentence: &str,
    target_size: usize,
    overlap: bool,
    chunks: &mut Vec<String>,
) {
    let mut piece: Vec<&str> = Vec::new();
    let mut piece_size = 0usize;

    for word in sentence.split_whitespace() {
        let word_size = word.len() + 1;
        if piece_size + word_size > target_size {
            if piece.is_empty() {
                // A single word longer than the budget is emitted verbatim.
                chunks.push(word.to_string());
                piece_size = 0;
            } else {
                chunks.push(piece.join(" "));
                let keep = if overlap {
                    piece.len().saturating_sub(WORD_OVERLAP)
                } else {
                    piece.len()
                };
                piece.drain(..keep);
                piece.push(word);
                piece_size = piece.iter().map(|w| w.len() + 1).sum();
            }
        } else {
            piece.push(word);
            piece_size += word_size;
        }
    }

    if !piece.is_empty() {
        chunks.push(piece.join(" "));
    }
}

/// Split text into sentence-like units on terminal punctuation followed by
/// whitespace. The punctuation stays attached to its sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?') {
            let boundary = chars
                .peek()
                .map(|(_, next)| next.is_whitespace())
                .unwrap_or(false);
            if boundary {
                let end = idx + ch.len_utf8();
                sentences.push(&text[start..end]);
                start = end;
            }
        }
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_sentences_share_one_chunk() {
        let chunks = split_into_chunks("A short sentence. Another short one.", 1000, 200);
        assert_eq!(chunks, vec!["A short sentence. Another short one."]);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split_into_chunks("", 1000, 200).is_empty());
        assert!(split_into_chunks("   \n\t  ", 1000, 200).is_empty());
    }

    #[test]
    fn chunks_respect_target_size_without_overlap() {
        let text = "One two. Three four. Five six. Seven eight.";
        let chunks = split_into_chunks(text, 20, 0);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.len() <= 20, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn consecutive_chunks_share_the_boundary_sentence() {
        let text = "First sentence here. Second sentence here. Third sentence here.";
        let chunks = split_into_chunks(text, 45, 200);
        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            let last_sentence = split_sentences(&pair[0])
                .last()
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            assert!(
                pair[1].starts_with(&last_sentence),
                "expected {:?} to start with {:?}",
                pair[1],
                last_sentence
            );
        }
    }

    #[test]
    fn long_sentence_falls_back_to_words_with_three_word_overlap() {
        let words: Vec<String> = (0..30).map(|i| format!("word{i:02}")).collect();
        let sentence = words.join(" ");
        let chunks = split_into_chunks(&sentence, 50, 200);
        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            let tail: Vec<&str> = pair[0].split_whitespace().rev().take(3).collect();
            let head: Vec<&str> = pair[1].split_whitespace().take(3).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            assert_eq!(tail, head, "pieces {:?} / {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn oversized_word_is_emitted_verbatim() {
        let giant = "x".repeat(64);
        let text = format!("small {giant} words");
        let chunks = split_into_chunks(&text, 16, 0);
        assert!(chunks.iter().any(|chunk| chunk == &giant));
    }

    #[test]
    fn no_content_is_lost_modulo_whitespace() {
        let text = "Alpha beta gamma. Delta epsilon zeta! Eta theta iota? Kappa lambda.";
        let chunks = split_into_chunks(text, 30, 0);
        let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn output_order_matches_input_order() {
        let text = "First one here. Second one here. Third one here. Fourth one here.";
        let chunks = split_into_chunks(text, 34, 0);
        let mut positions = Vec::new();
        for chunk in &chunks {
            let first_word = chunk.split_whitespace().next().unwrap();
            positions.push(text.find(first_word).unwrap());
        }
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }
}
