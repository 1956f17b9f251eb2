//! Recursive character splitter.
//!
//! Text is cut on the coarsest separator that occurs in it (paragraphs, then
//! lines, then words, then characters). Pieces that are still longer than the
//! chunk size are split again with the next separator, and small neighbouring
//! pieces are merged back into chunks of at most `chunk_size` characters that
//! share up to `chunk_overlap` characters with their predecessor.

use serde::Serialize;

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// A contiguous span of extracted text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub text: String,
    /// File name of the document the chunk came from.
    pub source: String,
    /// Order of the chunk within its document.
    pub position: usize,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(1000, 100)
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Splits a document's text into ordered chunks tagged with `source`.
    pub fn split_document(&self, text: &str, source: &str) -> Vec<Chunk> {
        self.split_text(text)
            .into_iter()
            .enumerate()
            .map(|(position, text)| Chunk {
                text,
                source: source.to_string(),
                position,
            })
            .collect()
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut good: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge(&good));
                good.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, remaining));
            }
        }
        if !good.is_empty() {
            chunks.extend(self.merge(&good));
        }
        chunks
    }

    /// Greedily packs pieces into chunks, carrying a tail of the previous
    /// chunk forward as overlap.
    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &window.concat());
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    let first = window.remove(0);
                    total -= char_len(first);
                }
            }
            window.push(piece);
            total += len;
        }
        push_trimmed(&mut chunks, &window.concat());
        chunks
    }
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Splits on `separator`, attaching each separator to the piece that follows
/// it. An empty separator splits into single characters.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(text[start..idx].to_string());
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(text[start..].to_string());
    }
    pieces
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        let splitter = TextSplitter::default();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let splitter = TextSplitter::default();
        let chunks = splitter.split_document("A short paragraph.", "notes.pdf");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "A short paragraph.");
        assert_eq!(chunks[0].source, "notes.pdf");
        assert_eq!(chunks[0].position, 0);
    }

    #[test]
    fn test_separator_is_kept_with_following_piece() {
        assert_eq!(
            split_keeping_separator("a b c", " "),
            vec!["a".to_string(), " b".to_string(), " c".to_string()]
        );
        assert_eq!(
            split_keeping_separator("one\n\ntwo", "\n\n"),
            vec!["one".to_string(), "\n\ntwo".to_string()]
        );
        assert_eq!(split_keeping_separator("ab", "").len(), 2);
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let splitter = TextSplitter::new(50, 10);
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(20);
        let chunks = splitter.split_text(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50, "chunk too long: {:?}", chunk);
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let splitter = TextSplitter::new(30, 12);
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let chunks = splitter.split_text(text);

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split_whitespace().last().unwrap();
            assert!(
                pair[1].contains(last_word),
                "{:?} does not carry over from {:?}",
                pair[1],
                pair[0]
            );
        }
    }

    #[test]
    fn test_paragraphs_split_before_words() {
        let splitter = TextSplitter::new(40, 0);
        let text = "First paragraph is here.\n\nSecond paragraph follows it.";
        let chunks = splitter.split_text(text);
        assert_eq!(
            chunks,
            vec![
                "First paragraph is here.".to_string(),
                "Second paragraph follows it.".to_string()
            ]
        );
    }

    #[test]
    fn test_long_word_falls_back_to_characters() {
        let splitter = TextSplitter::new(10, 0);
        let chunks = splitter.split_text(&"x".repeat(25));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "x".repeat(10));
        assert_eq!(chunks[2], "x".repeat(5));
    }

    #[test]
    fn test_positions_are_sequential() {
        let splitter = TextSplitter::new(20, 5);
        let chunks = splitter.split_document(&"word ".repeat(40), "doc.pdf");
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.position, i);
        }
    }

    #[test]
    fn test_multibyte_text_is_counted_in_characters() {
        let splitter = TextSplitter::new(5, 0);
        let chunks = splitter.split_text("ééééééééé");
        assert_eq!(chunks, vec!["ééééé".to_string(), "éééé".to_string()]);
    }
}
