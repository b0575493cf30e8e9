//! Separator-aware sliding-window text chunker.
//!
//! Splits each [`SourceDocument`] into [`Chunk`]s of at most `chunk_size`
//! characters. Consecutive chunks of the same document share exactly
//! `chunk_overlap` characters, so context at a boundary is never lost.
//!
//! # Algorithm
//!
//! 1. A document no longer than `chunk_size` becomes a single chunk.
//! 2. Otherwise, a window of `chunk_size` characters is opened at `start`.
//! 3. The window is cut at the last occurrence of the highest-priority
//!    separator it contains (paragraph break, line break, sentence end,
//!    clause end, space), as long as the cut leaves room to advance past the
//!    overlap. Without a usable separator the window is cut at `chunk_size`
//!    characters.
//! 4. The next window starts `chunk_overlap` characters before the cut.
//!    For separator-free text this is a stride of `chunk_size - chunk_overlap`.
//! 5. The window that reaches the end of the text is the last chunk.
//!
//! Lengths and offsets are counted in `char`s, never bytes, so multi-byte
//! text is never split inside a code point.
//!
//! # Example
//!
//! ```rust
//! use neurorag::chunk::Chunker;
//!
//! let chunker = Chunker::new(500, 100).unwrap();
//! let text = "x".repeat(1200);
//! let lens: Vec<usize> = chunker
//!     .split_text(&text)
//!     .iter()
//!     .map(|(_, t)| t.chars().count())
//!     .collect();
//! assert_eq!(lens, vec![500, 500, 400]);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::{validate_chunking, ChunkingConfig};
use crate::error::Result;
use crate::models::{Chunk, DocumentMetadata, SourceDocument};

/// Cut points in priority order.
pub const SEPARATORS: [&str; 8] = ["\n\n", "\n", ". ", "? ", "! ", "; ", ", ", " "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Create a chunker. Fails with `ConfigError` unless
    /// `0 <= chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_chunking(chunk_size, chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Chunk every document, preserving document order.
    pub fn chunk_documents(&self, documents: &[SourceDocument]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| self.chunk_document(doc))
            .collect()
    }

    /// Chunk one document. Each chunk copies the document's metadata.
    pub fn chunk_document(&self, document: &SourceDocument) -> Vec<Chunk> {
        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(index, (start_char, text))| {
                make_chunk(&document.metadata, index, start_char, text)
            })
            .collect()
    }

    /// Split raw text into `(start_char, text)` windows.
    ///
    /// Whitespace-only text yields no windows.
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let n = chars.len();
        if n <= self.chunk_size {
            return vec![(0, text.to_string())];
        }

        let mut windows = Vec::new();
        let mut start = 0;
        loop {
            let hard_end = (start + self.chunk_size).min(n);
            if hard_end == n {
                windows.push((start, chars[start..n].iter().collect()));
                break;
            }
            let end = self.find_cut(&chars, start, hard_end);
            windows.push((start, chars[start..end].iter().collect()));
            start = end - self.chunk_overlap;
        }
        windows
    }

    /// Pick the end of the window `[start, hard_end)`.
    ///
    /// Any cut must lie strictly beyond `start + chunk_overlap`, otherwise the
    /// next window would not advance.
    fn find_cut(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let min_end = start + self.chunk_overlap + 1;
        for sep in SEPARATORS {
            let sep: Vec<char> = sep.chars().collect();
            let found = (min_end.max(start + sep.len())..=hard_end)
                .rev()
                .find(|&end| chars[end - sep.len()..end] == sep[..]);
            if let Some(end) = found {
                return end;
            }
        }
        hard_end
    }
}

fn make_chunk(meta: &DocumentMetadata, index: usize, start_char: usize, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let key = format!(
        "{}#{}:{}",
        meta.source_path,
        meta.page_number.unwrap_or(0),
        index
    );

    Chunk {
        id: Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string(),
        chunk_index: index,
        start_char,
        text,
        hash,
        metadata: meta.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::models::ContentKind;

    fn doc(text: &str) -> SourceDocument {
        SourceDocument {
            text: text.to_string(),
            metadata: DocumentMetadata::new("data/doc.txt", None),
            kind: ContentKind::Text,
        }
    }

    fn lens(windows: &[(usize, String)]) -> Vec<usize> {
        windows.iter().map(|(_, t)| t.chars().count()).collect()
    }

    #[test]
    fn overlap_not_smaller_than_size_is_config_error() {
        assert!(matches!(Chunker::new(500, 500), Err(RagError::Config(_))));
        assert!(matches!(Chunker::new(10, 11), Err(RagError::Config(_))));
        assert!(matches!(Chunker::new(0, 0), Err(RagError::Config(_))));
    }

    #[test]
    fn short_document_single_chunk() {
        let chunker = Chunker::new(500, 100).unwrap();
        let chunks = chunker.chunk_document(&doc("Hello, world!"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn exact_size_document_single_chunk() {
        let chunker = Chunker::new(50, 10).unwrap();
        assert_eq!(chunker.split_text(&"a".repeat(50)).len(), 1);
    }

    #[test]
    fn blank_document_yields_nothing() {
        let chunker = Chunker::new(50, 10).unwrap();
        assert!(chunker.split_text("").is_empty());
        assert!(chunker.split_text(" \n\n\t").is_empty());
    }

    #[test]
    fn separator_free_text_uses_fixed_stride() {
        let chunker = Chunker::new(500, 100).unwrap();
        let windows = chunker.split_text(&"abcdefghij".repeat(120));
        assert_eq!(lens(&windows), vec![500, 500, 400]);
        let starts: Vec<usize> = windows.iter().map(|(s, _)| *s).collect();
        assert_eq!(starts, vec![0, 400, 800]);
    }

    #[test]
    fn prefers_paragraph_break_over_line_break() {
        let chunker = Chunker::new(40, 5).unwrap();
        let text = "first paragraph here\n\nsecond one\nstill second and longer text";
        let windows = chunker.split_text(text);
        assert!(windows[0].1.ends_with("\n\n"));
        assert_eq!(windows[0].1, "first paragraph here\n\n");
    }

    #[test]
    fn falls_back_to_spaces_inside_long_paragraph() {
        let chunker = Chunker::new(20, 4).unwrap();
        let windows = chunker.split_text("alpha beta gamma delta epsilon zeta eta theta");
        assert!(windows[0].1.ends_with(' '));
        assert!(windows.iter().all(|(_, t)| t.chars().count() <= 20));
    }

    #[test]
    fn consecutive_chunks_share_exact_overlap() {
        let chunker = Chunker::new(30, 8).unwrap();
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(6);
        let windows = chunker.split_text(&text);
        assert!(windows.len() > 2);
        for pair in windows.windows(2) {
            let (s0, t0) = &pair[0];
            let (s1, t1) = &pair[1];
            assert_eq!(*s1, s0 + t0.chars().count() - 8);
            let tail: String = t0.chars().skip(t0.chars().count() - 8).collect();
            let head: String = t1.chars().take(8).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn multibyte_text_counts_chars() {
        let chunker = Chunker::new(10, 2).unwrap();
        let text = "日本語のテキストを分割するテストです";
        let windows = chunker.split_text(text);
        assert!(windows.iter().all(|(_, t)| t.chars().count() <= 10));
        assert_eq!(windows[0].1.chars().count(), 10);
    }

    #[test]
    fn chunks_carry_parent_metadata_and_stable_ids() {
        let chunker = Chunker::new(20, 5).unwrap();
        let mut d = doc(&"word ".repeat(20));
        d.metadata = DocumentMetadata::new("data/manual.pdf", Some(3));
        let a = chunker.chunk_document(&d);
        let b = chunker.chunk_document(&d);
        assert!(a.len() > 1);
        for (i, c) in a.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.metadata, d.metadata);
        }
        assert_eq!(a, b);
        assert_ne!(a[0].id, a[1].id);
    }
}
