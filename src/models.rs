//! Core data models used throughout neurorag.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the ingestion and question-answering pipeline.

use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Provenance carried by every document and every chunk cut from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    /// Path of the input file, as discovered under the data directory.
    pub source_path: String,
    /// 1-based page number for paginated formats (PDF); `None` otherwise.
    pub page_number: Option<u32>,
}

impl DocumentMetadata {
    pub fn new(source_path: impl Into<String>, page_number: Option<u32>) -> Self {
        Self {
            source_path: source_path.into(),
            page_number,
        }
    }

    /// File name component of `source_path`, used when citing sources.
    pub fn file_name(&self) -> String {
        Path::new(&self.source_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source_path.clone())
    }
}

/// Input format a document was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Pdf,
    Markdown,
    Text,
    Csv,
    Spreadsheet,
}

/// Raw text extracted from one input file (or one page of a PDF).
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
    pub kind: ContentKind,
}

/// A bounded window of a [`SourceDocument`]'s text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Deterministic identifier derived from provenance and position.
    pub id: String,
    /// Position of this chunk within its parent document, starting at 0.
    pub chunk_index: usize,
    /// Character offset of the chunk's first character in the parent text.
    pub start_char: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    pub metadata: DocumentMetadata,
}

/// One ranked entry of a [`RetrievalResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine distance to the query vector (`0.0` = identical direction).
    pub distance: f32,
}

/// Ordered nearest-first hits for a single query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub query: String,
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Provenance of every hit, in rank order.
    pub fn sources(&self) -> Vec<SourceRef> {
        self.hits
            .iter()
            .map(|h| SourceRef::from(&h.chunk.metadata))
            .collect()
    }
}

/// A cited source shown next to an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub source_path: String,
    pub page_number: Option<u32>,
}

impl From<&DocumentMetadata> for SourceRef {
    fn from(meta: &DocumentMetadata) -> Self {
        Self {
            source_path: meta.source_path.clone(),
            page_number: meta.page_number,
        }
    }
}

impl SourceRef {
    pub fn file_name(&self) -> String {
        Path::new(&self.source_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source_path.clone())
    }

    pub fn page_label(&self) -> String {
        self.page_number
            .map(|p| p.to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page {} from {}", self.page_label(), self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ref_display_uses_file_name_and_page() {
        let meta = DocumentMetadata::new("data/manual.pdf", Some(4));
        assert_eq!(SourceRef::from(&meta).to_string(), "Page 4 from manual.pdf");
    }

    #[test]
    fn source_ref_without_page_prints_na() {
        let meta = DocumentMetadata::new("data/notes.md", None);
        assert_eq!(SourceRef::from(&meta).to_string(), "Page N/A from notes.md");
    }
}
