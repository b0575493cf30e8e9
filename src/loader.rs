//! Document loader: turns a directory of files into [`SourceDocument`]s.
//!
//! Recognized extensions (case-insensitive): `.pdf` (one document per page),
//! `.md`, `.txt`, `.csv`, and `.xlsx`. Anything else is skipped and listed in
//! the [`LoadReport`]. Files are visited in sorted path order so repeated
//! loads of the same directory produce the same sequence.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{DataConfig, LoadPolicy};
use crate::error::{RagError, Result};
use crate::extract;
use crate::models::{ContentKind, DocumentMetadata, SourceDocument};

/// Outcome of loading one directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<SourceDocument>,
    /// Files whose extension is not recognized.
    pub skipped: Vec<PathBuf>,
    /// Files that failed to parse under [`LoadPolicy::Skip`].
    pub failed: Vec<(PathBuf, String)>,
}

/// Options controlling a directory scan.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub recursive: bool,
    pub exclude_globs: Vec<String>,
    pub on_error: LoadPolicy,
}

impl From<&DataConfig> for LoadOptions {
    fn from(cfg: &DataConfig) -> Self {
        Self {
            recursive: cfg.recursive,
            exclude_globs: cfg.exclude_globs.clone(),
            on_error: cfg.on_error,
        }
    }
}

/// Map a file extension to the format it is loaded as.
pub fn kind_for_path(path: &Path) -> Option<ContentKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(ContentKind::Pdf),
        "md" => Some(ContentKind::Markdown),
        "txt" => Some(ContentKind::Text),
        "csv" => Some(ContentKind::Csv),
        "xlsx" => Some(ContentKind::Spreadsheet),
        _ => None,
    }
}

/// Load every recognized file under `root`.
pub fn load_directory(root: &Path, options: &LoadOptions) -> Result<LoadReport> {
    if !root.is_dir() {
        return Err(RagError::load(root, "data directory does not exist"));
    }

    let exclude_set = build_globset(&options.exclude_globs)?;
    let max_depth = if options.recursive { usize::MAX } else { 1 };

    let mut paths = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(max_depth) {
        let entry = entry.map_err(|e| RagError::load(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if exclude_set.is_match(relative) {
            tracing::debug!(path = %entry.path().display(), "excluded by glob");
            continue;
        }
        paths.push(entry.into_path());
    }
    paths.sort();

    let mut report = LoadReport::default();
    for path in paths {
        let Some(kind) = kind_for_path(&path) else {
            tracing::info!(path = %path.display(), "skipping unsupported file type");
            report.skipped.push(path);
            continue;
        };

        match load_file(&path, kind) {
            Ok(docs) => report.documents.extend(docs),
            Err(err) => match options.on_error {
                LoadPolicy::Abort => return Err(err),
                LoadPolicy::Skip => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable file");
                    report.failed.push((path, err.to_string()));
                }
            },
        }
    }

    Ok(report)
}

/// Load one file. PDFs yield one document per non-blank page; other formats
/// yield at most one document. Whitespace-only text yields nothing.
pub fn load_file(path: &Path, kind: ContentKind) -> Result<Vec<SourceDocument>> {
    let bytes = std::fs::read(path).map_err(|e| RagError::load(path, e))?;
    let source_path = path.to_string_lossy().to_string();

    let pages: Vec<(Option<u32>, String)> = match kind {
        ContentKind::Pdf => extract::extract_pdf_pages(&bytes)
            .map_err(|e| RagError::load(path, e))?
            .into_iter()
            .enumerate()
            .map(|(i, text)| (Some(i as u32 + 1), text))
            .collect(),
        ContentKind::Markdown | ContentKind::Text => {
            vec![(None, extract::decode_text(&bytes).map_err(|e| RagError::load(path, e))?)]
        }
        ContentKind::Csv => {
            vec![(None, extract::csv_to_markdown(&bytes).map_err(|e| RagError::load(path, e))?)]
        }
        ContentKind::Spreadsheet => {
            vec![(None, extract::xlsx_to_markdown(&bytes).map_err(|e| RagError::load(path, e))?)]
        }
    };

    let mut docs = Vec::with_capacity(pages.len());
    for (page_number, text) in pages {
        if text.trim().is_empty() {
            tracing::debug!(path = %source_path, ?page_number, "dropping blank document");
            continue;
        }
        docs.push(SourceDocument {
            text,
            metadata: DocumentMetadata::new(source_path.clone(), page_number),
            kind,
        });
    }
    Ok(docs)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RagError::Config(format!("invalid exclude glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::Config(format!("invalid exclude globs: {}", e)))
}
