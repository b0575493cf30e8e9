//! Append-only CSV log of answered questions, one file per user per day.
//!
//! Rows are `[user, timestamp, "Q: ...\nA: ...", "file (Page N); ..."]`
//! written to `{dir}/chat_{user}_{YYYY-MM-DD}.csv`.

use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};
use crate::models::SourceRef;

#[derive(Debug, Clone)]
pub struct ChatLog {
    dir: PathBuf,
}

impl ChatLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the log file for `user` on the date of `at`.
    pub fn file_for(&self, user: &str, at: &DateTime<Local>) -> PathBuf {
        self.dir.join(format!(
            "chat_{}_{}.csv",
            sanitize_user(user),
            at.format("%Y-%m-%d")
        ))
    }

    /// Append one exchange, stamped with the current local time.
    pub fn record(&self, user: &str, question: &str, answer: &str, sources: &[SourceRef]) -> Result<PathBuf> {
        self.record_at(user, question, answer, sources, Local::now())
    }

    pub fn record_at(
        &self,
        user: &str,
        question: &str,
        answer: &str,
        sources: &[SourceRef],
        at: DateTime<Local>,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.file_for(user, &at);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record([
                user.to_string(),
                at.to_rfc3339(),
                format!("Q: {}\nA: {}", question, answer),
                source_list(sources),
            ])
            .map_err(|e| csv_error(&path, e))?;
        writer.flush()?;

        Ok(path)
    }
}

/// `"a.pdf (Page 2); notes.md (Page N/A)"`
pub fn source_list(sources: &[SourceRef]) -> String {
    sources
        .iter()
        .map(|s| format!("{} (Page {})", s.file_name(), s.page_label()))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Keep user names from escaping the log directory.
fn sanitize_user(user: &str) -> String {
    user.trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn csv_error(path: &Path, err: csv::Error) -> RagError {
    RagError::Io(std::io::Error::other(format!(
        "failed to write chat log {}: {}",
        path.display(),
        err
    )))
}
