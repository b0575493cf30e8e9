//! Index build progress reporting.
//!
//! `neurorag build` reports what it is loading, chunking and embedding so a
//! long first build on a large folder is not silent. Progress goes to
//! **stderr**; stdout carries only the final summary.

use std::io::Write;

/// A single progress event during an index build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildProgressEvent {
    /// Documents extracted from the data directory.
    Loaded { documents: u64, skipped: u64 },
    /// Documents split into chunks.
    Chunked { chunks: u64 },
    /// `n` of `total` chunks embedded so far.
    Embedding { n: u64, total: u64 },
    /// Index written to its final location.
    Persisted { path: String },
}

/// Receives build progress. Implementations write to stderr (human or JSON).
pub trait BuildProgressReporter: Send + Sync {
    fn report(&self, event: BuildProgressEvent);
}

/// Human-friendly progress on stderr: "build  embedding  1,024 / 5,000 chunks".
pub struct StderrProgress;

impl BuildProgressReporter for StderrProgress {
    fn report(&self, event: BuildProgressEvent) {
        let line = match &event {
            BuildProgressEvent::Loaded { documents, skipped } => format!(
                "build  loaded  {} documents ({} files skipped)\n",
                format_number(*documents),
                format_number(*skipped)
            ),
            BuildProgressEvent::Chunked { chunks } => {
                format!("build  chunked  {} chunks\n", format_number(*chunks))
            }
            BuildProgressEvent::Embedding { n, total } => format!(
                "build  embedding  {} / {} chunks\n",
                format_number(*n),
                format_number(*total)
            ),
            BuildProgressEvent::Persisted { path } => format!("build  wrote  {}\n", path),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BuildProgressReporter for JsonProgress {
    fn report(&self, event: BuildProgressEvent) {
        if let Ok(line) = serde_json::to_string(&event_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

fn event_json(event: &BuildProgressEvent) -> serde_json::Value {
    match event {
        BuildProgressEvent::Loaded { documents, skipped } => serde_json::json!({
            "event": "progress",
            "phase": "loaded",
            "documents": documents,
            "skipped": skipped
        }),
        BuildProgressEvent::Chunked { chunks } => serde_json::json!({
            "event": "progress",
            "phase": "chunked",
            "chunks": chunks
        }),
        BuildProgressEvent::Embedding { n, total } => serde_json::json!({
            "event": "progress",
            "phase": "embedding",
            "n": n,
            "total": total
        }),
        BuildProgressEvent::Persisted { path } => serde_json::json!({
            "event": "progress",
            "phase": "persisted",
            "path": path
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BuildProgressReporter for NoProgress {
    fn report(&self, _event: BuildProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Parse a `--progress` value. `auto` picks human on a TTY, otherwise off.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(Self::default_for_tty()),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            "off" => Some(ProgressMode::Off),
            _ => None,
        }
    }

    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn BuildProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn progress_modes_parse() {
        assert_eq!(ProgressMode::parse("json"), Some(ProgressMode::Json));
        assert_eq!(ProgressMode::parse("off"), Some(ProgressMode::Off));
        assert_eq!(ProgressMode::parse("loud"), None);
    }

    #[test]
    fn embedding_event_json_shape() {
        let v = event_json(&BuildProgressEvent::Embedding { n: 64, total: 100 });
        assert_eq!(v["phase"], "embedding");
        assert_eq!(v["n"], 64);
        assert_eq!(v["total"], 100);
    }
}
