//! Error types shared by every stage of the pipeline.
//!
//! Library functions return [`RagError`]; the `neurorag` binary wraps these
//! in `anyhow` at the command layer.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, indexing, retrieving, or answering.
#[derive(Debug, Error)]
pub enum RagError {
    /// A recognized file could not be parsed (corrupt PDF, undecodable text, …).
    #[error("failed to load {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// Invalid configuration, including invalid chunking parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// The persisted index was built with a different embedding model or dimension.
    #[error(
        "index mismatch: index was built with '{index_model}' ({index_dims} dims) \
         but the active embedding model is '{active_model}' ({active_dims} dims)"
    )]
    IndexMismatch {
        index_model: String,
        index_dims: usize,
        active_model: String,
        active_dims: usize,
    },

    /// The index is unavailable, empty, or malformed.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// The answer-generation call failed. `timed_out` is set when the
    /// model never answered in time, as opposed to answering with an error.
    #[error("answer synthesis failed: {message}")]
    Synthesis { message: String, timed_out: bool },

    /// The embedding call failed or timed out.
    #[error("embedding error ({provider}): {message}")]
    Embedding { provider: String, message: String },

    /// The caller did not opt in to trusting a persisted index.
    #[error(
        "refusing to load index at {0} without an explicit trust opt-in \
         (pass --trust-index or set index.trust_artifact = true)"
    )]
    UntrustedIndex(PathBuf),

    /// An index build was requested over zero chunks.
    #[error("cannot build an index from zero chunks")]
    EmptyCorpus,

    /// The index database could not be read or written.
    #[error("index storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub(crate) fn load(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        RagError::Load {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn synthesis(message: impl std::fmt::Display) -> Self {
        RagError::Synthesis {
            message: message.to_string(),
            timed_out: false,
        }
    }

    pub fn synthesis_timeout(message: impl std::fmt::Display) -> Self {
        RagError::Synthesis {
            message: message.to_string(),
            timed_out: true,
        }
    }

    pub(crate) fn embedding(provider: &str, message: impl std::fmt::Display) -> Self {
        RagError::Embedding {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        RagError::Storage(err.to_string())
    }
}

/// Convenience result alias for library code.
pub type Result<T> = std::result::Result<T, RagError>;
