//! TOML configuration parsing and validation.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration. Validation runs once in [`load_config`] (or
//! [`Config::validate`] for configs built in code) and reports problems as
//! [`RagError::Config`].

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// What the loader does when a recognized file fails to parse.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    /// Stop the whole build with the first `LoadError`.
    #[default]
    Abort,
    /// Log a warning, record the failure, and continue with the next file.
    Skip,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub on_error: LoadPolicy,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            recursive: false,
            exclude_globs: Vec::new(),
            on_error: LoadPolicy::Abort,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    /// Opt-in to loading the persisted index without `--trust-index`.
    #[serde(default)]
    pub trust_artifact: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            trust_artifact: false,
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("vectorstore/db_index")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for remote providers (OpenAI-compatible or Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_base_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Environment variable holding the credential. Defaults per provider.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key_env: None,
            base_url: None,
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    512
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_llm_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            dir: default_log_dir(),
        }
    }
}

fn default_log_enabled() -> bool {
    true
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

impl Config {
    /// Check cross-field constraints. Called by [`load_config`].
    pub fn validate(&self) -> Result<()> {
        validate_chunking(self.chunking.chunk_size, self.chunking.chunk_overlap)?;

        if self.retrieval.top_k == 0 {
            return Err(RagError::Config("retrieval.top_k must be >= 1".into()));
        }

        match self.embedding.provider.as_str() {
            "local" | "openai" | "ollama" | "hash" => {}
            other => {
                return Err(RagError::Config(format!(
                    "unknown embedding provider: '{}'. Must be local, openai, ollama, or hash.",
                    other
                )))
            }
        }
        if self.embedding.dims == Some(0) {
            return Err(RagError::Config("embedding.dims must be > 0".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(RagError::Config("embedding.batch_size must be > 0".into()));
        }
        if matches!(self.embedding.provider.as_str(), "openai" | "ollama")
            && (self.embedding.model.is_none() || self.embedding.dims.is_none())
        {
            return Err(RagError::Config(format!(
                "embedding.model and embedding.dims must be set when provider is '{}'",
                self.embedding.provider
            )));
        }

        match self.llm.provider.as_str() {
            "openai" | "huggingface" => {}
            other => {
                return Err(RagError::Config(format!(
                    "unknown llm provider: '{}'. Must be openai or huggingface.",
                    other
                )))
            }
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(RagError::Config(
                "llm.temperature must be in [0.0, 2.0]".into(),
            ));
        }

        Ok(())
    }
}

/// Reject chunking parameters that cannot produce forward progress.
pub fn validate_chunking(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::Config("chunking.chunk_size must be > 0".into()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::Config(format!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            chunk_overlap, chunk_size
        )));
    }
    Ok(())
}

/// Read, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RagError::Config(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .map_err(|e| RagError::Config(format!("failed to parse config file: {}", e)))?;
    config.validate()?;
    Ok(config)
}
