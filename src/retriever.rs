//! Query-time retrieval: embed the question, ask the index for neighbors.

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::index::{ArtifactTrust, VectorIndex};
use crate::models::RetrievalResult;

/// Pairs a loaded index with the embedding provider it was built with.
///
/// The index is read-only and shared behind an `Arc`, so one retriever can
/// serve concurrent requests.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    default_k: usize,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("model", &self.provider.model_name())
            .field("dims", &self.provider.dims())
            .field("chunks", &self.index.len())
            .field("default_k", &self.default_k)
            .finish()
    }
}

impl Retriever {
    /// Wrap an index. Fails with [`RagError::IndexMismatch`] if the index was
    /// built with a different model or dimensionality than `provider`.
    pub fn new(
        index: Arc<VectorIndex>,
        provider: Arc<dyn EmbeddingProvider>,
        default_k: usize,
    ) -> Result<Self> {
        let meta = index.meta();
        if meta.model != provider.model_name() || meta.dims != provider.dims() {
            return Err(RagError::IndexMismatch {
                index_model: meta.model.clone(),
                index_dims: meta.dims,
                active_model: provider.model_name().to_string(),
                active_dims: provider.dims(),
            });
        }
        if default_k == 0 {
            return Err(RagError::Config("retrieval.top_k must be at least 1".into()));
        }
        Ok(Self {
            index,
            provider,
            default_k,
        })
    }

    /// Load the index at `dir` for `provider`.
    pub async fn open(
        dir: &Path,
        provider: Arc<dyn EmbeddingProvider>,
        default_k: usize,
        trust: ArtifactTrust,
    ) -> Result<Self> {
        let index = VectorIndex::load(dir, provider.model_name(), provider.dims(), trust).await?;
        Self::new(Arc::new(index), provider, default_k)
    }

    /// Load the configured index with the configured provider.
    pub async fn from_config(config: &Config, trust: ArtifactTrust) -> Result<Self> {
        let provider = embedding::create_provider(&config.embedding)?;
        Self::open(&config.index.path, provider, config.retrieval.top_k, trust).await
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    /// Return at most `k` (default: the configured top-K) chunks nearest to
    /// `query`. A blank query returns an empty result.
    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Result<RetrievalResult> {
        let k = k.unwrap_or(self.default_k);
        if query.trim().is_empty() || k == 0 {
            return Ok(RetrievalResult {
                query: query.to_string(),
                hits: Vec::new(),
            });
        }

        let vector = embedding::embed_query(self.provider.as_ref(), query).await?;
        let hits = self.index.query(&vector, k)?;
        tracing::debug!(k, hits = hits.len(), "retrieved context");

        Ok(RetrievalResult {
            query: query.to_string(),
            hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunker;
    use crate::embedding::HashProvider;
    use crate::models::{ContentKind, DocumentMetadata, SourceDocument};

    async fn retriever() -> Retriever {
        let provider = Arc::new(HashProvider::new(128));
        let docs = vec![
            SourceDocument {
                text: "The warranty covers parts and labour for two years.".into(),
                metadata: DocumentMetadata::new("data/warranty.md", None),
                kind: ContentKind::Markdown,
            },
            SourceDocument {
                text: "Returns are accepted within thirty days of purchase.".into(),
                metadata: DocumentMetadata::new("data/returns.txt", None),
                kind: ContentKind::Text,
            },
        ];
        let chunks = Chunker::new(200, 20).unwrap().chunk_documents(&docs);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = provider.embed(&texts).await.unwrap();
        let index = VectorIndex::build(chunks, vectors, HashProvider::MODEL_NAME, 128).unwrap();
        Retriever::new(Arc::new(index), provider, 3).unwrap()
    }

    #[tokio::test]
    async fn blank_query_returns_nothing() {
        let r = retriever().await;
        assert!(r.retrieve("   ", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn relevant_chunk_ranks_first() {
        let r = retriever().await;
        let result = r.retrieve("how long is the warranty", Some(1)).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.hits[0].chunk.metadata.source_path, "data/warranty.md");
    }

    #[tokio::test]
    async fn provider_mismatch_is_rejected() {
        let r = retriever().await;
        let other = Arc::new(HashProvider::new(64));
        let err = Retriever::new(Arc::new(r.index().clone()), other, 3).unwrap_err();
        assert!(matches!(err, RagError::IndexMismatch { .. }));
    }

    #[tokio::test]
    async fn debug_output_names_model_and_size() {
        let r = retriever().await;
        let shown = format!("{:?}", r);
        assert!(shown.contains(HashProvider::MODEL_NAME));
        assert!(shown.contains(&format!("chunks: {}", r.index().len())));
    }
}
