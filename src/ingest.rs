//! Index build orchestration.
//!
//! Coordinates the full build flow: loader → chunker → embedding → index
//! persistence. A build always starts from scratch; the previous index is
//! replaced only once the new one has been written completely.

use serde::Serialize;
use std::path::PathBuf;

use crate::chunk::Chunker;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::Result;
use crate::index::VectorIndex;
use crate::loader::{self, LoadOptions};
use crate::progress::{BuildProgressEvent, BuildProgressReporter};

/// What a build did, for the CLI summary.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub documents: usize,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    pub chunks: usize,
    pub model: String,
    pub dims: usize,
    pub index_path: PathBuf,
}

/// Load `config.data.dir`, chunk, embed with `provider`, and persist the
/// index to `config.index.path`.
pub async fn build_index(
    config: &Config,
    provider: &dyn EmbeddingProvider,
    progress: &dyn BuildProgressReporter,
) -> Result<BuildSummary> {
    let chunker = Chunker::from_config(&config.chunking)?;

    let report = loader::load_directory(&config.data.dir, &LoadOptions::from(&config.data))?;
    progress.report(BuildProgressEvent::Loaded {
        documents: report.documents.len() as u64,
        skipped: report.skipped.len() as u64,
    });
    tracing::info!(
        documents = report.documents.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "documents loaded"
    );

    let chunks = chunker.chunk_documents(&report.documents);
    progress.report(BuildProgressEvent::Chunked {
        chunks: chunks.len() as u64,
    });

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let total = texts.len() as u64;
    let vectors = if texts.is_empty() {
        Vec::new()
    } else {
        embedding::embed_in_batches(provider, &texts, config.embedding.batch_size, |n| {
            progress.report(BuildProgressEvent::Embedding {
                n: n as u64,
                total,
            })
        })
        .await?
    };

    let index = VectorIndex::build(chunks, vectors, provider.model_name(), provider.dims())?;
    index.persist(&config.index.path).await?;
    progress.report(BuildProgressEvent::Persisted {
        path: config.index.path.display().to_string(),
    });

    Ok(BuildSummary {
        documents: report.documents.len(),
        skipped: report.skipped,
        failed: report.failed,
        chunks: index.len(),
        model: index.meta().model.clone(),
        dims: index.meta().dims,
        index_path: config.index.path.clone(),
    })
}

/// Run a build with the configured provider and print a summary to stdout.
pub async fn run_build(config: &Config, progress: &dyn BuildProgressReporter) -> anyhow::Result<()> {
    let provider = embedding::create_provider(&config.embedding)?;
    let summary = build_index(config, provider.as_ref(), progress).await?;

    println!("build {}", config.data.dir.display());
    println!("  documents: {}", summary.documents);
    println!("  skipped files: {}", summary.skipped.len());
    for path in &summary.skipped {
        println!("    {}", path.display());
    }
    if !summary.failed.is_empty() {
        println!("  failed files: {}", summary.failed.len());
        for (path, err) in &summary.failed {
            println!("    {}: {}", path.display(), err);
        }
    }
    println!("  chunks: {}", summary.chunks);
    println!("  model: {} ({} dims)", summary.model, summary.dims);
    println!("  index: {}", summary.index_path.display());
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashProvider;
    use crate::error::RagError;
    use crate::index::ArtifactTrust;
    use crate::progress::NoProgress;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn config_for(tmp: &TempDir) -> Config {
        let mut config = Config::default();
        config.data.dir = tmp.path().join("data");
        config.index.path = tmp.path().join("index");
        config.embedding.provider = "hash".into();
        config.embedding.batch_size = 2;
        config
    }

    struct Recorder(Mutex<Vec<BuildProgressEvent>>);

    impl BuildProgressReporter for Recorder {
        fn report(&self, event: BuildProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn build_writes_loadable_index_and_reports_progress() {
        let tmp = TempDir::new().unwrap();
        let config = config_for(&tmp);
        std::fs::create_dir_all(&config.data.dir).unwrap();
        std::fs::write(config.data.dir.join("a.md"), "# Alpha\n\nFirst file.").unwrap();
        std::fs::write(config.data.dir.join("b.txt"), "Second file.").unwrap();
        std::fs::write(config.data.dir.join("c.bin"), [0u8, 1, 2]).unwrap();

        let provider = HashProvider::new(32);
        let recorder = Recorder(Mutex::new(Vec::new()));
        let summary = build_index(&config, &provider, &recorder).await.unwrap();

        assert_eq!(summary.documents, 2);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.chunks, 2);

        let events = recorder.0.into_inner().unwrap();
        assert_eq!(events.first(), Some(&BuildProgressEvent::Loaded { documents: 2, skipped: 1 }));
        assert!(events.contains(&BuildProgressEvent::Embedding { n: 2, total: 2 }));

        let index = VectorIndex::load(&config.index.path, "hash-v1", 32, ArtifactTrust::Trusted)
            .await
            .unwrap();
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn empty_data_directory_fails_without_writing() {
        let tmp = TempDir::new().unwrap();
        let config = config_for(&tmp);
        std::fs::create_dir_all(&config.data.dir).unwrap();

        let err = build_index(&config, &HashProvider::new(32), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmptyCorpus));
        assert!(!config.index.path.exists());
    }
}
