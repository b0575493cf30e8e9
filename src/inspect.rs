//! `neurorag inspect`: print the metadata of the persisted index.

use anyhow::Result;

use crate::config::Config;
use crate::embedding;
use crate::index::{self, ArtifactTrust, IndexMeta};

pub async fn run_inspect(config: &Config, trust: ArtifactTrust) -> Result<()> {
    let meta = index::read_meta(&config.index.path, trust).await?;
    print!("{}", format_meta(&meta));

    // Report a mismatch here rather than at the first query.
    match embedding::create_provider(&config.embedding) {
        Ok(provider) if provider.model_name() != meta.model || provider.dims() != meta.dims => {
            println!(
                "  warning: configured embedding is {} ({} dims); rebuild the index to use it",
                provider.model_name(),
                provider.dims()
            );
        }
        Ok(_) => println!("  embedding: matches configuration"),
        Err(err) => println!("  embedding: not checked ({})", err),
    }
    Ok(())
}

pub fn format_meta(meta: &IndexMeta) -> String {
    format!(
        "index\n  format: v{}\n  model: {}\n  dims: {}\n  metric: {}\n  chunks: {}\n  built: {}\n  corpus sha256: {}\n",
        meta.format_version,
        meta.model,
        meta.dims,
        meta.metric,
        meta.chunk_count,
        meta.built_at,
        meta.corpus_sha256
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_listing_includes_model_and_counts() {
        let meta = IndexMeta {
            format_version: 1,
            model: "hash-v1".into(),
            dims: 256,
            metric: "cosine".into(),
            chunk_count: 12,
            built_at: "2026-01-01T00:00:00+00:00".into(),
            corpus_sha256: "ab".into(),
        };
        let out = format_meta(&meta);
        assert!(out.contains("model: hash-v1"));
        assert!(out.contains("chunks: 12"));
    }
}
