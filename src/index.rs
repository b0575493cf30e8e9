//! Exact nearest-neighbor index over chunk embeddings.
//!
//! A [`VectorIndex`] is built once from a full chunk set, persisted to a
//! directory, and loaded read-only by query-time processes. There is no
//! incremental update: rebuilding from scratch is the only mutation.
//!
//! # Storage
//!
//! The directory holds one SQLite database (see [`crate::db`]):
//!
//! | Table | Contents |
//! |-------|----------|
//! | `meta` | format version, model, dims, metric, chunk count, build time, corpus hash |
//! | `chunks` | one row per chunk in insertion order, vector stored as a little-endian f32 BLOB |
//!
//! [`VectorIndex::persist`] writes into a sibling `<dir>.building-<uuid>`
//! directory and renames it over the target only after the database is
//! complete, so a failed build leaves any previous index untouched.
//!
//! # Trust
//!
//! Loading requires [`ArtifactTrust::Trusted`]. An index directory is an
//! input the process reads wholesale; callers state that they trust where
//! it came from.

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::error::{RagError, Result};
use crate::models::{Chunk, DocumentMetadata, ScoredChunk};

/// Version of the on-disk layout written by this build.
pub const FORMAT_VERSION: u32 = 1;

/// Distance metric recorded in the index metadata.
pub const METRIC: &str = "cosine";

/// Whether the caller vouches for the origin of a persisted index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactTrust {
    Trusted,
    #[default]
    Untrusted,
}

impl ArtifactTrust {
    pub fn from_flag(trusted: bool) -> Self {
        if trusted {
            ArtifactTrust::Trusted
        } else {
            ArtifactTrust::Untrusted
        }
    }
}

/// Metadata describing how an index was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexMeta {
    pub format_version: u32,
    pub model: String,
    pub dims: usize,
    pub metric: String,
    pub chunk_count: usize,
    /// RFC 3339 build timestamp (UTC).
    pub built_at: String,
    /// SHA-256 over every chunk hash, in order.
    pub corpus_sha256: String,
}

/// In-memory index: chunks and their vectors in insertion order.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    meta: IndexMeta,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Assemble an index from chunks and their vectors (same order).
    ///
    /// Fails with [`RagError::EmptyCorpus`] when `chunks` is empty and with
    /// [`RagError::Embedding`] when the vectors do not line up.
    pub fn build(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>, model: &str, dims: usize) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus);
        }
        if chunks.len() != vectors.len() {
            return Err(RagError::embedding(
                model,
                format!("{} chunks but {} vectors", chunks.len(), vectors.len()),
            ));
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != dims) {
            return Err(RagError::embedding(
                model,
                format!("vector has {} dims, expected {}", v.len(), dims),
            ));
        }

        let meta = IndexMeta {
            format_version: FORMAT_VERSION,
            model: model.to_string(),
            dims,
            metric: METRIC.to_string(),
            chunk_count: chunks.len(),
            built_at: Utc::now().to_rfc3339(),
            corpus_sha256: corpus_hash(&chunks),
        };

        Ok(Self {
            meta,
            chunks,
            vectors,
        })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Return the `k` chunks nearest to `vector`, nearest first.
    ///
    /// Ties keep insertion order. `k` larger than the index returns every
    /// chunk. A query vector of the wrong length is an
    /// [`RagError::IndexMismatch`].
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if vector.len() != self.meta.dims {
            return Err(RagError::IndexMismatch {
                index_model: self.meta.model.clone(),
                index_dims: self.meta.dims,
                active_model: "query".to_string(),
                active_dims: vector.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(ordinal, v)| (ordinal, cosine_distance(vector, v)))
            .collect();

        // sort_by is stable, so equal distances stay in ordinal order
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(ordinal, distance)| ScoredChunk {
                chunk: self.chunks[ordinal].clone(),
                distance,
            })
            .collect())
    }

    /// Write the index to `dir`, replacing any index already there.
    pub async fn persist(&self, dir: &Path) -> Result<()> {
        let staging = sibling(dir, "building")?;
        if let Some(parent) = staging.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let written = self.write_database(&staging).await;
        if let Err(err) = written {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(err);
        }

        let swap = swap_into_place(&staging, dir);
        if swap.is_err() {
            let _ = std::fs::remove_dir_all(&staging);
        }
        swap?;

        tracing::info!(
            path = %dir.display(),
            chunks = self.len(),
            model = %self.meta.model,
            "index persisted"
        );
        Ok(())
    }

    async fn write_database(&self, dir: &Path) -> Result<()> {
        let pool = db::connect_writable(dir).await?;
        let result = self.insert_all(&pool).await;
        pool.close().await;
        result
    }

    async fn insert_all(&self, pool: &SqlitePool) -> Result<()> {
        db::create_schema(pool).await?;

        let mut tx = pool.begin().await?;

        let meta_rows = [
            ("format_version", self.meta.format_version.to_string()),
            ("model", self.meta.model.clone()),
            ("dims", self.meta.dims.to_string()),
            ("metric", self.meta.metric.clone()),
            ("chunk_count", self.meta.chunk_count.to_string()),
            ("built_at", self.meta.built_at.clone()),
            ("corpus_sha256", self.meta.corpus_sha256.clone()),
        ];
        for (key, value) in meta_rows {
            sqlx::query("INSERT INTO meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        for (ordinal, (chunk, vector)) in self.chunks.iter().zip(&self.vectors).enumerate() {
            sqlx::query(
                r#"
                INSERT INTO chunks
                    (ordinal, id, source_path, page_number, chunk_index, start_char, text, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(ordinal as i64)
            .bind(&chunk.id)
            .bind(&chunk.metadata.source_path)
            .bind(chunk.metadata.page_number.map(i64::from))
            .bind(chunk.chunk_index as i64)
            .bind(chunk.start_char as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Load an index, checking it was built with `model` at `dims`.
    pub async fn load(dir: &Path, model: &str, dims: usize, trust: ArtifactTrust) -> Result<Self> {
        let pool = open_trusted(dir, trust).await?;
        let result = Self::read_all(&pool, model, dims).await;
        pool.close().await;
        let index = result?;

        tracing::info!(
            path = %dir.display(),
            chunks = index.len(),
            model = %index.meta.model,
            "index loaded"
        );
        Ok(index)
    }

    async fn read_all(pool: &SqlitePool, model: &str, dims: usize) -> Result<Self> {
        let meta = read_meta_rows(pool).await?;

        if meta.model != model || meta.dims != dims {
            return Err(RagError::IndexMismatch {
                index_model: meta.model,
                index_dims: meta.dims,
                active_model: model.to_string(),
                active_dims: dims,
            });
        }

        let rows = sqlx::query(
            r#"
            SELECT id, source_path, page_number, chunk_index, start_char, text, hash, embedding
            FROM chunks
            ORDER BY ordinal
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut chunks = Vec::with_capacity(rows.len());
        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            if blob.len() != meta.dims * 4 {
                return Err(RagError::IndexMismatch {
                    index_model: meta.model.clone(),
                    index_dims: meta.dims,
                    active_model: meta.model.clone(),
                    active_dims: blob.len() / 4,
                });
            }
            let page: Option<i64> = row.try_get("page_number")?;
            let chunk_index: i64 = row.try_get("chunk_index")?;
            let start_char: i64 = row.try_get("start_char")?;
            let source_path: String = row.try_get("source_path")?;

            chunks.push(Chunk {
                id: row.try_get("id")?,
                chunk_index: chunk_index as usize,
                start_char: start_char as usize,
                text: row.try_get("text")?,
                hash: row.try_get("hash")?,
                metadata: DocumentMetadata::new(source_path, page.map(|p| p as u32)),
            });
            vectors.push(blob_to_vec(&blob));
        }

        if chunks.len() != meta.chunk_count {
            return Err(RagError::Storage(format!(
                "index metadata records {} chunks but {} were stored",
                meta.chunk_count,
                chunks.len()
            )));
        }

        Ok(Self {
            meta,
            chunks,
            vectors,
        })
    }
}

/// Read only the metadata of a persisted index.
pub async fn read_meta(dir: &Path, trust: ArtifactTrust) -> Result<IndexMeta> {
    let pool = open_trusted(dir, trust).await?;
    let meta = read_meta_rows(&pool).await;
    pool.close().await;
    meta
}

async fn open_trusted(dir: &Path, trust: ArtifactTrust) -> Result<SqlitePool> {
    if trust != ArtifactTrust::Trusted {
        return Err(RagError::UntrustedIndex(dir.to_path_buf()));
    }
    if !db::index_file(dir).is_file() {
        return Err(RagError::Retrieval(format!(
            "no index found at {} (run `neurorag build` first)",
            dir.display()
        )));
    }
    db::connect_read_only(dir).await
}

async fn read_meta_rows(pool: &SqlitePool) -> Result<IndexMeta> {
    let rows = sqlx::query("SELECT key, value FROM meta")
        .fetch_all(pool)
        .await?;

    let mut values = std::collections::HashMap::new();
    for row in rows {
        let key: String = row.try_get("key")?;
        let value: String = row.try_get("value")?;
        values.insert(key, value);
    }

    let get = |key: &str| -> Result<String> {
        values
            .get(key)
            .cloned()
            .ok_or_else(|| RagError::Storage(format!("index metadata is missing '{}'", key)))
    };
    let parse = |key: &str| -> Result<usize> {
        get(key)?
            .parse::<usize>()
            .map_err(|e| RagError::Storage(format!("bad index metadata '{}': {}", key, e)))
    };

    let format_version = parse("format_version")? as u32;
    if format_version != FORMAT_VERSION {
        return Err(RagError::Storage(format!(
            "unsupported index format version {} (expected {}); rebuild the index",
            format_version, FORMAT_VERSION
        )));
    }

    Ok(IndexMeta {
        format_version,
        model: get("model")?,
        dims: parse("dims")?,
        metric: get("metric")?,
        chunk_count: parse("chunk_count")?,
        built_at: get("built_at")?,
        corpus_sha256: get("corpus_sha256")?,
    })
}

fn corpus_hash(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.hash.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// `<dir>.<tag>-<uuid>` next to `dir`.
fn sibling(dir: &Path, tag: &str) -> Result<PathBuf> {
    let name = dir
        .file_name()
        .ok_or_else(|| RagError::Config(format!("invalid index path: {}", dir.display())))?;
    let mut sibling_name = name.to_os_string();
    sibling_name.push(format!(".{}-{}", tag, uuid::Uuid::new_v4()));
    Ok(dir.with_file_name(sibling_name))
}

/// Replace `target` with `staging`. An existing target is moved aside first
/// and removed once the new directory is in place.
fn swap_into_place(staging: &Path, target: &Path) -> Result<()> {
    swap_with_cleanup(staging, target, |retired| std::fs::remove_dir_all(retired))
}

/// Once the new index is in place the swap has succeeded; failing to remove
/// the retired copy only leaves a stray directory behind.
fn swap_with_cleanup(
    staging: &Path,
    target: &Path,
    remove: impl FnOnce(&Path) -> std::io::Result<()>,
) -> Result<()> {
    if target.exists() {
        let retired = sibling(target, "old")?;
        std::fs::rename(target, &retired)?;
        if let Err(err) = std::fs::rename(staging, target) {
            let _ = std::fs::rename(&retired, target);
            return Err(err.into());
        }
        if let Err(err) = remove(&retired) {
            tracing::warn!(
                path = %retired.display(),
                error = %err,
                "could not remove previous index"
            );
        }
    } else {
        std::fs::rename(staging, target)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(text: &str, index: usize) -> Chunk {
        Chunk {
            id: format!("id-{}", index),
            chunk_index: index,
            start_char: index * 10,
            text: text.to_string(),
            hash: format!("h{}", index),
            metadata: DocumentMetadata::new("data/a.pdf", Some(2)),
        }
    }

    fn small_index() -> VectorIndex {
        let chunks = vec![chunk("north", 0), chunk("east", 1), chunk("north again", 2)];
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]];
        VectorIndex::build(chunks, vectors, "test-model", 2).unwrap()
    }

    #[test]
    fn empty_corpus_is_rejected() {
        let err = VectorIndex::build(Vec::new(), Vec::new(), "m", 4).unwrap_err();
        assert!(matches!(err, RagError::EmptyCorpus));
    }

    #[test]
    fn query_orders_nearest_first_with_stable_ties() {
        let index = small_index();
        let hits = index.query(&[1.0, 0.0], 3).unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["north", "north again", "east"]);
        assert!(hits[0].distance <= hits[2].distance);
    }

    #[test]
    fn k_larger_than_index_returns_everything() {
        let index = small_index();
        assert_eq!(index.query(&[0.0, 1.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn wrong_query_dims_is_mismatch() {
        let index = small_index();
        let err = index.query(&[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, RagError::IndexMismatch { .. }));
    }

    #[tokio::test]
    async fn persist_and_reload_round_trips() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("index");
        let index = small_index();
        index.persist(&dir).await.unwrap();

        let loaded = VectorIndex::load(&dir, "test-model", 2, ArtifactTrust::Trusted)
            .await
            .unwrap();
        assert_eq!(loaded.meta(), index.meta());
        assert_eq!(loaded.chunks(), index.chunks());
        assert_eq!(
            loaded.query(&[0.0, 1.0], 1).unwrap()[0].chunk.text,
            "east"
        );
    }

    #[tokio::test]
    async fn untrusted_load_is_refused() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("index");
        small_index().persist(&dir).await.unwrap();
        let err = VectorIndex::load(&dir, "test-model", 2, ArtifactTrust::Untrusted)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::UntrustedIndex(_)));
    }

    #[tokio::test]
    async fn model_mismatch_is_reported() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("index");
        small_index().persist(&dir).await.unwrap();
        let err = VectorIndex::load(&dir, "other-model", 2, ArtifactTrust::Trusted)
            .await
            .unwrap_err();
        match err {
            RagError::IndexMismatch {
                index_model,
                active_model,
                ..
            } => {
                assert_eq!(index_model, "test-model");
                assert_eq!(active_model, "other-model");
            }
            other => panic!("expected IndexMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_index_without_leftovers() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("index");
        small_index().persist(&dir).await.unwrap();

        let replacement = VectorIndex::build(
            vec![chunk("only", 0)],
            vec![vec![0.5, 0.5]],
            "test-model",
            2,
        )
        .unwrap();
        replacement.persist(&dir).await.unwrap();

        let loaded = VectorIndex::load(&dir, "test-model", 2, ArtifactTrust::Trusted)
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);

        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "staging directories must be cleaned up");
    }

    #[tokio::test]
    async fn missing_index_is_retrieval_error() {
        let tmp = TempDir::new().unwrap();
        let err = read_meta(&tmp.path().join("none"), ArtifactTrust::Trusted)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Retrieval(_)));
    }

    #[test]
    fn failed_cleanup_of_old_index_still_succeeds() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("index");
        let staging = tmp.path().join("index.building");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("marker"), "old").unwrap();
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("marker"), "new").unwrap();

        swap_with_cleanup(&staging, &target, |_| {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"))
        })
        .unwrap();

        assert_eq!(std::fs::read_to_string(target.join("marker")).unwrap(), "new");
        assert!(!staging.exists());
    }
}
