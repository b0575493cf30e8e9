//! SQLite access for the persisted index.
//!
//! An index directory holds a single database file, [`INDEX_FILE`]. Builds
//! open it writable and create the schema; queries open it read-only.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File name of the database inside an index directory.
pub const INDEX_FILE: &str = "index.sqlite";

pub fn index_file(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

/// Open (creating if needed) a writable index database in `dir`.
pub async fn connect_writable(dir: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(dir)?;

    let options = SqliteConnectOptions::new()
        .filename(index_file(dir))
        .create_if_missing(true)
        // Rollback journal keeps the directory to one file once the pool closes.
        .journal_mode(SqliteJournalMode::Delete);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Open an existing index database read-only.
pub async fn connect_read_only(dir: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(index_file(dir))
        .read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create the `meta` and `chunks` tables.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            ordinal INTEGER PRIMARY KEY,
            id TEXT NOT NULL,
            source_path TEXT NOT NULL,
            page_number INTEGER,
            chunk_index INTEGER NOT NULL,
            start_char INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_path)")
        .execute(pool)
        .await?;

    Ok(())
}
