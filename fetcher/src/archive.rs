//! Append-only archive store (spec §4.2): on startup, open a new SQLite
//! file under `dir` named `snapshots_<UTC timestamp>.sqlite3`, with two
//! row streams — `realtime_snapshots` and `static_snapshots`. After every
//! `MAX_SNAPSHOT_COUNT` *new* (non-deduplicated) realtime rows the file is
//! closed and a fresh one opened. Grounded on the teacher's sqlx stack
//! (`gateway`'s `main.rs`) and on the original Python fetcher's
//! `setup_database`/`store_snapshot`/`reopen_database`
//! (`original_source/zet/fetcher/fetcher.py`), which uses `sqlite3`
//! directly for the same two tables. Tables are created inline with
//! `CREATE TABLE IF NOT EXISTS` on each new database file rather than via
//! `sqlx::migrate!`, since there is no schema history to version — every
//! file starts from the same fixed two-table schema.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

use crate::error::FetcherError;

pub const MAX_SNAPSHOT_COUNT: u32 = 10_000;

pub struct ArchiveStore {
    dir: PathBuf,
    pool: SqlitePool,
    path: PathBuf,
    new_realtime_rows: u32,
}

impl ArchiveStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, FetcherError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        let (pool, path) = open_new_database(&dir).await?;
        Ok(Self {
            dir,
            pool,
            path,
            new_realtime_rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a realtime row. `gzipped_data` is empty to mark a dedup row
    /// (same raw bytes as the previous fetch); otherwise it holds the
    /// gzip-compressed payload.
    pub async fn insert_realtime(
        &mut self,
        fetched_at: DateTime<Utc>,
        snapshot_at: i64,
        gzipped_data: &[u8],
        is_new: bool,
    ) -> Result<(), FetcherError> {
        sqlx::query(
            "INSERT INTO realtime_snapshots (fetched_at, snapshot_at, gzipped_data) VALUES (?, ?, ?)",
        )
        .bind(fetched_at.timestamp_millis())
        .bind(snapshot_at)
        .bind(gzipped_data)
        .execute(&self.pool)
        .await?;

        if is_new {
            self.new_realtime_rows += 1;
            if self.new_realtime_rows >= MAX_SNAPSHOT_COUNT {
                self.reopen().await?;
            }
        }
        Ok(())
    }

    pub async fn insert_static(
        &mut self,
        fetched_at: DateTime<Utc>,
        gzipped_data: &[u8],
        calendar_date: NaiveDate,
    ) -> Result<(), FetcherError> {
        sqlx::query(
            "INSERT INTO static_snapshots (fetched_at, gzipped_data, calendar_date) VALUES (?, ?, ?)",
        )
        .bind(fetched_at.timestamp_millis())
        .bind(gzipped_data)
        .bind(calendar_date.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reopen(&mut self) -> Result<(), FetcherError> {
        tracing::info!(
            rows = self.new_realtime_rows,
            "reopening archive after reaching MAX_SNAPSHOT_COUNT"
        );
        self.pool.close().await;
        let (pool, path) = open_new_database(&self.dir).await?;
        self.pool = pool;
        self.path = path;
        self.new_realtime_rows = 0;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn open_new_database(dir: &Path) -> Result<(SqlitePool, PathBuf), FetcherError> {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("snapshots_{timestamp}.sqlite3"));
    tracing::info!(path = %path.display(), "creating archive database");

    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS realtime_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fetched_at INTEGER NOT NULL,
            snapshot_at INTEGER NOT NULL,
            gzipped_data BLOB NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS static_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fetched_at INTEGER NOT NULL,
            gzipped_data BLOB NOT NULL,
            calendar_date TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    Ok((pool, path))
}
