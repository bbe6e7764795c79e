//! SQLite pool setup
//!
//! File databases run in WAL mode with `synchronous = FULL`, so every
//! statement the stores issue is durable once it returns. The schema is
//! embedded and applied on every open; it only uses `IF NOT EXISTS`.

use std::{path::Path, time::Duration};

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::{debug, info};

use crate::CacheError;

const SCHEMA: &str = include_str!("migrations/20261019_initial.sql");

/// Writers wait this long for a competing transaction before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Readers run concurrently under WAL; writes serialize on the file lock
const MAX_FILE_CONNECTIONS: u32 = 5;

/// Owned handle to the state database
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (creating if needed) the database file at `db_path` and applies
    /// the schema. Missing parent directories are created.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| CacheError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_FILE_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|source| CacheError::Connect {
                target: db_path.display().to_string(),
                source,
            })?;

        apply_schema(&pool).await?;
        info!(path = %db_path.display(), "State database opened");
        Ok(Self { pool })
    }

    /// Private in-memory database for tests
    ///
    /// An in-memory SQLite database lives and dies with its connection, so
    /// the pool is capped at one.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|source| CacheError::Connect {
                target: ":memory:".to_string(),
                source,
            })?;

        apply_schema(&pool).await?;
        debug!("In-memory state database opened");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), CacheError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(CacheError::Migration)?;
    debug!("Schema applied");
    Ok(())
}
