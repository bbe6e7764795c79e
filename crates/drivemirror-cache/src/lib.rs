//! drivemirror cache - Local state persistence
//!
//! SQLite-based storage for:
//! - Principals and their token triple
//! - Last observed state of every remote entry, per principal
//! - Per-principal sync status
//!
//! ## Architecture
//!
//! [`SqliteStateRepository`] implements both `ICredentialStore` and
//! `IMetadataStore` from `drivemirror-core` over one [`DatabasePool`].
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use drivemirror_cache::{DatabasePool, SqliteStateRepository};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/var/lib/drivemirror/state.db")).await?;
//! let store = SqliteStateRepository::new(pool.pool().clone());
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteStateRepository;

use std::path::PathBuf;

/// Failures opening or reading the state database
///
/// Store methods surface these through `anyhow`; only [`DatabasePool`]
/// returns them directly.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open database {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Schema migration failed: {0}")]
    Migration(#[source] sqlx::Error),

    /// A stored value no longer maps to a domain type
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}
