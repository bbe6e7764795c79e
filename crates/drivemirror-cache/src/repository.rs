//! SQLite implementation of the credential and metadata store ports
//!
//! One statement per port method. The cycle start is a single conditional
//! `UPDATE ... RETURNING`, which makes it a compare-and-set on the status
//! row without holding a transaction open across network calls.
//!
//! ## Type Mapping
//!
//! | Domain Type            | SQL Type | Strategy                                  |
//! |------------------------|----------|-------------------------------------------|
//! | PrincipalId, RemoteId  | TEXT     | `.as_str()` / `::new()`                   |
//! | RemotePath             | TEXT     | `.as_str()` / `RemotePath::new()`         |
//! | ChangeToken            | TEXT     | `.as_str()` / `ChangeToken::new()`        |
//! | CycleMarker            | INTEGER  | `.value()` / `CycleMarker::new()`         |
//! | SyncState              | TEXT     | `.as_str()` / `FromStr`                   |
//! | PathBuf                | TEXT     | lossy UTF-8 string                        |
//! | DateTime<Utc>          | TEXT     | RFC 3339, fixed microsecond precision     |

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use drivemirror_core::domain::{
    ChangeToken, CycleMarker, Principal, PrincipalId, RemoteEntry, RemoteEntryDescriptor,
    RemoteId, RemotePath, SyncState, SyncStatus, TokenSet,
};
use drivemirror_core::ports::{BeginCycle, ICredentialStore, IMetadataStore};

use crate::CacheError;

/// SQLite-based implementation of the store ports
///
/// All operations go through a connection pool; each method is one
/// atomic statement.
pub struct SqliteStateRepository {
    pool: SqlitePool,
}

impl SqliteStateRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Format a timestamp so that stored values order lexicographically
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a timestamp written by [`format_datetime`], or SQLite's own
/// `CURRENT_TIMESTAMP` form (UTC, no offset)
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| CacheError::Corrupt(format!("timestamp '{s}': {e}")))
}

/// Parse an optional DateTime<Utc> from an optional string
fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn corrupt(e: impl std::fmt::Display) -> CacheError {
    CacheError::Corrupt(e.to_string())
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn principal_from_row(row: &SqliteRow) -> Result<Principal, CacheError> {
    let id: String = row.get("id");
    let remote_user_id: String = row.get("remote_user_id");
    let display_name: String = row.get("display_name");
    let access_token: String = row.get("access_token");
    let refresh_token: Option<String> = row.get("refresh_token");
    let expires_at: String = row.get("expires_at");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Principal::restore(
        PrincipalId::new(id).map_err(corrupt)?,
        remote_user_id,
        display_name,
        TokenSet {
            access_token,
            refresh_token,
            expires_at: parse_datetime(&expires_at)?,
        },
        parse_datetime(&created_at)?,
        parse_datetime(&updated_at)?,
    ))
}

fn entry_from_row(row: &SqliteRow) -> Result<RemoteEntry, CacheError> {
    let principal_id: String = row.get("principal_id");
    let remote_id: String = row.get("remote_id");
    let name: String = row.get("name");
    let is_folder: bool = row.get("is_folder");
    let size_bytes: Option<i64> = row.get("size_bytes");
    let parent_id: Option<String> = row.get("parent_id");
    let remote_path: String = row.get("remote_path");
    let local_path: String = row.get("local_path");
    let change_token: Option<String> = row.get("change_token");
    let created_at: Option<String> = row.get("created_at");
    let modified_at: Option<String> = row.get("modified_at");
    let created_by: Option<String> = row.get("created_by");
    let modified_by: Option<String> = row.get("modified_by");
    let last_seen: i64 = row.get("last_seen");

    let descriptor = RemoteEntryDescriptor {
        id: RemoteId::new(remote_id).map_err(corrupt)?,
        name,
        is_folder,
        size: size_bytes.map(|s| s.max(0) as u64),
        parent_id: parent_id.map(RemoteId::new).transpose().map_err(corrupt)?,
        remote_path: RemotePath::new(remote_path).map_err(corrupt)?,
        change_token: change_token.map(ChangeToken::new),
        created_at: parse_optional_datetime(created_at)?,
        modified_at: parse_optional_datetime(modified_at)?,
        created_by,
        modified_by,
    };

    Ok(RemoteEntry::new(
        PrincipalId::new(principal_id).map_err(corrupt)?,
        descriptor,
        PathBuf::from(local_path),
        CycleMarker::new(last_seen),
    ))
}

fn status_from_row(row: &SqliteRow) -> Result<SyncStatus, CacheError> {
    let principal_id: String = row.get("principal_id");
    let state: String = row.get("state");
    let last_cycle: i64 = row.get("last_cycle");
    let last_started: Option<String> = row.get("last_started");
    let last_finished: Option<String> = row.get("last_finished");
    let last_error: Option<String> = row.get("last_error");

    Ok(SyncStatus {
        principal_id: PrincipalId::new(principal_id).map_err(corrupt)?,
        state: state.parse::<SyncState>().map_err(corrupt)?,
        last_cycle: CycleMarker::new(last_cycle),
        last_started: parse_optional_datetime(last_started)?,
        last_finished: parse_optional_datetime(last_finished)?,
        last_error,
    })
}

// ============================================================================
// ICredentialStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ICredentialStore for SqliteStateRepository {
    async fn get(&self, id: &PrincipalId) -> anyhow::Result<Option<Principal>> {
        let row = sqlx::query("SELECT * FROM principals WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(principal_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, principal: &Principal) -> anyhow::Result<()> {
        let tokens = principal.tokens();

        // The whole token triple is replaced in one statement
        sqlx::query(
            "INSERT INTO principals \
             (id, remote_user_id, display_name, access_token, refresh_token, \
              expires_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
              remote_user_id = excluded.remote_user_id, \
              display_name = excluded.display_name, \
              access_token = excluded.access_token, \
              refresh_token = excluded.refresh_token, \
              expires_at = excluded.expires_at, \
              updated_at = excluded.updated_at",
        )
        .bind(principal.id().as_str())
        .bind(principal.remote_user_id())
        .bind(principal.display_name())
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(format_datetime(&tokens.expires_at))
        .bind(format_datetime(&principal.created_at()))
        .bind(format_datetime(&principal.updated_at()))
        .execute(&self.pool)
        .await?;

        tracing::trace!(principal = %principal.id(), "Saved principal");
        Ok(())
    }

    async fn list(&self) -> anyhow::Result<Vec<Principal>> {
        let rows = sqlx::query("SELECT * FROM principals ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut principals = Vec::with_capacity(rows.len());
        for row in &rows {
            principals.push(principal_from_row(row)?);
        }
        Ok(principals)
    }
}

// ============================================================================
// IMetadataStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IMetadataStore for SqliteStateRepository {
    // --- Remote entries ---

    async fn get_entry(
        &self,
        principal: &PrincipalId,
        id: &RemoteId,
    ) -> anyhow::Result<Option<RemoteEntry>> {
        let row =
            sqlx::query("SELECT * FROM remote_entries WHERE principal_id = ? AND remote_id = ?")
                .bind(principal.as_str())
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(ref r) => Ok(Some(entry_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn upsert_entry(&self, entry: &RemoteEntry) -> anyhow::Result<()> {
        let d = &entry.descriptor;

        sqlx::query(
            "INSERT OR REPLACE INTO remote_entries \
             (principal_id, remote_id, name, is_folder, size_bytes, parent_id, \
              remote_path, local_path, change_token, created_at, modified_at, \
              created_by, modified_by, last_seen) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.principal_id.as_str())
        .bind(d.id.as_str())
        .bind(&d.name)
        .bind(d.is_folder)
        .bind(d.size.map(|s| s as i64))
        .bind(d.parent_id.as_ref().map(|p| p.as_str()))
        .bind(d.remote_path.as_str())
        .bind(entry.local_path.to_string_lossy().into_owned())
        .bind(d.change_token.as_ref().map(|t| t.as_str()))
        .bind(d.created_at.as_ref().map(format_datetime))
        .bind(d.modified_at.as_ref().map(format_datetime))
        .bind(&d.created_by)
        .bind(&d.modified_by)
        .bind(entry.last_seen.value())
        .execute(&self.pool)
        .await?;

        tracing::trace!(
            principal = %entry.principal_id,
            remote_id = %d.id,
            last_seen = %entry.last_seen,
            "Saved remote entry"
        );
        Ok(())
    }

    async fn entries_older_than(
        &self,
        principal: &PrincipalId,
        marker: CycleMarker,
    ) -> anyhow::Result<Vec<RemoteEntry>> {
        // A descendant's path is always longer than its ancestor's
        let rows = sqlx::query(
            "SELECT * FROM remote_entries \
             WHERE principal_id = ? AND last_seen < ? \
             ORDER BY LENGTH(remote_path) DESC, remote_path DESC",
        )
        .bind(principal.as_str())
        .bind(marker.value())
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(entry_from_row(row)?);
        }
        Ok(entries)
    }

    async fn delete_entry(&self, principal: &PrincipalId, id: &RemoteId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM remote_entries WHERE principal_id = ? AND remote_id = ?")
            .bind(principal.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        tracing::trace!(principal = %principal, remote_id = %id, "Deleted remote entry");
        Ok(())
    }

    async fn list_entries(&self, principal: &PrincipalId) -> anyhow::Result<Vec<RemoteEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM remote_entries WHERE principal_id = ? ORDER BY remote_path ASC",
        )
        .bind(principal.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(entry_from_row(row)?);
        }
        Ok(entries)
    }

    async fn count_entries(&self, principal: &PrincipalId) -> anyhow::Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM remote_entries WHERE principal_id = ?")
                .bind(principal.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    // --- Sync status ---

    async fn try_begin_cycle(
        &self,
        principal: &PrincipalId,
        started_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> anyhow::Result<BeginCycle> {
        // Status rows are created lazily on the first attempt
        sqlx::query("INSERT OR IGNORE INTO sync_status (principal_id, state, last_cycle) VALUES (?, 'idle', 0)")
            .bind(principal.as_str())
            .execute(&self.pool)
            .await?;

        let marker: Option<i64> = sqlx::query_scalar(
            "UPDATE sync_status \
             SET state = 'running', last_cycle = last_cycle + 1, last_started = ? \
             WHERE principal_id = ? \
               AND (state != 'running' OR last_started IS NULL OR last_started < ?) \
             RETURNING last_cycle",
        )
        .bind(format_datetime(&started_at))
        .bind(principal.as_str())
        .bind(format_datetime(&stale_before))
        .fetch_optional(&self.pool)
        .await?;

        match marker {
            Some(value) => {
                tracing::trace!(principal = %principal, marker = value, "Cycle started");
                Ok(BeginCycle::Started(CycleMarker::new(value)))
            }
            None => Ok(BeginCycle::AlreadyRunning),
        }
    }

    async fn set_status(&self, status: &SyncStatus) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_status \
             (principal_id, state, last_cycle, last_started, last_finished, last_error) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(status.principal_id.as_str())
        .bind(status.state.as_str())
        .bind(status.last_cycle.value())
        .bind(status.last_started.as_ref().map(format_datetime))
        .bind(status.last_finished.as_ref().map(format_datetime))
        .bind(&status.last_error)
        .execute(&self.pool)
        .await?;

        tracing::trace!(principal = %status.principal_id, state = %status.state, "Saved sync status");
        Ok(())
    }

    async fn get_status(&self, principal: &PrincipalId) -> anyhow::Result<Option<SyncStatus>> {
        let row = sqlx::query("SELECT * FROM sync_status WHERE principal_id = ?")
            .bind(principal.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(status_from_row(r)?)),
            None => Ok(None),
        }
    }
}
