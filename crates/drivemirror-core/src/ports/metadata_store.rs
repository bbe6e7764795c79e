//! Metadata store port (driven/secondary port)
//!
//! Persists the last observed state of every remote entry per principal,
//! and the per-principal sync status that guards against concurrent cycles.
//!
//! ## Design Notes
//!
//! - Each method is one atomic, durable unit. A cycle never relies on a
//!   transaction spanning network calls.
//! - [`IMetadataStore::try_begin_cycle`] is the compare-and-set that
//!   enforces a single running cycle per principal.

use chrono::{DateTime, Utc};

use crate::domain::{
    newtypes::{CycleMarker, PrincipalId, RemoteId},
    remote_entry::RemoteEntry,
    sync_status::SyncStatus,
};

/// Outcome of an attempt to start a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginCycle {
    /// The status moved to running; the cycle must use this marker
    Started(CycleMarker),
    /// Another cycle is still running for the principal
    AlreadyRunning,
}

#[async_trait::async_trait]
pub trait IMetadataStore: Send + Sync {
    // --- Remote entries ---

    /// Loads one entry by its identity key
    async fn get_entry(
        &self,
        principal: &PrincipalId,
        id: &RemoteId,
    ) -> anyhow::Result<Option<RemoteEntry>>;

    /// Inserts or replaces an entry
    async fn upsert_entry(&self, entry: &RemoteEntry) -> anyhow::Result<()>;

    /// Entries of `principal` whose last-seen marker is lower than `marker`,
    /// deepest remote path first
    async fn entries_older_than(
        &self,
        principal: &PrincipalId,
        marker: CycleMarker,
    ) -> anyhow::Result<Vec<RemoteEntry>>;

    /// Removes one entry; removing a missing entry is not an error
    async fn delete_entry(&self, principal: &PrincipalId, id: &RemoteId) -> anyhow::Result<()>;

    /// All entries of a principal ordered by remote path
    async fn list_entries(&self, principal: &PrincipalId) -> anyhow::Result<Vec<RemoteEntry>>;

    /// Number of entries recorded for a principal
    async fn count_entries(&self, principal: &PrincipalId) -> anyhow::Result<u64>;

    // --- Sync status ---

    /// Atomically moves the status to running and allocates the next marker
    ///
    /// A running status whose start is older than `stale_before` belongs to
    /// a cycle that died without recording its end, and may be taken over.
    async fn try_begin_cycle(
        &self,
        principal: &PrincipalId,
        started_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> anyhow::Result<BeginCycle>;

    /// Writes the full status row
    async fn set_status(&self, status: &SyncStatus) -> anyhow::Result<()>;

    /// Loads the status row, `None` if the principal never attempted a cycle
    async fn get_status(&self, principal: &PrincipalId) -> anyhow::Result<Option<SyncStatus>>;
}
