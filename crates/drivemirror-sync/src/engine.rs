//! Reconciliation engine
//!
//! One cycle mirrors the full remote tree of a principal onto its local
//! root in two passes:
//!
//! 1. **Observe**: every entry produced by the remote walk is materialized
//!    (folders created, new or changed files downloaded, moves applied) and
//!    recorded with the cycle's marker.
//! 2. **Sweep**: once the walk has reached its end, entries still carrying
//!    an older marker were not re-observed and are removed, deepest first.
//!
//! The sweep never runs after a failed or cancelled walk, so a partial
//! enumeration cannot delete anything.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use chrono::{DateTime, Duration, Utc};
use drivemirror_core::{
    domain::{
        CycleMarker, MirrorError, PrincipalId, RemoteEntry, RemoteEntryDescriptor, RemoteError,
        RemoteId, SyncState, SyncStatus,
    },
    ports::{BeginCycle, ILocalMirror, IMetadataStore, IRemoteStore, RemoveOutcome},
    usecases::AuthManager,
};
use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    export::{write_metadata, METADATA_FILE_NAME},
    CycleError,
};

/// A running status older than this is treated as a crashed cycle
pub const DEFAULT_STALE_RUNNING_SECS: i64 = 6 * 60 * 60;

// ============================================================================
// CycleReport
// ============================================================================

/// Summary of one completed cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub marker: CycleMarker,
    /// Entries produced by the remote walk
    pub entries_seen: u64,
    pub files_downloaded: u64,
    pub bytes_downloaded: u64,
    /// Local objects moved instead of re-downloaded
    pub entries_relocated: u64,
    /// Rows removed by the sweep
    pub entries_deleted: u64,
    /// Per-entry failures that did not abort the cycle
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl CycleReport {
    fn new(marker: CycleMarker) -> Self {
        Self {
            marker,
            ..Self::default()
        }
    }

    /// Returns true if every observed entry was reconciled
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Mutable state of one cycle, threaded through the observe and sweep passes
struct CyclePass {
    principal: PrincipalId,
    marker: CycleMarker,
    access_token: String,
    report: CycleReport,
    /// Local paths owned by entries observed in this cycle
    claimed: HashSet<PathBuf>,
    /// Previous locations of moved folders
    vacated: Vec<PathBuf>,
    /// Listed items the remote could not describe; their rows and subtrees
    /// were not observed
    unreadable: usize,
}

impl CyclePass {
    fn record_error(&mut self, what: impl std::fmt::Display, err: impl std::fmt::Display) {
        let message = format!("{what}: {err}");
        warn!(principal = %self.principal, error = %message, "Entry not reconciled");
        self.report.errors.push(message);
    }

    fn entry(&self, descriptor: RemoteEntryDescriptor, local_path: PathBuf) -> RemoteEntry {
        RemoteEntry::new(self.principal.clone(), descriptor, local_path, self.marker)
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Drives reconciliation cycles
///
/// ## Dependencies
///
/// - `auth`: supplies a fresh access token for the principal
/// - `remote`: tree walk and content download
/// - `metadata`: recorded entries and the per-principal status row
/// - `mirror`: local filesystem under the principal root
pub struct SyncEngine {
    auth: Arc<AuthManager>,
    remote: Arc<dyn IRemoteStore>,
    metadata: Arc<dyn IMetadataStore>,
    mirror: Arc<dyn ILocalMirror>,
    stale_running: Duration,
    export_metadata: bool,
}

impl SyncEngine {
    pub fn new(
        auth: Arc<AuthManager>,
        remote: Arc<dyn IRemoteStore>,
        metadata: Arc<dyn IMetadataStore>,
        mirror: Arc<dyn ILocalMirror>,
    ) -> Self {
        Self {
            auth,
            remote,
            metadata,
            mirror,
            stale_running: Duration::seconds(DEFAULT_STALE_RUNNING_SECS),
            export_metadata: true,
        }
    }

    /// Age after which a running status may be taken over
    pub fn with_stale_running(mut self, stale_running: Duration) -> Self {
        self.stale_running = stale_running;
        self
    }

    /// Enables or disables the `metadata.json` export
    pub fn with_metadata_export(mut self, enabled: bool) -> Self {
        self.export_metadata = enabled;
        self
    }

    /// Path of the metadata export of a principal
    pub fn metadata_path(&self, principal: &PrincipalId) -> PathBuf {
        let root = self.mirror.principal_root(principal);
        match root.parent() {
            Some(dir) => dir.join(METADATA_FILE_NAME),
            None => root.join(METADATA_FILE_NAME),
        }
    }

    // ========================================================================
    // run_cycle
    // ========================================================================

    /// Runs one reconciliation cycle for `principal`
    ///
    /// 1. Moves the status to running and allocates the cycle marker
    /// 2. Obtains a fresh access token
    /// 3. Walks the remote tree, materializing and recording each entry
    /// 4. Sweeps entries the walk did not re-observe
    /// 5. Writes the metadata export
    /// 6. Records the final status
    ///
    /// # Errors
    ///
    /// [`CycleError::AlreadyRunning`] leaves the status untouched. Every
    /// other error has been recorded as the principal's last error.
    #[tracing::instrument(skip(self, cancel), fields(principal = %principal))]
    pub async fn run_cycle(
        &self,
        principal: &PrincipalId,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, CycleError> {
        let start = Instant::now();
        let started_at = Utc::now();

        // Step 1: Claim the running status
        let marker = match self
            .metadata
            .try_begin_cycle(principal, started_at, started_at - self.stale_running)
            .await?
        {
            BeginCycle::Started(marker) => marker,
            BeginCycle::AlreadyRunning => {
                info!("A cycle is already running, skipping");
                return Err(CycleError::AlreadyRunning(principal.to_string()));
            }
        };

        info!(marker = %marker, "Starting sync cycle");

        // Steps 2-5
        let outcome = self.reconcile(principal, marker, cancel).await;

        // Step 6: Record the outcome, whatever it was
        let failure = outcome.as_ref().err().map(ToString::to_string);
        if let Err(e) = self
            .record_status(principal, marker, started_at, failure.as_deref())
            .await
        {
            error!(error = %e, "Failed to record sync status");
            if outcome.is_ok() {
                return Err(CycleError::Storage(e));
            }
        }

        match outcome {
            Ok(mut report) => {
                report.duration_ms = start.elapsed().as_millis() as u64;
                info!(
                    marker = %marker,
                    seen = report.entries_seen,
                    downloaded = report.files_downloaded,
                    relocated = report.entries_relocated,
                    deleted = report.entries_deleted,
                    errors = report.errors.len(),
                    duration_ms = report.duration_ms,
                    "Sync cycle complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(marker = %marker, error = %e, "Sync cycle failed");
                Err(e)
            }
        }
    }

    async fn record_status(
        &self,
        principal: &PrincipalId,
        marker: CycleMarker,
        started_at: DateTime<Utc>,
        failure: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut status = SyncStatus {
            principal_id: principal.clone(),
            state: SyncState::Running,
            last_cycle: marker,
            last_started: Some(started_at),
            last_finished: None,
            last_error: None,
        };

        match failure {
            None => status.finish(Utc::now())?,
            Some(message) => status.fail(Utc::now(), message)?,
        }

        self.metadata.set_status(&status).await
    }

    async fn reconcile(
        &self,
        principal: &PrincipalId,
        marker: CycleMarker,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, CycleError> {
        // Step 2: Credential. ReauthRequired ends the cycle before any remote call
        let access_token = self.auth.ensure_fresh_token(principal).await?;

        let mut pass = CyclePass {
            principal: principal.clone(),
            marker,
            access_token,
            report: CycleReport::new(marker),
            claimed: HashSet::new(),
            vacated: Vec::new(),
            unreadable: 0,
        };

        // Step 3: Observe
        self.observe_tree(&mut pass, cancel).await?;

        // Step 4: Sweep, only after the whole tree was observed
        if cancel.is_cancelled() {
            return Err(CycleError::Cancelled);
        }
        if pass.unreadable == 0 {
            self.sweep(&mut pass).await?;
            self.remove_vacated(&mut pass).await;
        } else {
            warn!(unreadable = pass.unreadable, "Remote listing incomplete, skipping sweep");
            let count = pass.unreadable;
            pass.record_error("sweep", format!("skipped, {count} remote item(s) unreadable"));
        }

        // Step 5: Export
        if self.export_metadata {
            self.export(principal).await;
        }

        Ok(pass.report)
    }

    // ========================================================================
    // Observe pass
    // ========================================================================

    async fn observe_tree(
        &self,
        pass: &mut CyclePass,
        cancel: &CancellationToken,
    ) -> Result<(), CycleError> {
        let mut listing = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CycleError::Cancelled),
            listing = self.remote.list_tree(&pass.access_token) => listing?,
        };

        let mut pages = 0usize;
        loop {
            let page = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(pages, "Cancelled during enumeration");
                    return Err(CycleError::Cancelled);
                }
                page = listing.next() => page,
            };

            let Some(page) = page else { break };
            let page = page?;
            pages += 1;

            for descriptor in page.entries {
                self.observe_entry(pass, descriptor).await?;
            }
            for item in page.unreadable {
                pass.unreadable += 1;
                let kind = if item.is_folder { "folder" } else { "item" };
                pass.record_error(format!("remote {kind} {}", item.id), item.reason);
            }
        }

        debug!(pages, entries = pass.report.entries_seen, "Enumeration complete");
        Ok(())
    }

    /// Reconciles one observed entry
    ///
    /// Only a rejected token or a store failure is returned as an error;
    /// anything else is recorded in the report and the walk continues.
    async fn observe_entry(
        &self,
        pass: &mut CyclePass,
        descriptor: RemoteEntryDescriptor,
    ) -> Result<(), CycleError> {
        pass.report.entries_seen += 1;

        let previous = self.metadata.get_entry(&pass.principal, &descriptor.id).await?;

        let local_path = match self
            .mirror
            .resolve_local_path(&pass.principal, &descriptor.remote_path)
        {
            Ok(path) => path,
            Err(e) => {
                pass.record_error(&descriptor.remote_path, e);
                return self.keep_previous(pass, previous).await;
            }
        };
        pass.claimed.insert(local_path.clone());

        if descriptor.is_folder {
            self.observe_folder(pass, descriptor, local_path, previous).await
        } else {
            self.observe_file(pass, descriptor, local_path, previous).await
        }
    }

    async fn observe_folder(
        &self,
        pass: &mut CyclePass,
        descriptor: RemoteEntryDescriptor,
        local_path: PathBuf,
        previous: Option<RemoteEntry>,
    ) -> Result<(), CycleError> {
        // Children move one by one; the emptied folder is removed after the sweep
        if let Some(prev) = previous.filter(|p| p.local_path != local_path) {
            pass.vacated.push(prev.local_path);
        }

        if let Err(e) = self.mirror.materialize_folder(&local_path).await {
            pass.record_error(&descriptor.remote_path, e);
        }

        let entry = pass.entry(descriptor, local_path);
        self.metadata.upsert_entry(&entry).await?;
        Ok(())
    }

    async fn observe_file(
        &self,
        pass: &mut CyclePass,
        descriptor: RemoteEntryDescriptor,
        local_path: PathBuf,
        previous: Option<RemoteEntry>,
    ) -> Result<(), CycleError> {
        let moved_from = previous
            .as_ref()
            .filter(|p| p.local_path != local_path)
            .map(|p| p.local_path.clone());
        let content_changed = previous
            .as_ref()
            .map(|p| p.change_token() != descriptor.change_token.as_ref())
            .unwrap_or(true);

        // Unchanged content is moved rather than downloaded again, unless an
        // entry observed earlier in this cycle already took the old path
        let mut present = false;
        match (&moved_from, content_changed) {
            (Some(from), false) if pass.claimed.contains(from) => {
                debug!(from = %from.display(), "Previous location reused this cycle, downloading");
            }
            (Some(from), false) => match self.mirror.relocate(from, &local_path).await {
                Ok(true) => {
                    pass.report.entries_relocated += 1;
                    present = true;
                }
                Ok(false) => {}
                Err(e) => pass.record_error(&descriptor.remote_path, e),
            },
            // Whatever sits at a moved entry's new path belongs to someone else
            (None, false) => present = self.mirror.exists(&local_path).await,
            (_, true) => {}
        }

        if present {
            let entry = pass.entry(descriptor, local_path);
            self.metadata.upsert_entry(&entry).await?;
            return Ok(());
        }

        match self.download(&pass.access_token, &descriptor.id, &local_path).await {
            Ok(bytes) => {
                pass.report.files_downloaded += 1;
                pass.report.bytes_downloaded += bytes;

                if let Some(from) = moved_from {
                    self.remove_quietly(pass, &from).await;
                }

                let entry = pass.entry(descriptor, local_path);
                self.metadata.upsert_entry(&entry).await?;
                Ok(())
            }
            Err(MirrorError::Source(RemoteError::Unauthorized(msg))) => {
                Err(CycleError::ReauthRequired(msg))
            }
            Err(e) => {
                pass.record_error(&descriptor.remote_path, e);
                self.keep_previous(pass, previous).await
            }
        }
    }

    /// Downloads a file into place
    async fn download(
        &self,
        access_token: &str,
        id: &RemoteId,
        local_path: &Path,
    ) -> Result<u64, MirrorError> {
        let content = self.remote.download(access_token, id).await?;
        self.mirror.materialize_file(local_path, content).await
    }

    /// Marks the previously recorded state as seen without adopting the new one
    ///
    /// The old change token is kept, so the next cycle retries the entry. A
    /// never-recorded entry stays unrecorded.
    async fn keep_previous(
        &self,
        pass: &mut CyclePass,
        previous: Option<RemoteEntry>,
    ) -> Result<(), CycleError> {
        let Some(mut entry) = previous else {
            return Ok(());
        };
        pass.claimed.insert(entry.local_path.clone());
        entry.last_seen = pass.marker;
        self.metadata.upsert_entry(&entry).await?;
        Ok(())
    }

    /// Removes the old location of a re-downloaded file
    async fn remove_quietly(&self, pass: &mut CyclePass, path: &Path) {
        if pass.claimed.contains(path) {
            return;
        }
        if let Err(e) = self.mirror.remove_entry(path, false).await {
            warn!(path = %path.display(), error = %e, "Failed to remove previous location");
        }
    }

    // ========================================================================
    // Sweep pass
    // ========================================================================

    async fn sweep(&self, pass: &mut CyclePass) -> Result<(), CycleError> {
        let stale = self
            .metadata
            .entries_older_than(&pass.principal, pass.marker)
            .await?;

        if stale.is_empty() {
            return Ok(());
        }
        debug!(count = stale.len(), "Sweeping entries not seen in this cycle");

        for entry in stale {
            // Another entry now lives at this path; only the row goes
            if !pass.claimed.contains(&entry.local_path) {
                match self
                    .mirror
                    .remove_entry(&entry.local_path, entry.is_folder())
                    .await
                {
                    Ok(RemoveOutcome::Removed) => {
                        debug!(path = %entry.local_path.display(), "Removed local object");
                    }
                    Ok(RemoveOutcome::Missing) => {}
                    Err(MirrorError::NotEmpty(path)) => {
                        warn!(
                            path = %path.display(),
                            "Folder still has content, leaving it in place"
                        );
                    }
                    Err(e) => {
                        // The row stays so the next sweep tries again
                        pass.record_error(&entry.descriptor.remote_path, e);
                        continue;
                    }
                }
            }

            self.metadata.delete_entry(&pass.principal, entry.id()).await?;
            pass.report.entries_deleted += 1;
        }

        Ok(())
    }

    /// Removes the previous locations of moved folders, deepest first
    async fn remove_vacated(&self, pass: &mut CyclePass) {
        let mut vacated = std::mem::take(&mut pass.vacated);
        vacated.sort_by(|a, b| {
            b.components()
                .count()
                .cmp(&a.components().count())
                .then_with(|| b.cmp(a))
        });

        for path in vacated {
            if pass.claimed.contains(&path) {
                continue;
            }
            match self.mirror.remove_entry(&path, true).await {
                Ok(_) => {}
                Err(MirrorError::NotEmpty(path)) => {
                    warn!(path = %path.display(), "Vacated folder still has content");
                }
                Err(e) => pass.record_error(path.display(), e),
            }
        }
    }

    async fn export(&self, principal: &PrincipalId) {
        let path = self.metadata_path(principal);
        let result = match self.metadata.list_entries(principal).await {
            Ok(entries) => write_metadata(&path, &entries).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to export metadata");
        }
    }
}
