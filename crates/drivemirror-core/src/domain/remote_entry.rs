//! Remote tree entries
//!
//! [`RemoteEntryDescriptor`] is what a remote store reports while listing
//! its tree. [`RemoteEntry`] is the last observed state of one descriptor
//! as recorded for a principal, together with where it lives on disk and
//! the cycle that last saw it.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{ChangeToken, CycleMarker, PrincipalId, RemoteId, RemotePath};

/// A file or folder as reported by one remote listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntryDescriptor {
    pub id: RemoteId,
    pub name: String,
    pub is_folder: bool,
    /// Size in bytes; only meaningful for files
    pub size: Option<u64>,
    pub parent_id: Option<RemoteId>,
    pub remote_path: RemotePath,
    pub change_token: Option<ChangeToken>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub modified_by: Option<String>,
}

impl RemoteEntryDescriptor {
    /// Minimal folder descriptor
    pub fn folder(id: RemoteId, remote_path: RemotePath) -> Self {
        Self::bare(id, remote_path, true)
    }

    /// Minimal file descriptor
    pub fn file(id: RemoteId, remote_path: RemotePath, size: u64, token: ChangeToken) -> Self {
        let mut d = Self::bare(id, remote_path, false);
        d.size = Some(size);
        d.change_token = Some(token);
        d
    }

    fn bare(id: RemoteId, remote_path: RemotePath, is_folder: bool) -> Self {
        let name = remote_path
            .components()
            .last()
            .unwrap_or_default()
            .to_string();
        Self {
            id,
            name,
            is_folder,
            size: None,
            parent_id: None,
            remote_path,
            change_token: None,
            created_at: None,
            modified_at: None,
            created_by: None,
            modified_by: None,
        }
    }
}

/// Last observed state of a remote entry for one principal
///
/// Identity key: (`principal_id`, `descriptor.id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub principal_id: PrincipalId,
    pub descriptor: RemoteEntryDescriptor,
    pub local_path: PathBuf,
    pub last_seen: CycleMarker,
}

impl RemoteEntry {
    pub fn new(
        principal_id: PrincipalId,
        descriptor: RemoteEntryDescriptor,
        local_path: PathBuf,
        last_seen: CycleMarker,
    ) -> Self {
        Self {
            principal_id,
            descriptor,
            local_path,
            last_seen,
        }
    }

    pub fn id(&self) -> &RemoteId {
        &self.descriptor.id
    }

    pub fn is_folder(&self) -> bool {
        self.descriptor.is_folder
    }

    pub fn change_token(&self) -> Option<&ChangeToken> {
        self.descriptor.change_token.as_ref()
    }

    /// Returns true if the entry was not observed during `marker`'s pass
    pub fn is_stale(&self, marker: CycleMarker) -> bool {
        self.last_seen < marker
    }
}
