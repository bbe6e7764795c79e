//! Local mirror port (driven/secondary port)
//!
//! Maps remote paths onto the per-principal root and performs the few
//! filesystem operations reconciliation needs.
//!
//! ## Design Notes
//!
//! - `resolve_local_path` is pure; everything else touches the disk.
//! - Calls for different paths may run concurrently. The engine never
//!   issues two calls for the same path at once.
//! - Folder removal is never recursive.

use std::path::{Path, PathBuf};

use crate::domain::{
    errors::MirrorError,
    newtypes::{PrincipalId, RemotePath},
};

use super::remote_store::ContentStream;

/// What [`ILocalMirror::remove_entry`] found on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// Nothing existed at the path
    Missing,
}

#[async_trait::async_trait]
pub trait ILocalMirror: Send + Sync {
    /// Directory that receives the principal's mirrored tree
    fn principal_root(&self, principal: &PrincipalId) -> PathBuf;

    /// Local path of a remote path, without touching the disk
    fn resolve_local_path(
        &self,
        principal: &PrincipalId,
        remote_path: &RemotePath,
    ) -> Result<PathBuf, MirrorError>;

    /// Ensures a directory exists (idempotent)
    async fn materialize_folder(&self, path: &Path) -> Result<(), MirrorError>;

    /// Writes `content` to `path` with atomic-replace semantics
    ///
    /// Returns the number of bytes written. On failure the previous file at
    /// `path`, if any, is left untouched.
    async fn materialize_file(
        &self,
        path: &Path,
        content: ContentStream,
    ) -> Result<u64, MirrorError>;

    /// Moves an existing object to a new path
    ///
    /// Returns `false` without error when `from` does not exist.
    async fn relocate(&self, from: &Path, to: &Path) -> Result<bool, MirrorError>;

    /// Removes a file or an empty folder
    async fn remove_entry(&self, path: &Path, is_folder: bool) -> Result<RemoveOutcome, MirrorError>;

    /// Whether something exists at `path`
    async fn exists(&self, path: &Path) -> bool;
}
