//! Local mirror adapter (secondary/driven adapter)
//!
//! Implements [`ILocalMirror`] on top of `tokio::fs`.
//!
//! ## Design Decisions
//!
//! - **Per-principal root**: `<base_root>/<principal>/onedrive`.
//! - **Atomic replace**: content is streamed into `<name>.partial` in the
//!   target directory, fsynced, then renamed over the target. Readers see
//!   either the previous file or the complete new one.
//! - **Non-recursive removal**: a folder that still has content is reported
//!   as [`MirrorError::NotEmpty`] and left alone.

use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use drivemirror_core::{
    domain::{MirrorError, PrincipalId, RemotePath},
    ports::{ContentStream, ILocalMirror, RemoveOutcome},
};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// Directory name of the mirrored tree inside a principal directory
pub const MIRROR_DIR_NAME: &str = "onedrive";

/// Suffix of in-flight downloads
const PARTIAL_SUFFIX: &str = ".partial";

/// ENOTEMPTY on Linux and macOS
const ENOTEMPTY_CODES: [i32; 2] = [39, 66];

/// Adapter that bridges the [`ILocalMirror`] port to the real filesystem
#[derive(Debug, Clone)]
pub struct LocalMirror {
    base_root: PathBuf,
}

impl LocalMirror {
    /// Creates a mirror whose principal directories live under `base_root`
    pub fn new(base_root: impl Into<PathBuf>) -> Self {
        Self {
            base_root: base_root.into(),
        }
    }

    pub fn base_root(&self) -> &Path {
        &self.base_root
    }

    /// Directory holding everything written for a principal
    ///
    /// The mirror root and the metadata export both live here.
    pub fn principal_dir(&self, principal: &PrincipalId) -> PathBuf {
        self.base_root.join(principal.as_str())
    }
}

/// Path of the temporary file used while `target` is being written
fn partial_path(target: &Path) -> PathBuf {
    let mut name: OsString = target.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

fn is_not_empty(err: &std::io::Error) -> bool {
    err.raw_os_error()
        .map(|code| ENOTEMPTY_CODES.contains(&code))
        .unwrap_or(false)
}

/// Streams `content` into `tmp` and flushes it to disk
async fn write_partial(tmp: &Path, mut content: ContentStream) -> Result<u64, MirrorError> {
    let mut file = tokio::fs::File::create(tmp)
        .await
        .map_err(|e| MirrorError::from_io(e, tmp))?;

    let mut written = 0u64;
    while let Some(chunk) = content.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| MirrorError::from_io(e, tmp))?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| MirrorError::from_io(e, tmp))?;
    file.sync_all()
        .await
        .map_err(|e| MirrorError::from_io(e, tmp))?;
    Ok(written)
}

#[async_trait::async_trait]
impl ILocalMirror for LocalMirror {
    fn principal_root(&self, principal: &PrincipalId) -> PathBuf {
        self.principal_dir(principal).join(MIRROR_DIR_NAME)
    }

    fn resolve_local_path(
        &self,
        principal: &PrincipalId,
        remote_path: &RemotePath,
    ) -> Result<PathBuf, MirrorError> {
        let mut local = self.principal_root(principal);

        for component in remote_path.components() {
            // A name like "C:" or one carrying a separator would not stay a
            // single normal component once handed to the OS
            let mut parts = Path::new(component).components();
            match (parts.next(), parts.next()) {
                (Some(Component::Normal(part)), None) => local.push(part),
                _ => {
                    return Err(MirrorError::InvalidPath(format!(
                        "{remote_path}: component {component:?} cannot be mapped"
                    )))
                }
            }
        }

        Ok(local)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn materialize_folder(&self, path: &Path) -> Result<(), MirrorError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| MirrorError::from_io(e, path))
    }

    #[instrument(skip(self, content), fields(path = %path.display()))]
    async fn materialize_file(
        &self,
        path: &Path,
        content: ContentStream,
    ) -> Result<u64, MirrorError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MirrorError::from_io(e, parent))?;
        }

        let tmp = partial_path(path);
        debug!(tmp = %tmp.display(), "Writing to temporary file");

        let result = match write_partial(&tmp, content).await {
            Ok(bytes) => tokio::fs::rename(&tmp, path)
                .await
                .map(|()| bytes)
                .map_err(|e| MirrorError::from_io(e, path)),
            Err(e) => Err(e),
        };

        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(&tmp).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!(tmp = %tmp.display(), error = %e, "Failed to remove partial file");
                }
            }
        }

        if let Ok(bytes) = result {
            debug!(bytes, "File materialized");
        }
        result
    }

    #[instrument(skip(self), fields(from = %from.display(), to = %to.display()))]
    async fn relocate(&self, from: &Path, to: &Path) -> Result<bool, MirrorError> {
        if !self.exists(from).await {
            debug!("Source is gone, nothing to relocate");
            return Ok(false);
        }

        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MirrorError::from_io(e, parent))?;
        }

        tokio::fs::rename(from, to)
            .await
            .map_err(|e| MirrorError::from_io(e, to))?;
        debug!("Relocated");
        Ok(true)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn remove_entry(&self, path: &Path, is_folder: bool) -> Result<RemoveOutcome, MirrorError> {
        let result = if is_folder {
            tokio::fs::remove_dir(path).await
        } else {
            tokio::fs::remove_file(path).await
        };

        match result {
            Ok(()) => Ok(RemoveOutcome::Removed),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(RemoveOutcome::Missing),
            Err(e) if is_folder && is_not_empty(&e) => Err(MirrorError::NotEmpty(path.to_path_buf())),
            Err(e) => Err(MirrorError::from_io(e, path)),
        }
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::symlink_metadata(path).await.is_ok()
    }
}
