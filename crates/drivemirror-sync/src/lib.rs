//! drivemirror Sync - Remote-to-local reconciliation
//!
//! Provides:
//! - A local mirror adapter rooted per principal
//! - The mark-and-sweep reconciliation cycle
//! - The `metadata.json` export written after each successful cycle
//!
//! ## Modules
//!
//! - [`engine`] - One reconciliation cycle per principal
//! - [`mirror`] - Local filesystem adapter (atomic replace, non-recursive removal)
//! - [`export`] - Per-principal metadata file

pub mod engine;
pub mod export;
pub mod mirror;

use drivemirror_core::domain::{AuthError, RemoteError};
use thiserror::Error;

pub use engine::{CycleReport, SyncEngine};
pub use mirror::LocalMirror;

/// Errors that end a reconciliation cycle
///
/// Everything except [`CycleError::AlreadyRunning`] is also recorded in the
/// principal's sync status before it is returned.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Another cycle holds the running status; nothing was done
    #[error("A cycle is already running for {0}")]
    AlreadyRunning(String),

    /// The credential can no longer be refreshed, or the remote rejected it
    #[error("Re-authentication required: {0}")]
    ReauthRequired(String),

    /// The enumeration failed before reaching its end
    #[error("Remote enumeration failed: {0}")]
    Remote(RemoteError),

    /// Cancelled before the enumeration completed
    #[error("cycle cancelled")]
    Cancelled,

    /// No stored credential for the principal
    #[error("Unknown principal: {0}")]
    UnknownPrincipal(String),

    /// Metadata or credential persistence failed
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl CycleError {
    /// Returns true if the user has to sign in again before the next cycle
    pub fn needs_reauth(&self) -> bool {
        matches!(self, CycleError::ReauthRequired(_))
    }
}

impl From<AuthError> for CycleError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::ReauthRequired(msg) => CycleError::ReauthRequired(msg),
            AuthError::UnknownPrincipal(id) => CycleError::UnknownPrincipal(id),
            AuthError::Storage(e) => CycleError::Storage(e),
            other => CycleError::Remote(RemoteError::Transport(other.to_string())),
        }
    }
}

impl From<RemoteError> for CycleError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unauthorized(msg) => CycleError::ReauthRequired(msg),
            other => CycleError::Remote(other),
        }
    }
}
