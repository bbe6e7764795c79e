//! Domain error types
//!
//! [`DomainError`] covers validation of domain values. The remaining enums
//! are the error taxonomy shared between the ports and their adapters, so
//! the engine can decide between re-authentication, skipping an entry, or
//! aborting the cycle without inspecting adapter-specific types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Principal identifier is empty or not usable as a directory name
    #[error("Invalid principal id: {0}")]
    InvalidPrincipalId(String),

    /// Invalid remote path format
    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    /// Invalid remote ID format
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Failures of the credential lifecycle (interactive grant and refresh)
#[derive(Debug, Error)]
pub enum AuthError {
    /// The user declined consent for the device code
    #[error("Authorization denied by the user")]
    Denied,

    /// The device code expired before the user completed sign-in
    #[error("Device code expired before authorization completed")]
    Expired,

    /// Network or protocol failure talking to the identity provider
    #[error("Identity provider transport error: {0}")]
    Transport(String),

    /// The refresh token was rejected; a new interactive login is needed
    #[error("Re-authentication required: {0}")]
    ReauthRequired(String),

    /// No stored credential for the principal
    #[error("Unknown principal: {0}")]
    UnknownPrincipal(String),

    /// Credential persistence failed
    #[error("Credential storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Failures reported by a remote store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The access token was rejected (HTTP 401)
    #[error("Remote rejected the access token: {0}")]
    Unauthorized(String),

    /// Transient network or server-side failure
    #[error("Remote transport error: {0}")]
    Transport(String),

    /// The requested item no longer exists remotely
    #[error("Remote item not found: {0}")]
    NotFound(String),

    /// The remote answered with something that could not be interpreted
    #[error("Invalid remote response: {0}")]
    InvalidResponse(String),
}

/// Failures of local mirror operations
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Folder removal refused because the folder still has content
    #[error("Directory not empty: {0}")]
    NotEmpty(PathBuf),

    /// No space left on the device
    #[error("Disk full while writing {0}")]
    DiskFull(PathBuf),

    /// Insufficient filesystem permissions
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// A remote path could not be mapped under the principal root
    #[error("Invalid local path: {0}")]
    InvalidPath(String),

    /// The content stream failed mid-transfer
    #[error("Content source failed: {0}")]
    Source(#[from] RemoteError),

    /// Any other I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MirrorError {
    /// Classifies an I/O error raised while operating on `path`
    pub fn from_io(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => MirrorError::PermissionDenied(path.into()),
            // ENOSPC
            _ if err.raw_os_error() == Some(28) => MirrorError::DiskFull(path.into()),
            _ => MirrorError::Io(err),
        }
    }
}
