//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// PrincipalId
// ============================================================================

/// Stable identifier of an authenticated principal (the verified email)
///
/// The value is also used as a directory name under the mirror base root,
/// so it must not contain path separators or be a relative component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Create a new PrincipalId
    ///
    /// Surrounding whitespace is trimmed and the value is lowercased, since
    /// providers report the same mailbox with varying case.
    ///
    /// # Errors
    /// Returns error if the id is empty or not usable as a directory name
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into().trim().to_lowercase();

        if id.is_empty() {
            return Err(DomainError::InvalidPrincipalId(
                "Principal id cannot be empty".to_string(),
            ));
        }

        if id == "." || id == ".." || id.contains('/') || id.contains('\\') || id.contains('\0') {
            return Err(DomainError::InvalidPrincipalId(format!(
                "Principal id is not a valid directory name: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PrincipalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PrincipalId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PrincipalId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PrincipalId> for String {
    fn from(id: PrincipalId) -> Self {
        id.0
    }
}

// ============================================================================
// RemoteId
// ============================================================================

/// Identifier assigned to a file or folder by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    /// Create a new RemoteId
    ///
    /// # Errors
    /// Returns error if the id is empty or contains whitespace
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "Remote id cannot be empty".to_string(),
            ));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidRemoteId(format!(
                "Remote id contains whitespace: {id}"
            )));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// RemotePath
// ============================================================================

/// Logical path of an entry inside the remote tree, rooted at `/`
///
/// Backslashes are normalized to `/` and repeated separators collapsed.
/// `.` and `..` components are rejected so a remote path can never escape
/// the principal root once mapped onto disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemotePath(String);

impl RemotePath {
    /// Create a new RemotePath
    ///
    /// # Errors
    /// Returns error if the path is not absolute or contains relative components
    pub fn new(path: impl Into<String>) -> Result<Self, DomainError> {
        let path = path.into().replace('\\', "/");

        if !path.starts_with('/') {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path must start with '/': {path}"
            )));
        }

        let mut normalized = String::with_capacity(path.len());
        for component in path.split('/').filter(|c| !c.is_empty()) {
            if component == "." || component == ".." {
                return Err(DomainError::InvalidRemotePath(format!(
                    "Remote path contains invalid traversal: {path}"
                )));
            }
            normalized.push('/');
            normalized.push_str(component);
        }

        if normalized.is_empty() {
            normalized.push('/');
        }

        Ok(Self(normalized))
    }

    /// Create the root path "/"
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Returns true for the root path
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join a single path component (an entry name)
    ///
    /// # Errors
    /// Returns error if component is empty, contains a separator or is relative
    pub fn join(&self, component: &str) -> Result<Self, DomainError> {
        if component.is_empty()
            || component.contains('/')
            || component.contains('\\')
            || component == "."
            || component == ".."
        {
            return Err(DomainError::InvalidRemotePath(format!(
                "Invalid path component: {component}"
            )));
        }

        let new_path = if self.is_root() {
            format!("/{component}")
        } else {
            format!("{}/{component}", self.0)
        };

        Ok(Self(new_path))
    }

    /// Iterates the non-empty components of the path
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// Number of components; the root has depth 0
    #[must_use]
    pub fn depth(&self) -> usize {
        self.components().count()
    }
}

impl Display for RemotePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ChangeToken
// ============================================================================

/// Opaque value (an entity tag) that changes whenever a file's content changes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(String);

impl ChangeToken {
    /// Create a new ChangeToken
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChangeToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CycleMarker
// ============================================================================

/// Identifies one reconciliation pass of a principal
///
/// Markers increase monotonically per principal. An entry whose last-seen
/// marker is lower than the marker of the current pass was not re-observed
/// by it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CycleMarker(i64);

impl CycleMarker {
    /// Create a marker from its stored value
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// The marker following this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Get the inner value
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl Display for CycleMarker {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
