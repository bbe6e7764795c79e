//! Remote store port (driven/secondary port)
//!
//! The engine only knows this abstraction of the cloud drive: a one-pass,
//! paged walk of the whole tree and a streamed download of file content.
//!
//! ## Design Notes
//!
//! - Pages are the cancellation points of an enumeration.
//! - A listing is not restartable mid-stream; calling [`IRemoteStore::list_tree`]
//!   again re-walks from the root.
//! - A rejected access token is reported as [`RemoteError::Unauthorized`],
//!   never folded into [`RemoteError::Transport`].
//! - Items the store cannot map to a descriptor are still reported, as
//!   [`UnreadableEntry`], so the walk is known to be incomplete.

use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

use crate::domain::{errors::RemoteError, newtypes::RemoteId, remote_entry::RemoteEntryDescriptor};

/// A listed item that could not be turned into a descriptor
///
/// For a folder, its subtree was not walked either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableEntry {
    /// Raw identifier as listed, possibly invalid
    pub id: String,
    pub is_folder: bool,
    pub reason: String,
}

/// One page of a tree walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreePage {
    pub entries: Vec<RemoteEntryDescriptor>,
    pub unreadable: Vec<UnreadableEntry>,
}

impl TreePage {
    /// Returns true if every listed item was mapped
    pub fn is_complete(&self) -> bool {
        self.unreadable.is_empty()
    }
}

impl From<Vec<RemoteEntryDescriptor>> for TreePage {
    fn from(entries: Vec<RemoteEntryDescriptor>) -> Self {
        Self {
            entries,
            unreadable: Vec::new(),
        }
    }
}

/// Lazy sequence of pages produced by a tree walk
pub type TreeListing = Pin<Box<dyn Stream<Item = Result<TreePage, RemoteError>> + Send>>;

/// Streamed file content
pub type ContentStream = Pin<Box<dyn Stream<Item = Result<Bytes, RemoteError>> + Send>>;

#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Starts a recursive walk of the remote tree from its root
    async fn list_tree(&self, access_token: &str) -> Result<TreeListing, RemoteError>;

    /// Opens the content of a file
    async fn download(
        &self,
        access_token: &str,
        id: &RemoteId,
    ) -> Result<ContentStream, RemoteError>;
}
