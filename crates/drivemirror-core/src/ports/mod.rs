//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the traits the use cases and the sync engine depend on; the
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ICredentialStore`] - Principals and their token triple
//! - [`IMetadataStore`] - Remote entries and sync status
//! - [`IRemoteStore`] - Tree listing and content download
//! - [`IIdentityProvider`] - Device-code grant, refresh and profile
//! - [`ILocalMirror`] - Local filesystem operations under a principal root

pub mod credential_store;
pub mod identity_provider;
pub mod local_mirror;
pub mod metadata_store;
pub mod remote_store;

pub use credential_store::ICredentialStore;
pub use identity_provider::{IIdentityProvider, PendingGrant};
pub use local_mirror::{ILocalMirror, RemoveOutcome};
pub use metadata_store::{BeginCycle, IMetadataStore};
pub use remote_store::{ContentStream, IRemoteStore, TreeListing, TreePage, UnreadableEntry};
