//! Domain entities and business rules
//!
//! - Newtypes for identifiers and validated values
//! - [`Principal`] and its [`TokenSet`]
//! - [`RemoteEntry`] / [`RemoteEntryDescriptor`] for the mirrored tree
//! - [`SyncStatus`] and its state machine
//! - Error taxonomy shared by ports and adapters

pub mod errors;
pub mod newtypes;
pub mod principal;
pub mod remote_entry;
pub mod sync_status;

// Re-export commonly used types
pub use errors::{AuthError, DomainError, MirrorError, RemoteError};
pub use newtypes::*;
pub use principal::{Principal, PrincipalProfile, TokenSet};
pub use remote_entry::{RemoteEntry, RemoteEntryDescriptor};
pub use sync_status::{SyncState, SyncStatus};
