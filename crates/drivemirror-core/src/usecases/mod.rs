//! Use cases (interactors) for drivemirror
//!
//! Use cases orchestrate domain entities and port interfaces. They are
//! thin coordinators that delegate business rules to domain methods and
//! I/O to ports.
//!
//! ## Use Cases
//!
//! - [`AuthManager`] - Device-code login and single-writer token refresh
//! - [`StatusQuery`] - Read-only view of principals and their sync status

pub mod auth_manager;
pub mod status_query;

pub use auth_manager::AuthManager;
pub use status_query::{PrincipalSummary, StatusQuery};
