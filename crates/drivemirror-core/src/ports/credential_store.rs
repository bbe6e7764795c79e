//! Credential store port (driven/secondary port)
//!
//! Persisted map from principal identifier to the principal and its token
//! triple. No business logic lives here; the AuthManager is the single
//! writer that decides when tokens change.
//!
//! ## Design Notes
//!
//! - `upsert` must replace the whole row in one atomic statement so a
//!   concurrent `get` observes either the old or the new token triple.
//! - Returned principals are owned snapshots.

use crate::domain::{newtypes::PrincipalId, principal::Principal};

#[async_trait::async_trait]
pub trait ICredentialStore: Send + Sync {
    /// Loads the principal with the given id
    async fn get(&self, id: &PrincipalId) -> anyhow::Result<Option<Principal>>;

    /// Inserts or replaces the principal row, keeping its original creation time
    async fn upsert(&self, principal: &Principal) -> anyhow::Result<()>;

    /// Lists every stored principal ordered by id
    async fn list(&self) -> anyhow::Result<Vec<Principal>>;
}
