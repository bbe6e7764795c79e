//! Principal domain entity
//!
//! A [`Principal`] is one authenticated identity on whose behalf a remote
//! tree is mirrored. It owns the token triple used to call the remote store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::PrincipalId;

/// Access/refresh token pair with the absolute expiry of the access token
///
/// The triple is always replaced as a whole; a reader never sees an access
/// token paired with the expiry of another one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer token presented to the remote store
    pub access_token: String,
    /// Token exchanged for a new access token; absent if the grant issued none
    pub refresh_token: Option<String>,
    /// When the access token stops being accepted
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Returns true if the access token is already expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the access token expires within the given margin
    pub fn expires_within(&self, margin: Duration) -> bool {
        Utc::now() + margin >= self.expires_at
    }
}

/// Profile of the signed-in user as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalProfile {
    /// Verified email, becomes the principal identifier
    pub email: String,
    /// Human-readable name
    pub display_name: String,
    /// Identifier assigned by the remote system
    pub remote_user_id: String,
}

/// One authenticated identity and its current credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    id: PrincipalId,
    remote_user_id: String,
    display_name: String,
    tokens: TokenSet,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Principal {
    /// Creates a principal from a freshly completed grant
    pub fn new(
        id: PrincipalId,
        remote_user_id: impl Into<String>,
        display_name: impl Into<String>,
        tokens: TokenSet,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            remote_user_id: remote_user_id.into(),
            display_name: display_name.into(),
            tokens,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstructs a principal from persisted state
    pub fn restore(
        id: PrincipalId,
        remote_user_id: String,
        display_name: String,
        tokens: TokenSet,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            remote_user_id,
            display_name,
            tokens,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> &PrincipalId {
        &self.id
    }

    pub fn remote_user_id(&self) -> &str {
        &self.remote_user_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Replaces the token triple after a refresh
    ///
    /// A refresh response without a refresh token keeps the previous one.
    pub fn replace_tokens(&mut self, mut tokens: TokenSet) {
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = self.tokens.refresh_token.take();
        }
        self.tokens = tokens;
        self.updated_at = Utc::now();
    }
}
