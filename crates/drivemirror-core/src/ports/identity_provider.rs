//! Identity provider port (driven/secondary port)
//!
//! Headless device-code grant, refresh-token exchange and profile lookup
//! against the remote identity platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    errors::AuthError,
    principal::{PrincipalProfile, TokenSet},
};

/// A device-code grant waiting for the user to sign in
///
/// `verification_uri` and `user_code` are what the user needs; the rest
/// is the polling handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingGrant {
    pub verification_uri: String,
    pub user_code: String,
    /// Provider-formatted instruction, if it sent one
    pub message: Option<String>,
    pub device_code: String,
    /// Seconds to wait between polls
    pub interval_secs: u64,
    pub expires_at: DateTime<Utc>,
}

impl PendingGrant {
    /// Instruction to show the user
    pub fn instructions(&self) -> String {
        self.message.clone().unwrap_or_else(|| {
            format!(
                "To sign in, open {} and enter the code {}",
                self.verification_uri, self.user_code
            )
        })
    }
}

#[async_trait::async_trait]
pub trait IIdentityProvider: Send + Sync {
    /// Starts a device-code grant
    async fn begin_device_authorization(&self) -> Result<PendingGrant, AuthError>;

    /// Polls until the grant completes, is denied, or expires
    async fn complete_device_authorization(
        &self,
        grant: &PendingGrant,
    ) -> Result<TokenSet, AuthError>;

    /// Exchanges a refresh token at the token endpoint
    ///
    /// An invalid-grant answer maps to [`AuthError::ReauthRequired`].
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError>;

    /// Resolves the signed-in user's profile
    async fn fetch_profile(&self, access_token: &str) -> Result<PrincipalProfile, AuthError>;
}
