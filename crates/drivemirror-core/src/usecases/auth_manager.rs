//! Credential lifecycle use case
//!
//! Obtains the initial credential of a principal through the device-code
//! grant and keeps it valid by refreshing ahead of expiry.
//!
//! `AuthManager` is the only writer of token triples. Refreshes are
//! serialized behind a writer lock and every caller re-reads the stored
//! principal after acquiring it, so N concurrent callers that all see an
//! expiring token still cause a single refresh call. Readers that do not
//! need a refresh never take the lock.

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    domain::{AuthError, Principal, PrincipalId},
    ports::{ICredentialStore, IIdentityProvider, PendingGrant},
};

/// Refresh when the access token expires within this window
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 300;

pub struct AuthManager {
    identity: Arc<dyn IIdentityProvider>,
    credentials: Arc<dyn ICredentialStore>,
    refresh_margin: Duration,
    refresh_lock: Mutex<()>,
}

impl AuthManager {
    pub fn new(
        identity: Arc<dyn IIdentityProvider>,
        credentials: Arc<dyn ICredentialStore>,
    ) -> Self {
        Self {
            identity,
            credentials,
            refresh_margin: Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Overrides the safety margin used by [`AuthManager::ensure_fresh_token`]
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Starts a device-code grant
    ///
    /// Nothing is persisted until [`AuthManager::complete_interactive_auth`]
    /// succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn begin_interactive_auth(&self) -> Result<PendingGrant, AuthError> {
        let grant = self.identity.begin_device_authorization().await?;
        info!(
            verification_uri = %grant.verification_uri,
            expires_at = %grant.expires_at,
            "Device authorization started"
        );
        Ok(grant)
    }

    /// Waits for the user to finish the grant and stores the principal
    ///
    /// A returning principal keeps its creation time; its profile and
    /// tokens are replaced.
    ///
    /// # Errors
    ///
    /// `Denied`, `Expired` and `Transport` leave stored state untouched.
    #[tracing::instrument(skip(self, grant), fields(user_code = %grant.user_code))]
    pub async fn complete_interactive_auth(
        &self,
        grant: &PendingGrant,
    ) -> Result<Principal, AuthError> {
        // Step 1: Poll the token endpoint until the grant resolves
        let tokens = self.identity.complete_device_authorization(grant).await?;

        // Step 2: Resolve who signed in
        let profile = self.identity.fetch_profile(&tokens.access_token).await?;
        let id = PrincipalId::new(profile.email.as_str()).map_err(|e| {
            AuthError::Transport(format!("profile carries no usable identifier: {e}"))
        })?;

        // Step 3: Persist, keeping the original creation time of a returning principal
        let principal = match self.credentials.get(&id).await? {
            Some(existing) => Principal::restore(
                id,
                profile.remote_user_id,
                profile.display_name,
                tokens,
                existing.created_at(),
                chrono::Utc::now(),
            ),
            None => Principal::new(id, profile.remote_user_id, profile.display_name, tokens),
        };
        self.credentials.upsert(&principal).await?;

        info!(principal = %principal.id(), "Principal authenticated");
        Ok(principal)
    }

    /// Returns an access token valid for at least the refresh margin
    ///
    /// # Errors
    ///
    /// - `UnknownPrincipal` if no credential is stored
    /// - `ReauthRequired` if the refresh token is missing or was rejected.
    ///   It is never retried here.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_fresh_token(&self, id: &PrincipalId) -> Result<String, AuthError> {
        let principal = self.load(id).await?;
        if !principal.tokens().expires_within(self.refresh_margin) {
            return Ok(principal.tokens().access_token.clone());
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock
        let mut principal = self.load(id).await?;
        if !principal.tokens().expires_within(self.refresh_margin) {
            debug!("Token refreshed by a concurrent caller");
            return Ok(principal.tokens().access_token.clone());
        }

        let refresh_token = principal.tokens().refresh_token.clone().ok_or_else(|| {
            AuthError::ReauthRequired(format!("no refresh token stored for {id}"))
        })?;

        let tokens = match self.identity.refresh(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                return Err(e);
            }
        };

        principal.replace_tokens(tokens);
        self.credentials.upsert(&principal).await?;

        info!(expires_at = %principal.tokens().expires_at, "Access token refreshed");
        Ok(principal.tokens().access_token.clone())
    }

    async fn load(&self, id: &PrincipalId) -> Result<Principal, AuthError> {
        self.credentials
            .get(id)
            .await?
            .ok_or_else(|| AuthError::UnknownPrincipal(id.to_string()))
    }
}
