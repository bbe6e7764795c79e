//! OAuth2 device authorization grant for Microsoft identity platform
//!
//! Implements the headless device-code flow (RFC 8628): the user opens a
//! verification page on any device and types a short code while this
//! process polls the token endpoint.
//!
//! ## Components
//!
//! - [`DeviceCodeConfig`] - Application credentials and endpoints
//! - [`GraphIdentityProvider`] - `IIdentityProvider` implementation using
//!   the `oauth2` crate for the grant and refresh, and Graph `/me` for the
//!   profile

use std::{fmt, time::Duration as StdDuration};

use chrono::{Duration, Utc};
use drivemirror_core::{
    domain::{AuthError, PrincipalProfile, TokenSet},
    ports::{IIdentityProvider, PendingGrant},
};
use oauth2::{
    basic::{BasicClient, BasicErrorResponseType},
    AuthType, ClientId, ClientSecret, DeviceAuthorizationResponse, DeviceAuthorizationUrl,
    DeviceCodeErrorResponseType, EndpointNotSet, EndpointSet, ExtraDeviceAuthorizationFields,
    RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::GraphClient;

/// Default OAuth2 scopes for read-only OneDrive access
pub const DEFAULT_SCOPES: &[&str] = &["Files.Read.All", "User.Read", "offline_access"];

/// Stand-in for the client secret in debug output
const REDACTED: &str = "<redacted>";

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

// ============================================================================
// DeviceCodeConfig
// ============================================================================

/// Configuration for the device authorization grant
#[derive(Clone)]
pub struct DeviceCodeConfig {
    /// Application (client) ID from the app registration
    pub client_id: String,
    /// Secret of a confidential client registration, if any
    pub client_secret: Option<String>,
    /// Device authorization endpoint
    pub device_code_url: String,
    /// Token endpoint
    pub token_url: String,
    /// OAuth scopes to request
    pub scopes: Vec<String>,
}

impl DeviceCodeConfig {
    /// Creates a config with the default scopes and no client secret
    pub fn new(
        client_id: impl Into<String>,
        device_code_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            device_code_url: device_code_url.into(),
            token_url: token_url.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Creates a config with custom scopes
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Sets the client secret
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }
}

impl fmt::Debug for DeviceCodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCodeConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| REDACTED))
            .field("device_code_url", &self.device_code_url)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Fields Microsoft adds to the device authorization response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MicrosoftDeviceFields {
    /// Ready-to-display instruction containing the URL and the code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExtraDeviceAuthorizationFields for MicrosoftDeviceFields {}

type DeviceDetails = DeviceAuthorizationResponse<MicrosoftDeviceFields>;

type DeviceClient =
    BasicClient<EndpointNotSet, EndpointSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

// ============================================================================
// GraphIdentityProvider
// ============================================================================

/// Identity provider backed by Microsoft identity platform and Graph
pub struct GraphIdentityProvider {
    client: DeviceClient,
    client_id: String,
    confidential: bool,
    scopes: Vec<String>,
    /// Client used for token endpoint calls; redirects disabled
    http: reqwest::Client,
    graph: GraphClient,
}

impl GraphIdentityProvider {
    /// Creates a provider from the grant configuration and a Graph client
    /// used for the profile lookup
    pub fn new(config: &DeviceCodeConfig, graph: GraphClient) -> Result<Self, AuthError> {
        let device_url = DeviceAuthorizationUrl::new(config.device_code_url.clone())
            .map_err(|e| AuthError::Transport(format!("Invalid device code URL: {e}")))?;
        let token_url = TokenUrl::new(config.token_url.clone())
            .map_err(|e| AuthError::Transport(format!("Invalid token URL: {e}")))?;

        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_device_authorization_url(device_url)
            .set_token_uri(token_url);
        let client = match &config.client_secret {
            Some(secret) => client.set_client_secret(ClientSecret::new(secret.clone())),
            None => client,
        };

        // The token endpoint never redirects; following one would leak the code
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            client_id: config.client_id.clone(),
            confidential: config.client_secret.is_some(),
            scopes: config.scopes.clone(),
            http,
            graph,
        })
    }

    fn scopes(&self) -> impl Iterator<Item = Scope> + '_ {
        self.scopes.iter().map(|s| Scope::new(s.clone()))
    }
}

impl fmt::Debug for GraphIdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphIdentityProvider")
            .field("client_id", &self.client_id)
            .field("confidential", &self.confidential)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// Converts a token endpoint response into a token triple
///
/// A missing `expires_in` is treated as one hour.
fn token_set(response: &impl TokenResponse) -> TokenSet {
    let expires_at = response
        .expires_in()
        .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64))
        .unwrap_or_else(|| Utc::now() + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));

    TokenSet {
        access_token: response.access_token().secret().to_string(),
        refresh_token: response.refresh_token().map(|t| t.secret().to_string()),
        expires_at,
    }
}

/// Rebuilds the oauth2 device response from a stored pending grant
fn device_details(grant: &PendingGrant) -> Result<DeviceDetails, AuthError> {
    let remaining = (grant.expires_at - Utc::now()).num_seconds().max(0);
    serde_json::from_value(serde_json::json!({
        "device_code": grant.device_code,
        "user_code": grant.user_code,
        "verification_uri": grant.verification_uri,
        "expires_in": remaining,
        "interval": grant.interval_secs,
        "message": grant.message,
    }))
    .map_err(|e| AuthError::Transport(format!("Invalid pending grant: {e}")))
}

#[async_trait::async_trait]
impl IIdentityProvider for GraphIdentityProvider {
    async fn begin_device_authorization(&self) -> Result<PendingGrant, AuthError> {
        info!("Requesting device code");

        let details: DeviceDetails = self
            .client
            .exchange_device_code()
            .add_scopes(self.scopes())
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::Transport(format!("Device code request failed: {e}")))?;

        let expires_in = details.expires_in();
        let grant = PendingGrant {
            verification_uri: details.verification_uri().to_string(),
            user_code: details.user_code().secret().to_string(),
            message: details.extra_fields().message.clone(),
            device_code: details.device_code().secret().to_string(),
            interval_secs: details.interval().as_secs().max(1),
            expires_at: Utc::now() + Duration::seconds(expires_in.as_secs() as i64),
        };

        debug!(expires_in_secs = expires_in.as_secs(), "Device code issued");
        Ok(grant)
    }

    async fn complete_device_authorization(
        &self,
        grant: &PendingGrant,
    ) -> Result<TokenSet, AuthError> {
        let details = device_details(grant)?;
        let timeout = (grant.expires_at - Utc::now())
            .to_std()
            .unwrap_or(StdDuration::ZERO);

        let result = self
            .client
            .exchange_device_access_token(&details)
            .request_async(&self.http, tokio::time::sleep, Some(timeout))
            .await;

        match result {
            Ok(response) => {
                info!("Device authorization completed");
                Ok(token_set(&response))
            }
            Err(RequestTokenError::ServerResponse(resp)) => match resp.error() {
                DeviceCodeErrorResponseType::AccessDenied => Err(AuthError::Denied),
                DeviceCodeErrorResponseType::ExpiredToken => Err(AuthError::Expired),
                other => Err(AuthError::Transport(format!(
                    "Token endpoint rejected the device code: {other:?}"
                ))),
            },
            // Polling gives up on its own once the code's lifetime is spent
            Err(_) if Utc::now() >= grant.expires_at => Err(AuthError::Expired),
            Err(e) => Err(AuthError::Transport(format!(
                "Device token request failed: {e}"
            ))),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        info!("Refreshing access token");

        let result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .add_scopes(self.scopes())
            .request_async(&self.http)
            .await;

        match result {
            Ok(response) => Ok(token_set(&response)),
            Err(RequestTokenError::ServerResponse(resp)) => {
                let description = resp
                    .error_description()
                    .cloned()
                    .unwrap_or_else(|| format!("{:?}", resp.error()));
                if *resp.error() == BasicErrorResponseType::InvalidGrant {
                    warn!("Refresh token rejected by the identity provider");
                    Err(AuthError::ReauthRequired(description))
                } else {
                    Err(AuthError::Transport(description))
                }
            }
            Err(e) => Err(AuthError::Transport(format!("Token refresh failed: {e}"))),
        }
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<PrincipalProfile, AuthError> {
        self.graph
            .get_profile(access_token)
            .await
            .map_err(|e| AuthError::Transport(format!("Profile lookup failed: {e}")))
    }
}
