//! Microsoft Graph API client
//!
//! Provides an HTTP client for the Microsoft Graph API. The access token is
//! passed per call so one client can serve every principal, and the caller
//! stays the owner of token freshness.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use drivemirror_graph::client::GraphClient;
//!
//! # async fn example() -> Result<(), drivemirror_graph::GraphError> {
//! let client = GraphClient::new()?;
//! let profile = client.get_profile("access-token-here").await?;
//! println!("Hello, {}", profile.display_name);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use drivemirror_core::domain::PrincipalProfile;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, info, warn};

use crate::GraphError;

/// Base URL for Microsoft Graph API v1.0
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default retry-after duration when header is missing (30 seconds)
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Maximum number of retries for 429 responses
const DEFAULT_MAX_RETRIES: u32 = 5;

// ============================================================================
// Graph API response types
// ============================================================================

/// Response from the /me endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeResponse {
    /// User's display name
    display_name: Option<String>,
    /// User's email (mail field)
    mail: Option<String>,
    /// User's principal name (typically email)
    user_principal_name: Option<String>,
    /// User ID
    id: Option<String>,
}

// ============================================================================
// GraphClient
// ============================================================================

/// HTTP client for Microsoft Graph API calls
#[derive(Debug, Clone)]
pub struct GraphClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests
    base_url: String,
    /// Bound on waiting for a response or for a JSON body
    timeout: Duration,
    /// Retry budget for 429 responses
    max_retries: u32,
}

impl GraphClient {
    /// Creates a client for the public Graph endpoint
    pub fn new() -> Result<Self, GraphError> {
        Self::with_base_url(GRAPH_BASE_URL)
    }

    /// Creates a client with a custom base URL (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, GraphError> {
        Self::build(base_url.into(), DEFAULT_TIMEOUT)
    }

    /// Replaces the per-request timeout
    pub fn with_timeout(self, timeout: Duration) -> Result<Self, GraphError> {
        let mut client = Self::build(self.base_url, timeout)?;
        client.max_retries = self.max_retries;
        Ok(client)
    }

    /// Replaces the retry budget for 429 responses
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn build(base_url: String, timeout: Duration) -> Result<Self, GraphError> {
        // No overall timeout on the client: download bodies may take longer
        // than a single request is allowed to wait for its headers.
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolves a path relative to the base URL
    ///
    /// Absolute URLs (such as `@odata.nextLink` values) are returned as-is.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Creates an authenticated request builder for the given method and path
    pub fn request(&self, method: Method, path: &str, access_token: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(access_token)
    }

    /// Sends a request, retrying on 429 and mapping error statuses
    ///
    /// Returns the response once its status is a success; the body has not
    /// been read yet.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        access_token: &str,
    ) -> Result<Response, GraphError> {
        for attempt in 0..=self.max_retries {
            // Step 1: Build and send request, bounded by the request timeout
            let response = tokio::time::timeout(
                self.timeout,
                self.request(method.clone(), path, access_token).send(),
            )
            .await
            .map_err(|_| GraphError::Timeout(self.timeout))??;

            // Step 2: Check for 429
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
                    .unwrap_or(DEFAULT_RETRY_AFTER);

                if attempt >= self.max_retries {
                    warn!(path, attempts = attempt + 1, "429 retry limit exhausted");
                    return Err(GraphError::TooManyRequests { retry_after });
                }

                info!(
                    path,
                    attempt,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Received 429, backing off"
                );

                tokio::time::sleep(retry_after).await;
                continue;
            }

            if attempt > 0 {
                info!(path, attempt, "Request succeeded after retry");
            }

            // Step 3: Map remaining error statuses
            return check_status(response).await;
        }

        Err(GraphError::InvalidResponse(format!(
            "retry loop exited unexpectedly for {path}"
        )))
    }

    /// GETs `path` and deserializes the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
    ) -> Result<T, GraphError> {
        let response = self.send(Method::GET, path, access_token).await?;
        let body = tokio::time::timeout(self.timeout, response.bytes())
            .await
            .map_err(|_| GraphError::Timeout(self.timeout))??;
        serde_json::from_slice(&body).map_err(|e| {
            GraphError::InvalidResponse(format!("Failed to parse response of {path}: {e}"))
        })
    }

    /// Retrieves the profile of the signed-in user from `GET /me`
    ///
    /// `mail` is preferred over `userPrincipalName` as the identifier.
    pub async fn get_profile(&self, access_token: &str) -> Result<PrincipalProfile, GraphError> {
        debug!("Fetching user profile from /me");

        let me: MeResponse = self.get_json("/me", access_token).await?;
        profile_from_me(me)
    }
}

fn profile_from_me(me: MeResponse) -> Result<PrincipalProfile, GraphError> {
    let email = me
        .mail
        .filter(|m| !m.trim().is_empty())
        .or(me.user_principal_name)
        .ok_or_else(|| {
            GraphError::InvalidResponse("/me has neither mail nor userPrincipalName".into())
        })?;

    let remote_user_id = me
        .id
        .ok_or_else(|| GraphError::InvalidResponse("/me has no id".into()))?;

    let display_name = me.display_name.unwrap_or_else(|| email.clone());

    Ok(PrincipalProfile {
        email,
        display_name,
        remote_user_id,
    })
}

/// Converts a non-success status into the matching [`GraphError`]
async fn check_status(response: Response) -> Result<Response, GraphError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    let detail = if body.is_empty() {
        format!("HTTP {status} for {url}")
    } else {
        format!("HTTP {status} for {url}: {body}")
    };

    Err(match status {
        StatusCode::UNAUTHORIZED => GraphError::Unauthorized(detail),
        StatusCode::FORBIDDEN => GraphError::Forbidden(detail),
        StatusCode::NOT_FOUND => GraphError::NotFound(detail),
        s if s.is_server_error() => GraphError::ServerError(detail),
        _ => GraphError::InvalidResponse(detail),
    })
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports integer seconds and HTTP-dates (RFC 2822). HTTP-dates more than
/// an hour away fall back to `default`.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    // Try parsing as integer seconds first (most common for Graph API)
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    // Try parsing as HTTP-date using chrono
    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            let diff = target - now;
            if let Some(secs) = diff
                .num_seconds()
                .try_into()
                .ok()
                .filter(|&s: &u64| s <= 3600)
            {
                return Duration::from_secs(secs);
            }
        }
    }

    // Fallback
    warn!(value, "Could not parse Retry-After header, using default");
    default
}
