//! drivemirror Graph - Microsoft Graph adapters
//!
//! Provides:
//! - A remote store that walks a OneDrive tree through children listings
//!   and streams file content
//! - An identity provider for the OAuth2 device authorization grant
//!
//! ## Modules
//!
//! - [`auth`] - Device-code grant, refresh-token exchange and profile lookup
//! - [`client`] - Microsoft Graph API HTTP client
//! - [`listing`] - Children listing response types
//! - [`provider`] - `IRemoteStore` implementation

pub mod auth;
pub mod client;
pub mod listing;
pub mod provider;

use std::time::Duration;

use drivemirror_core::domain::RemoteError;
use thiserror::Error;

/// Errors that can occur when communicating with the Microsoft Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded and the retry budget is spent
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration the server asked to wait
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// No response within the configured request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<GraphError> for RemoteError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Unauthorized(msg) => RemoteError::Unauthorized(msg),
            GraphError::NotFound(msg) => RemoteError::NotFound(msg),
            GraphError::InvalidResponse(msg) => RemoteError::InvalidResponse(msg),
            other => RemoteError::Transport(other.to_string()),
        }
    }
}
