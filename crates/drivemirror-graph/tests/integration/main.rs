//! Integration tests for drivemirror-graph
//!
//! Uses wiremock to simulate Microsoft Graph and the identity platform,
//! and verifies the tree walk, downloads, profile lookup and the token
//! endpoint flows end to end.

mod common;

mod test_auth;
mod test_download;
mod test_listing;
mod test_profile;
