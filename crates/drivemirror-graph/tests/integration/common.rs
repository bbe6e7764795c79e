//! Shared test helpers for Graph integration tests
//!
//! Each helper mounts wiremock endpoints that mimic one Graph or identity
//! platform call.

use futures_util::TryStreamExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use drivemirror_core::{
    domain::{RemoteEntryDescriptor, RemoteError},
    ports::{TreeListing, TreePage},
};
use drivemirror_graph::client::GraphClient;
use drivemirror_graph::provider::GraphRemoteStore;

pub const TOKEN: &str = "test-access-token";

/// Starts a mock server and returns a remote store pointing at it
pub async fn setup_store() -> (MockServer, GraphRemoteStore) {
    let server = MockServer::start().await;
    let client = GraphClient::with_base_url(server.uri()).expect("client");
    (server, GraphRemoteStore::new(client).with_page_size(2))
}

pub fn file_item(id: &str, name: &str, etag: &str, size: u64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "size": size,
        "eTag": etag,
        "lastModifiedDateTime": "2026-01-15T10:00:00Z",
        "lastModifiedBy": {"user": {"email": "owner@example.com"}},
        "file": {"mimeType": "application/octet-stream"}
    })
}

pub fn folder_item(id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "eTag": format!("etag-{id}"),
        "folder": {"childCount": 1}
    })
}

/// Mounts one page of children at `url_path`
pub async fn mount_children(server: &MockServer, url_path: &str, items: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": items
        })))
        .mount(server)
        .await;
}

/// Mounts a file download endpoint for a specific item ID.
pub async fn mount_download(server: &MockServer, item_id: &str, content: &[u8]) {
    let path_str = format!("/me/drive/items/{}/content", item_id);
    Mock::given(method("GET"))
        .and(path(&path_str))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(content.to_vec())
                .append_header("Content-Type", "application/octet-stream"),
        )
        .mount(server)
        .await;
}

/// Drains a listing into one flat vector
pub async fn collect(listing: TreeListing) -> Result<Vec<RemoteEntryDescriptor>, RemoteError> {
    let pages: Vec<TreePage> = listing.try_collect().await?;
    Ok(pages.into_iter().flat_map(|p| p.entries).collect())
}
