//! Tree walk over children listings

use futures_util::StreamExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use drivemirror_core::{domain::RemoteError, ports::IRemoteStore};

use crate::common::{self, collect, file_item, folder_item, mount_children, TOKEN};

#[tokio::test]
async fn test_walk_recurses_into_folders_with_paths() {
    let (server, store) = common::setup_store().await;

    mount_children(
        &server,
        "/me/drive/root/children",
        serde_json::json!([folder_item("d1", "proj"), file_item("f0", "top.txt", "e0", 3)]),
    )
    .await;
    mount_children(
        &server,
        "/me/drive/items/d1/children",
        serde_json::json!([folder_item("d2", "src"), file_item("f1", "readme.md", "e1", 12)]),
    )
    .await;
    mount_children(
        &server,
        "/me/drive/items/d2/children",
        serde_json::json!([file_item("f2", "main.rs", "e2", 40)]),
    )
    .await;

    let listing = store.list_tree(TOKEN).await.unwrap();
    let entries = collect(listing).await.unwrap();

    let mut paths: Vec<&str> = entries.iter().map(|e| e.remote_path.as_str()).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec!["/proj", "/proj/readme.md", "/proj/src", "/proj/src/main.rs", "/top.txt"]
    );

    let readme = entries.iter().find(|e| e.id.as_str() == "f1").unwrap();
    assert_eq!(readme.size, Some(12));
    assert_eq!(readme.change_token.as_ref().unwrap().as_str(), "e1");
    assert_eq!(readme.parent_id.as_ref().unwrap().as_str(), "d1");
    assert_eq!(readme.modified_by.as_deref(), Some("owner@example.com"));
}

#[tokio::test]
async fn test_walk_follows_next_link() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/children"))
        .and(query_param("$skiptoken", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [file_item("f3", "c.txt", "e3", 1)]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/children"))
        .and(query_param("$top", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [file_item("f1", "a.txt", "e1", 1), file_item("f2", "b.txt", "e2", 1)],
            "@odata.nextLink": format!("{}/me/drive/root/children?$skiptoken=page2", server.uri())
        })))
        .mount(&server)
        .await;

    let mut listing = store.list_tree(TOKEN).await.unwrap();

    let first = listing.next().await.unwrap().unwrap();
    assert_eq!(first.entries.len(), 2);
    let second = listing.next().await.unwrap().unwrap();
    assert_eq!(second.entries.len(), 1);
    assert_eq!(second.entries[0].remote_path.as_str(), "/c.txt");
    assert!(listing.next().await.is_none());
}

#[tokio::test]
async fn test_unmappable_folder_is_reported_on_its_page() {
    let (server, store) = common::setup_store().await;

    mount_children(
        &server,
        "/me/drive/root/children",
        serde_json::json!([folder_item("d1", ".."), file_item("f1", "a.txt", "e1", 1)]),
    )
    .await;

    let mut listing = store.list_tree(TOKEN).await.unwrap();
    let page = listing.next().await.unwrap().unwrap();

    assert!(!page.is_complete());
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.entries[0].remote_path.as_str(), "/a.txt");
    assert_eq!(page.unreadable.len(), 1);
    assert_eq!(page.unreadable[0].id, "d1");
    assert!(page.unreadable[0].is_folder);

    // The rejected folder's children are never requested
    assert!(listing.next().await.is_none());
}

#[tokio::test]
async fn test_unauthorized_is_distinguished() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/children"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"code": "InvalidAuthenticationToken"}
        })))
        .mount(&server)
        .await;

    let listing = store.list_tree("revoked").await.unwrap();
    let err = collect(listing).await.unwrap_err();
    assert!(matches!(err, RemoteError::Unauthorized(_)), "got {err:?}");
}

#[tokio::test]
async fn test_server_error_mid_walk_fails_the_stream() {
    let (server, store) = common::setup_store().await;

    mount_children(
        &server,
        "/me/drive/root/children",
        serde_json::json!([folder_item("d1", "proj")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/me/drive/items/d1/children"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut listing = store.list_tree(TOKEN).await.unwrap();
    assert_eq!(listing.next().await.unwrap().unwrap().entries.len(), 1);
    let err = listing.next().await.unwrap().unwrap_err();
    assert!(matches!(err, RemoteError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn test_throttled_request_is_retried() {
    let (server, store) = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/children"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_children(
        &server,
        "/me/drive/root/children",
        serde_json::json!([file_item("f1", "a.txt", "e1", 1)]),
    )
    .await;

    let listing = store.list_tree(TOKEN).await.unwrap();
    let entries = collect(listing).await.unwrap();
    assert_eq!(entries.len(), 1);
}
