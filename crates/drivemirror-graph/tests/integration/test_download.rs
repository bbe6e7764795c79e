//! Streamed downloads

use futures_util::TryStreamExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use drivemirror_core::{
    domain::{RemoteError, RemoteId},
    ports::IRemoteStore,
};

use crate::common::{self, TOKEN};

#[tokio::test]
async fn test_download_streams_content() {
    let (server, store) = common::setup_store().await;
    common::mount_download(&server, "f1", b"hello mirror").await;

    let stream = store
        .download(TOKEN, &RemoteId::new("f1").unwrap())
        .await
        .unwrap();
    let chunks: Vec<bytes::Bytes> = stream.try_collect().await.unwrap();
    let body: Vec<u8> = chunks.concat();

    assert_eq!(body, b"hello mirror");
}

#[tokio::test]
async fn test_download_missing_item() {
    let (server, store) = common::setup_store().await;
    Mock::given(method("GET"))
        .and(path("/me/drive/items/gone/content"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = store.download(TOKEN, &RemoteId::new("gone").unwrap()).await;
    assert!(matches!(result, Err(RemoteError::NotFound(_))));
}

#[tokio::test]
async fn test_download_rejected_token() {
    let (server, store) = common::setup_store().await;
    Mock::given(method("GET"))
        .and(path("/me/drive/items/f1/content"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = store.download("stale", &RemoteId::new("f1").unwrap()).await;
    assert!(matches!(result, Err(RemoteError::Unauthorized(_))));
}
