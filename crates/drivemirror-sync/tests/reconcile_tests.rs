//! End-to-end reconciliation tests
//!
//! Each test wires the engine to an in-memory SQLite store, a real local
//! mirror inside a temp directory, and a scripted remote store.

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use bytes::Bytes;
use chrono::{Duration, Utc};
use futures_util::{stream, StreamExt};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use drivemirror_cache::{DatabasePool, SqliteStateRepository};
use drivemirror_core::{
    domain::{
        AuthError, ChangeToken, Principal, PrincipalId, PrincipalProfile, RemoteEntryDescriptor,
        RemoteError, RemoteId, RemotePath, SyncState, TokenSet,
    },
    ports::{
        BeginCycle, ContentStream, ICredentialStore, IIdentityProvider, ILocalMirror,
        IMetadataStore, IRemoteStore, PendingGrant, TreeListing, TreePage, UnreadableEntry,
    },
    usecases::AuthManager,
};
use drivemirror_sync::{CycleError, LocalMirror, SyncEngine};

// ============================================================================
// Fakes
// ============================================================================

/// Remote store serving a scripted tree
#[derive(Default)]
struct ScriptedRemote {
    pages: Mutex<Vec<TreePage>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
    /// Error returned after all pages
    trailing_error: Mutex<Option<RemoteError>>,
    /// Downloads of these ids fail after the first chunk
    broken: Mutex<HashSet<String>>,
    unauthorized_downloads: Mutex<bool>,
    /// Cancelled once the first page has been handed out
    cancel_after_first_page: Mutex<Option<CancellationToken>>,
    list_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

impl ScriptedRemote {
    fn set_tree(&self, pages: Vec<Vec<RemoteEntryDescriptor>>) {
        self.set_pages(pages.into_iter().map(TreePage::from).collect());
    }

    fn set_pages(&self, pages: Vec<TreePage>) {
        *self.pages.lock().unwrap() = pages;
    }

    fn set_content(&self, id: &str, content: &[u8]) {
        self.contents
            .lock()
            .unwrap()
            .insert(id.to_string(), content.to_vec());
    }

    fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn downloads(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IRemoteStore for ScriptedRemote {
    async fn list_tree(&self, _access_token: &str) -> Result<TreeListing, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let mut items: Vec<Result<TreePage, RemoteError>> =
            self.pages.lock().unwrap().iter().cloned().map(Ok).collect();
        if let Some(err) = self.trailing_error.lock().unwrap().clone() {
            items.push(Err(err));
        }

        let cancel = self.cancel_after_first_page.lock().unwrap().clone();
        let listing = stream::iter(items).inspect(move |_| {
            if let Some(token) = &cancel {
                token.cancel();
            }
        });
        Ok(Box::pin(listing))
    }

    async fn download(
        &self,
        _access_token: &str,
        id: &RemoteId,
    ) -> Result<ContentStream, RemoteError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);

        if *self.unauthorized_downloads.lock().unwrap() {
            return Err(RemoteError::Unauthorized("token revoked".into()));
        }

        let content = self
            .contents
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;

        if self.broken.lock().unwrap().contains(id.as_str()) {
            let half = content[..content.len() / 2].to_vec();
            return Ok(Box::pin(stream::iter(vec![
                Ok(Bytes::from(half)),
                Err(RemoteError::Transport("connection reset".into())),
            ])));
        }

        Ok(Box::pin(stream::iter(vec![Ok(Bytes::from(content))])))
    }
}

/// Identity provider whose refresh always reports a revoked grant
struct RevokedIdentity;

#[async_trait::async_trait]
impl IIdentityProvider for RevokedIdentity {
    async fn begin_device_authorization(&self) -> Result<PendingGrant, AuthError> {
        Err(AuthError::Transport("not used".into()))
    }

    async fn complete_device_authorization(
        &self,
        _grant: &PendingGrant,
    ) -> Result<TokenSet, AuthError> {
        Err(AuthError::Transport("not used".into()))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenSet, AuthError> {
        Err(AuthError::ReauthRequired("AADSTS70008: refresh token expired".into()))
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<PrincipalProfile, AuthError> {
        Err(AuthError::Transport("not used".into()))
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    engine: SyncEngine,
    repo: Arc<SqliteStateRepository>,
    remote: Arc<ScriptedRemote>,
    mirror: LocalMirror,
    _dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pool = DatabasePool::in_memory().await.unwrap();
        let repo = Arc::new(SqliteStateRepository::new(pool.pool().clone()));
        let remote = Arc::new(ScriptedRemote::default());
        let mirror = LocalMirror::new(dir.path().join("mirror"));

        let auth = Arc::new(AuthManager::new(Arc::new(RevokedIdentity), repo.clone()));
        let engine = SyncEngine::new(auth, remote.clone(), repo.clone(), Arc::new(mirror.clone()));

        Self {
            engine,
            repo,
            remote,
            mirror,
            _dir: dir,
        }
    }

    /// Stores a principal whose token stays valid for an hour
    async fn sign_in(&self, id: &str) -> PrincipalId {
        self.store_principal(id, Utc::now() + Duration::hours(1), Some("refresh-1"))
            .await
    }

    async fn store_principal(
        &self,
        id: &str,
        expires_at: chrono::DateTime<Utc>,
        refresh_token: Option<&str>,
    ) -> PrincipalId {
        let pid = PrincipalId::new(id).unwrap();
        let principal = Principal::new(
            pid.clone(),
            format!("remote-{id}"),
            id,
            TokenSet {
                access_token: "access-1".into(),
                refresh_token: refresh_token.map(String::from),
                expires_at,
            },
        );
        self.repo.upsert(&principal).await.unwrap();
        pid
    }

    async fn run(&self, principal: &PrincipalId) -> Result<drivemirror_sync::CycleReport, CycleError> {
        self.engine.run_cycle(principal, &CancellationToken::new()).await
    }

    fn local(&self, principal: &PrincipalId, path: &str) -> PathBuf {
        self.mirror
            .resolve_local_path(principal, &RemotePath::new(path).unwrap())
            .unwrap()
    }

    async fn state(&self, principal: &PrincipalId) -> (SyncState, Option<String>) {
        let status = self.repo.get_status(principal).await.unwrap().unwrap();
        (status.state, status.last_error)
    }
}

fn folder(id: &str, path: &str) -> RemoteEntryDescriptor {
    RemoteEntryDescriptor::folder(RemoteId::new(id).unwrap(), RemotePath::new(path).unwrap())
}

fn file(id: &str, path: &str, size: u64, etag: &str) -> RemoteEntryDescriptor {
    RemoteEntryDescriptor::file(
        RemoteId::new(id).unwrap(),
        RemotePath::new(path).unwrap(),
        size,
        ChangeToken::new(etag),
    )
}

fn rid(id: &str) -> RemoteId {
    RemoteId::new(id).unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_first_cycle_materializes_tree() {
    let h = Harness::new().await;
    let bob = h.sign_in("bob").await;
    h.remote.set_tree(vec![vec![
        folder("d1", "/proj"),
        file("f1", "/proj/readme.md", 7, "e1"),
    ]]);
    h.remote.set_content("f1", b"# hello");

    let report = h.run(&bob).await.unwrap();

    assert!(h.local(&bob, "/proj").is_dir());
    assert_eq!(std::fs::read(h.local(&bob, "/proj/readme.md")).unwrap(), b"# hello");

    let entries = h.repo.list_entries(&bob).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.last_seen == report.marker));

    assert_eq!(report.entries_seen, 2);
    assert_eq!(report.files_downloaded, 1);
    assert_eq!(report.bytes_downloaded, 7);
    assert!(report.is_clean());
    assert_eq!(h.state(&bob).await, (SyncState::Idle, None));
}

#[tokio::test]
async fn test_entry_absent_from_next_cycle_is_swept() {
    let h = Harness::new().await;
    let alice = h.sign_in("alice").await;
    h.remote.set_tree(vec![vec![
        folder("d1", "/docs"),
        file("f1", "/docs/a.txt", 10, "e1"),
    ]]);
    h.remote.set_content("f1", b"0123456789");
    h.run(&alice).await.unwrap();
    assert!(h.local(&alice, "/docs/a.txt").exists());

    h.remote.set_tree(vec![vec![folder("d1", "/docs")]]);
    let report = h.run(&alice).await.unwrap();

    assert_eq!(report.entries_deleted, 1);
    assert!(h.repo.get_entry(&alice, &rid("f1")).await.unwrap().is_none());
    assert!(!h.local(&alice, "/docs/a.txt").exists());
    assert!(h.local(&alice, "/docs").is_dir());
}

#[tokio::test]
async fn test_second_cycle_without_changes_is_idempotent() {
    let h = Harness::new().await;
    let bob = h.sign_in("bob").await;
    h.remote.set_tree(vec![
        vec![folder("d1", "/proj"), file("f1", "/proj/a.txt", 1, "e1")],
        vec![file("f2", "/b.txt", 1, "e2")],
    ]);
    h.remote.set_content("f1", b"a");
    h.remote.set_content("f2", b"b");

    h.run(&bob).await.unwrap();
    let before = h.repo.list_entries(&bob).await.unwrap();
    assert_eq!(h.remote.downloads(), 2);

    let report = h.run(&bob).await.unwrap();
    let after = h.repo.list_entries(&bob).await.unwrap();

    assert_eq!(h.remote.downloads(), 2);
    assert_eq!(report.files_downloaded, 0);
    assert_eq!(report.entries_deleted, 0);
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.descriptor, a.descriptor);
        assert_eq!(b.local_path, a.local_path);
        assert!(a.last_seen > b.last_seen);
    }
}

#[tokio::test]
async fn test_missing_local_file_is_downloaded_again() {
    let h = Harness::new().await;
    let bob = h.sign_in("bob").await;
    h.remote.set_tree(vec![vec![file("f1", "/a.txt", 1, "e1")]]);
    h.remote.set_content("f1", b"a");
    h.run(&bob).await.unwrap();

    std::fs::remove_file(h.local(&bob, "/a.txt")).unwrap();
    let report = h.run(&bob).await.unwrap();

    assert_eq!(report.files_downloaded, 1);
    assert!(h.local(&bob, "/a.txt").exists());
}

#[tokio::test]
async fn test_changed_token_replaces_content() {
    let h = Harness::new().await;
    let bob = h.sign_in("bob").await;
    h.remote.set_tree(vec![vec![file("f1", "/a.txt", 2, "e1")]]);
    h.remote.set_content("f1", b"v1");
    h.run(&bob).await.unwrap();

    h.remote.set_tree(vec![vec![file("f1", "/a.txt", 2, "e2")]]);
    h.remote.set_content("f1", b"v2");
    let report = h.run(&bob).await.unwrap();

    assert_eq!(report.files_downloaded, 1);
    assert_eq!(std::fs::read(h.local(&bob, "/a.txt")).unwrap(), b"v2");
    let entry = h.repo.get_entry(&bob, &rid("f1")).await.unwrap().unwrap();
    assert_eq!(entry.change_token().unwrap().as_str(), "e2");
}

// ============================================================================
// Moves
// ============================================================================

#[tokio::test]
async fn test_move_with_same_token_is_not_downloaded() {
    let h = Harness::new().await;
    let alice = h.sign_in("alice").await;
    h.remote.set_tree(vec![vec![file("f1", "/a.txt", 4, "e1")]]);
    h.remote.set_content("f1", b"data");
    h.run(&alice).await.unwrap();

    h.remote.set_tree(vec![vec![
        folder("d1", "/docs"),
        file("f1", "/docs/renamed.txt", 4, "e1"),
    ]]);
    let report = h.run(&alice).await.unwrap();

    assert_eq!(h.remote.downloads(), 1);
    assert_eq!(report.entries_relocated, 1);
    assert!(!h.local(&alice, "/a.txt").exists());
    assert_eq!(
        std::fs::read(h.local(&alice, "/docs/renamed.txt")).unwrap(),
        b"data"
    );
    let entry = h.repo.get_entry(&alice, &rid("f1")).await.unwrap().unwrap();
    assert_eq!(entry.local_path, h.local(&alice, "/docs/renamed.txt"));
}

#[tokio::test]
async fn test_move_with_new_token_downloads_and_removes_old_path() {
    let h = Harness::new().await;
    let alice = h.sign_in("alice").await;
    h.remote.set_tree(vec![vec![file("f1", "/a.txt", 2, "e1")]]);
    h.remote.set_content("f1", b"v1");
    h.run(&alice).await.unwrap();

    h.remote.set_tree(vec![vec![file("f1", "/b.txt", 2, "e2")]]);
    h.remote.set_content("f1", b"v2");
    let report = h.run(&alice).await.unwrap();

    assert_eq!(report.files_downloaded, 1);
    assert!(!h.local(&alice, "/a.txt").exists());
    assert_eq!(std::fs::read(h.local(&alice, "/b.txt")).unwrap(), b"v2");
}

#[tokio::test]
async fn test_rename_with_new_file_at_old_path_keeps_both_contents() {
    let h = Harness::new().await;
    let alice = h.sign_in("alice").await;
    h.remote.set_tree(vec![vec![file("f1", "/a.txt", 4, "e1")]]);
    h.remote.set_content("f1", b"orig");
    h.run(&alice).await.unwrap();

    // The new file is listed before the renamed one
    h.remote.set_tree(vec![vec![
        file("f2", "/a.txt", 5, "e7"),
        file("f1", "/b.txt", 4, "e1"),
    ]]);
    h.remote.set_content("f2", b"fresh");
    let report = h.run(&alice).await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.entries_relocated, 0);
    assert_eq!(report.files_downloaded, 2);
    assert_eq!(std::fs::read(h.local(&alice, "/a.txt")).unwrap(), b"fresh");
    assert_eq!(std::fs::read(h.local(&alice, "/b.txt")).unwrap(), b"orig");
}

#[tokio::test]
async fn test_swapped_paths_keep_each_entry_content() {
    let h = Harness::new().await;
    let alice = h.sign_in("alice").await;
    h.remote.set_tree(vec![vec![
        file("f1", "/x.txt", 3, "e1"),
        file("f2", "/y.txt", 3, "e2"),
    ]]);
    h.remote.set_content("f1", b"one");
    h.remote.set_content("f2", b"two");
    h.run(&alice).await.unwrap();

    h.remote.set_tree(vec![vec![
        file("f1", "/y.txt", 3, "e1"),
        file("f2", "/x.txt", 3, "e2"),
    ]]);
    let report = h.run(&alice).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(std::fs::read(h.local(&alice, "/y.txt")).unwrap(), b"one");
    assert_eq!(std::fs::read(h.local(&alice, "/x.txt")).unwrap(), b"two");

    // Nothing left to repair on the next pass
    let downloads = h.remote.downloads();
    let report = h.run(&alice).await.unwrap();
    assert_eq!(report.files_downloaded, 0);
    assert_eq!(h.remote.downloads(), downloads);
    assert_eq!(std::fs::read(h.local(&alice, "/x.txt")).unwrap(), b"two");
}

#[tokio::test]
async fn test_folder_rename_moves_children_and_removes_old_folder() {
    let h = Harness::new().await;
    let alice = h.sign_in("alice").await;
    h.remote.set_tree(vec![
        vec![folder("d1", "/old")],
        vec![folder("d2", "/old/sub"), file("f1", "/old/x.txt", 1, "e1")],
        vec![file("f2", "/old/sub/y.txt", 1, "e2")],
    ]);
    h.remote.set_content("f1", b"x");
    h.remote.set_content("f2", b"y");
    h.run(&alice).await.unwrap();

    h.remote.set_tree(vec![
        vec![folder("d1", "/new")],
        vec![folder("d2", "/new/sub"), file("f1", "/new/x.txt", 1, "e1")],
        vec![file("f2", "/new/sub/y.txt", 1, "e2")],
    ]);
    let report = h.run(&alice).await.unwrap();

    assert_eq!(h.remote.downloads(), 2);
    assert_eq!(report.entries_relocated, 2);
    assert!(report.is_clean());
    assert!(!h.local(&alice, "/old").exists());
    assert_eq!(std::fs::read(h.local(&alice, "/new/x.txt")).unwrap(), b"x");
    assert_eq!(std::fs::read(h.local(&alice, "/new/sub/y.txt")).unwrap(), b"y");
}

#[tokio::test]
async fn test_path_reused_by_another_entry_is_kept() {
    let h = Harness::new().await;
    let bob = h.sign_in("bob").await;
    h.remote.set_tree(vec![vec![file("f1", "/a.txt", 3, "e1")]]);
    h.remote.set_content("f1", b"old");
    h.run(&bob).await.unwrap();

    h.remote.set_tree(vec![vec![file("f2", "/a.txt", 3, "e9")]]);
    h.remote.set_content("f2", b"new");
    let report = h.run(&bob).await.unwrap();

    assert_eq!(report.entries_deleted, 1);
    assert!(h.repo.get_entry(&bob, &rid("f1")).await.unwrap().is_none());
    assert_eq!(std::fs::read(h.local(&bob, "/a.txt")).unwrap(), b"new");
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_failed_download_keeps_previous_content_and_token() {
    let h = Harness::new().await;
    let bob = h.sign_in("bob").await;
    h.remote.set_tree(vec![vec![file("f1", "/a.txt", 2, "e1")]]);
    h.remote.set_content("f1", b"v1");
    h.run(&bob).await.unwrap();

    h.remote.set_tree(vec![vec![file("f1", "/a.txt", 12, "e2")]]);
    h.remote.set_content("f1", b"v2 new bytes");
    h.remote.broken.lock().unwrap().insert("f1".into());
    let report = h.run(&bob).await.unwrap();

    let target = h.local(&bob, "/a.txt");
    assert_eq!(std::fs::read(&target).unwrap(), b"v1");
    assert!(!PathBuf::from(format!("{}.partial", target.display())).exists());
    assert_eq!(report.errors.len(), 1);

    let entry = h.repo.get_entry(&bob, &rid("f1")).await.unwrap().unwrap();
    assert_eq!(entry.change_token().unwrap().as_str(), "e1");
    assert_eq!(entry.last_seen, report.marker);
    assert_eq!(h.state(&bob).await.0, SyncState::Idle);

    // The next cycle retries
    h.remote.broken.lock().unwrap().clear();
    let report = h.run(&bob).await.unwrap();
    assert_eq!(report.files_downloaded, 1);
    assert_eq!(std::fs::read(&target).unwrap(), b"v2 new bytes");
}

#[tokio::test]
async fn test_failed_first_download_is_not_recorded() {
    let h = Harness::new().await;
    let bob = h.sign_in("bob").await;
    h.remote.set_tree(vec![vec![file("f1", "/a.txt", 4, "e1")]]);
    h.remote.set_content("f1", b"abcd");
    h.remote.broken.lock().unwrap().insert("f1".into());

    let report = h.run(&bob).await.unwrap();

    assert!(!report.is_clean());
    assert!(h.repo.get_entry(&bob, &rid("f1")).await.unwrap().is_none());
    assert!(!h.local(&bob, "/a.txt").exists());
}

#[tokio::test]
async fn test_aborted_enumeration_deletes_nothing() {
    let h = Harness::new().await;
    let alice = h.sign_in("alice").await;
    h.remote.set_tree(vec![
        vec![file("f1", "/a.txt", 1, "e1")],
        vec![file("f2", "/b.txt", 1, "e2")],
    ]);
    h.remote.set_content("f1", b"a");
    h.remote.set_content("f2", b"b");
    h.run(&alice).await.unwrap();

    // Second walk dies after its first page
    h.remote.set_tree(vec![vec![file("f1", "/a.txt", 1, "e1")]]);
    *h.remote.trailing_error.lock().unwrap() = Some(RemoteError::Transport("HTTP 503".into()));
    let err = h.run(&alice).await.unwrap_err();

    assert!(matches!(err, CycleError::Remote(RemoteError::Transport(_))));
    assert_eq!(h.repo.count_entries(&alice).await.unwrap(), 2);
    assert!(h.local(&alice, "/b.txt").exists());

    let (state, last_error) = h.state(&alice).await;
    assert_eq!(state, SyncState::Error);
    assert!(last_error.unwrap().contains("HTTP 503"));
}

#[tokio::test]
async fn test_unreadable_folder_keeps_its_subtree() {
    let h = Harness::new().await;
    let bob = h.sign_in("bob").await;
    h.remote.set_tree(vec![vec![
        folder("d1", "/proj"),
        file("f1", "/proj/a.txt", 1, "e1"),
        file("f2", "/gone.txt", 1, "e2"),
    ]]);
    h.remote.set_content("f1", b"a");
    h.remote.set_content("f2", b"g");
    h.run(&bob).await.unwrap();

    // The folder is listed but cannot be described, so its children are unknown
    h.remote.set_pages(vec![TreePage {
        entries: Vec::new(),
        unreadable: vec![UnreadableEntry {
            id: "d1".into(),
            is_folder: true,
            reason: "invalid name".into(),
        }],
    }]);
    let report = h.run(&bob).await.unwrap();

    assert!(!report.is_clean());
    assert!(report.errors.iter().any(|e| e.contains("d1")));
    assert_eq!(report.entries_deleted, 0);
    assert_eq!(std::fs::read(h.local(&bob, "/proj/a.txt")).unwrap(), b"a");
    assert!(h.local(&bob, "/gone.txt").exists());
    assert!(h.repo.get_entry(&bob, &rid("f1")).await.unwrap().is_some());

    // A complete listing resumes normal deletion
    h.remote.set_tree(vec![vec![folder("d1", "/proj"), file("f1", "/proj/a.txt", 1, "e1")]]);
    let report = h.run(&bob).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.entries_deleted, 1);
    assert!(!h.local(&bob, "/gone.txt").exists());
}

#[tokio::test]
async fn test_unauthorized_listing_requires_reauth() {
    let h = Harness::new().await;
    let bob = h.sign_in("bob").await;
    *h.remote.trailing_error.lock().unwrap() = Some(RemoteError::Unauthorized("401".into()));

    let err = h.run(&bob).await.unwrap_err();

    assert!(err.needs_reauth());
    assert_eq!(h.state(&bob).await.0, SyncState::Error);
}

#[tokio::test]
async fn test_unauthorized_download_aborts_cycle() {
    let h = Harness::new().await;
    let bob = h.sign_in("bob").await;
    h.remote.set_tree(vec![vec![file("f1", "/a.txt", 1, "e1")]]);
    *h.remote.unauthorized_downloads.lock().unwrap() = true;

    let err = h.run(&bob).await.unwrap_err();

    assert!(matches!(err, CycleError::ReauthRequired(_)));
    assert!(h.repo.get_entry(&bob, &rid("f1")).await.unwrap().is_none());
    assert_eq!(h.state(&bob).await.0, SyncState::Error);
}

#[tokio::test]
async fn test_revoked_refresh_token_skips_remote_calls() {
    let h = Harness::new().await;
    let carol = h
        .store_principal("carol", Utc::now() + Duration::seconds(30), Some("refresh-old"))
        .await;

    let err = h.run(&carol).await.unwrap_err();

    assert!(matches!(err, CycleError::ReauthRequired(_)));
    assert_eq!(h.remote.lists(), 0);
    let (state, last_error) = h.state(&carol).await;
    assert_eq!(state, SyncState::Error);
    assert!(last_error.unwrap().contains("AADSTS70008"));
}

#[tokio::test]
async fn test_missing_refresh_token_requires_reauth() {
    let h = Harness::new().await;
    let dave = h
        .store_principal("dave", Utc::now() - Duration::minutes(1), None)
        .await;

    let err = h.run(&dave).await.unwrap_err();

    assert!(err.needs_reauth());
    assert_eq!(h.remote.lists(), 0);
}

#[tokio::test]
async fn test_unknown_principal_is_recorded() {
    let h = Harness::new().await;
    let ghost = PrincipalId::new("ghost").unwrap();

    let err = h.run(&ghost).await.unwrap_err();

    assert!(matches!(err, CycleError::UnknownPrincipal(_)));
    assert_eq!(h.state(&ghost).await.0, SyncState::Error);
}

// ============================================================================
// Concurrency and cancellation
// ============================================================================

#[tokio::test]
async fn test_running_principal_is_not_enumerated() {
    let h = Harness::new().await;
    let bob = h.sign_in("bob").await;
    let now = Utc::now();
    let begin = h
        .repo
        .try_begin_cycle(&bob, now, now - Duration::hours(6))
        .await
        .unwrap();
    assert!(matches!(begin, BeginCycle::Started(_)));

    let err = h.run(&bob).await.unwrap_err();

    assert!(matches!(err, CycleError::AlreadyRunning(_)));
    assert_eq!(h.remote.lists(), 0);
    assert_eq!(h.state(&bob).await.0, SyncState::Running);
}

#[tokio::test]
async fn test_cancel_before_enumeration() {
    let h = Harness::new().await;
    let bob = h.sign_in("bob").await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h.engine.run_cycle(&bob, &cancel).await.unwrap_err();

    assert!(matches!(err, CycleError::Cancelled));
    assert_eq!(h.remote.lists(), 0);
    let (state, last_error) = h.state(&bob).await;
    assert_eq!(state, SyncState::Error);
    assert_eq!(last_error.as_deref(), Some("cycle cancelled"));
}

#[tokio::test]
async fn test_cancel_between_pages_skips_sweep() {
    let h = Harness::new().await;
    let alice = h.sign_in("alice").await;
    h.remote.set_tree(vec![vec![file("f9", "/keep.txt", 1, "e9")]]);
    h.remote.set_content("f9", b"k");
    h.run(&alice).await.unwrap();

    let cancel = CancellationToken::new();
    *h.remote.cancel_after_first_page.lock().unwrap() = Some(cancel.clone());
    h.remote.set_tree(vec![
        vec![file("f1", "/a.txt", 1, "e1")],
        vec![file("f2", "/b.txt", 1, "e2")],
    ]);
    h.remote.set_content("f1", b"a");
    h.remote.set_content("f2", b"b");

    let err = h.engine.run_cycle(&alice, &cancel).await.unwrap_err();

    assert!(matches!(err, CycleError::Cancelled));
    assert!(h.repo.get_entry(&alice, &rid("f9")).await.unwrap().is_some());
    assert!(h.local(&alice, "/keep.txt").exists());
    assert!(h.repo.get_entry(&alice, &rid("f2")).await.unwrap().is_none());
    assert_eq!(h.state(&alice).await.0, SyncState::Error);
}

#[tokio::test]
async fn test_principals_are_isolated() {
    let h = Harness::new().await;
    let alice = h.sign_in("alice").await;
    let bob = h.sign_in("bob").await;
    h.remote.set_tree(vec![vec![file("f1", "/a.txt", 1, "e1")]]);
    h.remote.set_content("f1", b"a");

    let (ra, rb) = tokio::join!(h.run(&alice), h.run(&bob));
    ra.unwrap();
    rb.unwrap();

    h.remote.set_tree(vec![]);
    h.run(&alice).await.unwrap();

    assert!(!h.local(&alice, "/a.txt").exists());
    assert!(h.local(&bob, "/a.txt").exists());
    assert_eq!(h.repo.count_entries(&bob).await.unwrap(), 1);
}

// ============================================================================
// Sweep details and export
// ============================================================================

#[tokio::test]
async fn test_non_empty_folder_is_left_in_place() {
    let h = Harness::new().await;
    let bob = h.sign_in("bob").await;
    h.remote.set_tree(vec![vec![
        folder("d1", "/proj"),
        file("f1", "/proj/a.txt", 1, "e1"),
    ]]);
    h.remote.set_content("f1", b"a");
    h.run(&bob).await.unwrap();
    std::fs::write(h.local(&bob, "/proj/local-notes.txt"), b"mine").unwrap();

    h.remote.set_tree(vec![]);
    let report = h.run(&bob).await.unwrap();

    assert_eq!(report.entries_deleted, 2);
    assert!(!h.local(&bob, "/proj/a.txt").exists());
    assert!(h.local(&bob, "/proj/local-notes.txt").exists());
    assert_eq!(h.repo.count_entries(&bob).await.unwrap(), 0);
    assert_eq!(h.state(&bob).await.0, SyncState::Idle);
}

#[tokio::test]
async fn test_nested_tree_is_removed_leaf_first() {
    let h = Harness::new().await;
    let bob = h.sign_in("bob").await;
    h.remote.set_tree(vec![
        vec![folder("d1", "/a")],
        vec![folder("d2", "/a/b")],
        vec![file("f1", "/a/b/c.txt", 1, "e1")],
    ]);
    h.remote.set_content("f1", b"c");
    h.run(&bob).await.unwrap();

    h.remote.set_tree(vec![]);
    let report = h.run(&bob).await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.entries_deleted, 3);
    assert!(!h.local(&bob, "/a").exists());
}

#[tokio::test]
async fn test_metadata_export_written_beside_mirror_root() {
    let h = Harness::new().await;
    let alice = h.sign_in("alice").await;
    h.remote.set_tree(vec![vec![
        folder("d1", "/docs"),
        file("f1", "/docs/a.txt", 1, "e1"),
    ]]);
    h.remote.set_content("f1", b"a");
    h.run(&alice).await.unwrap();

    let path = h.engine.metadata_path(&alice);
    assert_eq!(path, h.mirror.principal_dir(&alice).join("metadata.json"));

    let value: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(value["f1"]["name"], "a.txt");
    assert_eq!(value["d1"]["name"], "docs");
    assert_eq!(
        value["f1"]["path"],
        h.local(&alice, "/docs/a.txt").display().to_string()
    );
}
