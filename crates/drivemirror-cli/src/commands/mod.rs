//! CLI subcommands and the adapter wiring they share

pub mod auth;
pub mod completions;
pub mod config;
pub mod status;
pub mod sync;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use drivemirror_cache::{DatabasePool, SqliteStateRepository};
use drivemirror_core::{config::Config, domain::PrincipalId, usecases::AuthManager};
use drivemirror_graph::{
    auth::{DeviceCodeConfig, GraphIdentityProvider},
    client::GraphClient,
    provider::GraphRemoteStore,
};
use drivemirror_sync::{LocalMirror, SyncEngine};
use tracing::debug;

/// Loaded configuration plus the file it came from
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Config,
    pub config_path: PathBuf,
}

impl AppContext {
    /// Loads the configuration from `path`, or the default location
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Config::default_path);
        let config = Config::load_or_default(&config_path);
        Self {
            config,
            config_path,
        }
    }

    /// Opens the state database, creating it on first use
    pub async fn open_store(&self) -> Result<Arc<SqliteStateRepository>> {
        let db_path = &self.config.database.path;
        debug!(path = %db_path.display(), "Opening state database");

        let pool = DatabasePool::new(db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        Ok(Arc::new(SqliteStateRepository::new(pool.pool().clone())))
    }

    pub fn graph_client(&self) -> Result<GraphClient> {
        let client = GraphClient::with_base_url(self.config.remote.graph_base_url.clone())?
            .with_timeout(Duration::from_secs(self.config.remote.request_timeout_secs))?;
        Ok(client)
    }

    pub fn identity_provider(&self) -> Result<GraphIdentityProvider> {
        let client_id = self
            .config
            .auth
            .client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .with_context(|| {
                format!(
                    "auth.client_id is not set. Add it to {}",
                    self.config_path.display()
                )
            })?;

        let mut grant = DeviceCodeConfig::new(
            client_id,
            self.config.device_code_url(),
            self.config.token_url(),
        )
        .with_scopes(self.config.auth.scopes.clone());
        if let Some(secret) = &self.config.auth.client_secret {
            grant = grant.with_client_secret(secret.clone());
        }

        Ok(GraphIdentityProvider::new(&grant, self.graph_client()?)?)
    }

    pub fn auth_manager(&self, store: Arc<SqliteStateRepository>) -> Result<AuthManager> {
        let margin = chrono::Duration::seconds(self.config.auth.refresh_margin_secs as i64);
        Ok(AuthManager::new(Arc::new(self.identity_provider()?), store).with_refresh_margin(margin))
    }

    /// Wires the engine to Graph, SQLite and the local mirror
    pub fn sync_engine(&self, store: Arc<SqliteStateRepository>) -> Result<SyncEngine> {
        let auth = Arc::new(self.auth_manager(store.clone())?);
        let remote = GraphRemoteStore::new(self.graph_client()?)
            .with_page_size(self.config.remote.page_size);
        let mirror = LocalMirror::new(self.config.mirror.base_root.clone());

        Ok(SyncEngine::new(auth, Arc::new(remote), store, Arc::new(mirror))
            .with_stale_running(chrono::Duration::seconds(
                self.config.sync.stale_running_secs as i64,
            ))
            .with_metadata_export(self.config.mirror.export_metadata))
    }
}

/// Parses a principal id given on the command line
pub fn parse_principal(raw: &str) -> Result<PrincipalId> {
    PrincipalId::new(raw).with_context(|| format!("Invalid principal id '{raw}'"))
}
