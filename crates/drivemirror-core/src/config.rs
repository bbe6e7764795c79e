//! Configuration module for drivemirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for drivemirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
    pub remote: RemoteConfig,
    pub mirror: MirrorConfig,
    pub sync: SyncConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Identity platform settings for the device-code grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Application (client) ID. `None` until configured.
    pub client_id: Option<String>,
    /// Optional secret for confidential client registrations.
    pub client_secret: Option<String>,
    /// Directory tenant (`common`, `organizations`, `consumers` or a tenant id).
    pub tenant: String,
    /// Scopes requested by the grant.
    pub scopes: Vec<String>,
    /// Base URL of the identity platform.
    pub authority_url: String,
    /// Refresh access tokens expiring within this many seconds.
    pub refresh_margin_secs: u64,
}

/// Remote drive API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the Graph API.
    pub graph_base_url: String,
    /// Timeout applied to every HTTP request.
    pub request_timeout_secs: u64,
    /// Children requested per listing page.
    pub page_size: u32,
}

/// Local mirror layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Each principal is mirrored into `<base_root>/<principal>/onedrive`.
    pub base_root: PathBuf,
    /// Write `<base_root>/<principal>/metadata.json` after each successful cycle.
    pub export_metadata: bool,
}

/// Reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// A `running` status older than this is considered abandoned.
    pub stale_running_secs: u64,
}

/// State database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/drivemirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("drivemirror")
            .join("config.yaml")
    }

    /// Token endpoint of the configured tenant.
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.auth.authority_url.trim_end_matches('/'),
            self.auth.tenant
        )
    }

    /// Device authorization endpoint of the configured tenant.
    pub fn device_code_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/devicecode",
            self.auth.authority_url.trim_end_matches('/'),
            self.auth.tenant
        )
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            tenant: "common".to_string(),
            scopes: vec![
                "Files.Read.All".to_string(),
                "User.Read".to_string(),
                "offline_access".to_string(),
            ],
            authority_url: "https://login.microsoftonline.com".to_string(),
            refresh_margin_secs: 300,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            graph_base_url: "https://graph.microsoft.com/v1.0".to_string(),
            request_timeout_secs: 30,
            page_size: 200,
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            base_root: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("drivemirror")
                .join("mirror"),
            export_metadata: true,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stale_running_secs: 6 * 60 * 60,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("drivemirror")
                .join("state.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"remote.page_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Graph caps `$top` on children listings.
const MAX_PAGE_SIZE: u32 = 999;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- auth ---
        if let Some(ref id) = self.auth.client_id {
            if id.trim().is_empty() {
                errors.push(ValidationError {
                    field: "auth.client_id".into(),
                    message: "must not be empty when set".into(),
                });
            }
        }
        if self.auth.tenant.trim().is_empty() {
            errors.push(ValidationError {
                field: "auth.tenant".into(),
                message: "must not be empty".into(),
            });
        }
        if !self.auth.scopes.iter().any(|s| s == "offline_access") {
            errors.push(ValidationError {
                field: "auth.scopes".into(),
                message: "must include offline_access to obtain refresh tokens".into(),
            });
        }
        if !self.auth.authority_url.starts_with("http") {
            errors.push(ValidationError {
                field: "auth.authority_url".into(),
                message: format!("not an http(s) URL: {}", self.auth.authority_url),
            });
        }

        // --- remote ---
        if !self.remote.graph_base_url.starts_with("http") {
            errors.push(ValidationError {
                field: "remote.graph_base_url".into(),
                message: format!("not an http(s) URL: {}", self.remote.graph_base_url),
            });
        }
        if self.remote.request_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "remote.request_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.remote.page_size == 0 || self.remote.page_size > MAX_PAGE_SIZE {
            errors.push(ValidationError {
                field: "remote.page_size".into(),
                message: format!("must be in range 1..={MAX_PAGE_SIZE}"),
            });
        }

        // --- mirror ---
        if self.mirror.base_root.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "mirror.base_root".into(),
                message: "must not be empty".into(),
            });
        }

        // --- sync ---
        if self.sync.stale_running_secs == 0 {
            errors.push(ValidationError {
                field: "sync.stale_running_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use drivemirror_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .mirror_base_root(PathBuf::from("/srv/mirror"))
///     .auth_client_id("00000000-0000-0000-0000-000000000000")
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- auth ---

    pub fn auth_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.auth.client_id = Some(client_id.into());
        self
    }

    pub fn auth_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.client_secret = Some(secret.into());
        self
    }

    pub fn auth_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.config.auth.tenant = tenant.into();
        self
    }

    pub fn auth_authority_url(mut self, url: impl Into<String>) -> Self {
        self.config.auth.authority_url = url.into();
        self
    }

    pub fn auth_refresh_margin_secs(mut self, secs: u64) -> Self {
        self.config.auth.refresh_margin_secs = secs;
        self
    }

    // --- remote ---

    pub fn remote_graph_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.graph_base_url = url.into();
        self
    }

    pub fn remote_request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.remote.request_timeout_secs = secs;
        self
    }

    pub fn remote_page_size(mut self, size: u32) -> Self {
        self.config.remote.page_size = size;
        self
    }

    // --- mirror ---

    pub fn mirror_base_root(mut self, root: PathBuf) -> Self {
        self.config.mirror.base_root = root;
        self
    }

    pub fn mirror_export_metadata(mut self, enabled: bool) -> Self {
        self.config.mirror.export_metadata = enabled;
        self
    }

    // --- sync ---

    pub fn sync_stale_running_secs(mut self, secs: u64) -> Self {
        self.config.sync.stale_running_secs = secs;
        self
    }

    // --- database ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.database.path = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
