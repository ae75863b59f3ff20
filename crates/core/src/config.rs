//! TOML-based configuration system for doltvec.
//!
//! Sensitive values (the ChromaDB auth token) are stored as `_env` fields
//! that reference environment variable names. The actual secrets are
//! resolved at runtime via [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server-wide settings (logging, data directory).
    #[serde(default)]
    pub server: ServerConfig,

    /// Dolt repository settings.
    pub dolt: DoltConfig,

    /// ChromaDB connection settings.
    pub chroma: ChromaConfig,

    /// Sync behaviour settings.
    #[serde(default)]
    pub sync: SyncConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Server-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for persistent data (the deletion ledger database).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("doltvec")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dolt
// ---------------------------------------------------------------------------

/// Dolt repository connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoltConfig {
    /// Path to the Dolt repository working directory.
    pub repo_path: PathBuf,

    /// Name of the `dolt` binary (or an absolute path to it).
    #[serde(default = "default_dolt_bin")]
    pub binary: String,

    /// Default remote name used by push operations.
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Default branch name (e.g. `main`).
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_dolt_bin() -> String {
    "dolt".into()
}
fn default_remote() -> String {
    "origin".into()
}
fn default_branch() -> String {
    "main".into()
}

// ---------------------------------------------------------------------------
// Chroma
// ---------------------------------------------------------------------------

/// ChromaDB REST API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromaConfig {
    /// Base URL of the Chroma server (e.g. `http://127.0.0.1:8000`).
    #[serde(default = "default_chroma_url")]
    pub base_url: String,

    /// Chroma tenant name.
    #[serde(default = "default_tenant")]
    pub tenant: String,

    /// Chroma database name.
    #[serde(default = "default_database")]
    pub database: String,

    /// Environment variable holding the auth token, if the server requires one.
    #[serde(default)]
    pub auth_token_env: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Resolved auth token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub auth_token: Option<String>,
}

fn default_chroma_url() -> String {
    "http://127.0.0.1:8000".into()
}
fn default_tenant() -> String {
    "default_tenant".into()
}
fn default_database() -> String {
    "default_database".into()
}
fn default_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Sync behaviour
// ---------------------------------------------------------------------------

/// Sync behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Automatically resolve conflicts flagged auto-resolvable after a merge.
    #[serde(default = "default_true")]
    pub auto_resolve: bool,

    /// Collections to synchronize (empty = all collections in the schema).
    #[serde(default)]
    pub collections: Vec<String>,

    /// Suffix separator used when one logical document is chunked into
    /// multiple vector-store entries (`<doc>_chunk_<n>`).
    #[serde(default = "default_chunk_separator")]
    pub chunk_separator: String,
}

fn default_true() -> bool {
    true
}
fn default_chunk_separator() -> String {
    "_chunk_".into()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_resolve: true,
            collections: Vec::new(),
            chunk_separator: default_chunk_separator(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables and populate the
    /// corresponding resolved fields.
    ///
    /// A missing variable logs a warning but does **not** fail -- the Chroma
    /// server may not require authentication at all.
    pub fn resolve_env_vars(&mut self) {
        if let Some(ref env_name) = self.chroma.auth_token_env {
            self.chroma.auth_token = match std::env::var(env_name) {
                Ok(val) if !val.is_empty() => {
                    debug!(env_name, "resolved chroma auth token");
                    Some(val)
                }
                Ok(_) => {
                    warn!(env_name, "chroma auth token env var is set but empty");
                    None
                }
                Err(_) => {
                    warn!(env_name, "chroma auth token env var not set");
                    None
                }
            };
        }
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dolt.repo_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "dolt.repo_path".into(),
                detail: "repository path must not be empty".into(),
            });
        }
        if self.chroma.base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "chroma.base_url".into(),
                detail: "base URL must not be empty".into(),
            });
        }
        if !self.chroma.base_url.starts_with("http://")
            && !self.chroma.base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                field: "chroma.base_url".into(),
                detail: "base URL must start with http:// or https://".into(),
            });
        }
        if self.chroma.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chroma.timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }
        if self.sync.chunk_separator.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sync.chunk_separator".into(),
                detail: "chunk separator must not be empty".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Path of the deletion-ledger database file under the data directory.
    pub fn ledger_path(&self) -> PathBuf {
        self.server.data_dir.join("deletion_ledger.db")
    }
}
