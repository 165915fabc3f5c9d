use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable overriding [`DatabaseConfig::url`].
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Environment variable overriding [`DatabaseConfig::pool_size`].
pub const POOL_SIZE_ENV: &str = "SCOPEDTX_POOL_SIZE";

/// Configuration for one logical database: its worker pool and data source.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// name = "orders"
/// pool_size = 4
/// url = "sqlite:///var/lib/orders/orders.db"
/// max_connections = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Context name, used for worker thread names and diagnostics
    pub name: String,
    /// Number of workers transaction bodies are pinned to
    pub pool_size: usize,
    /// SQLite connection URL
    pub url: String,
    /// Data-source capacity (maximum leased connections)
    pub max_connections: u32,
    /// How long a lease may wait for a free connection
    pub acquire_timeout_secs: u64,
    /// How long SQLite waits on a locked database before failing a statement
    pub busy_timeout_secs: u64,
    pub create_if_missing: bool,
    /// Use the WAL journal (readers do not block the writer)
    pub wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: "db".to_string(),
            pool_size: num_cpus::get().max(1),
            url: "sqlite://scopedtx.db".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            busy_timeout_secs: 5,
            create_if_missing: true,
            wal: true,
        }
    }
}

impl DatabaseConfig {
    /// Config for a SQLite file at `path` with every other field defaulted.
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        Self {
            url: format!("sqlite://{}", path.as_ref().display()),
            ..Self::default()
        }
    }

    /// Load config from a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_toml_str(&content)?.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path: ~/.scopedtx/config.toml
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".scopedtx/config.toml")
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `DATABASE_URL` and `SCOPEDTX_POOL_SIZE` if set.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = lookup(DATABASE_URL_ENV) {
            self.url = url;
        }

        if let Some(size) = lookup(POOL_SIZE_ENV) {
            self.pool_size = size.trim().parse().map_err(|_| {
                Error::config(format!("{POOL_SIZE_ENV} must be a positive integer, got '{size}'"))
            })?;
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::InvalidPoolSize {
                context: self.name.clone(),
                size: 0,
            });
        }
        if self.max_connections == 0 {
            return Err(Error::config("max_connections must be at least 1"));
        }
        if self.url.trim().is_empty() {
            return Err(Error::config("url must not be empty"));
        }
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}
