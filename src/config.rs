//! Configuration loading and validation.

use crate::error::{ConfigError, Result};
use anyhow::Context as _;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable prefix, e.g. `SYSTEM_SETTINGS__DATABASE__MAX_CONNECTIONS`.
const ENV_PREFIX: &str = "SYSTEM_SETTINGS";

/// Settings store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory path.
    pub data_dir: PathBuf,

    /// SQLite settings.
    pub database: DatabaseConfig,

    /// Logging settings.
    pub log: LogConfig,
}

/// SQLite pool configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file name, relative to the data directory.
    pub filename: String,

    /// Maximum pooled connections.
    pub max_connections: u32,

    /// How long a writer waits on a locked database.
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            filename: "settings.db".into(),
            max_connections: 5,
            busy_timeout_secs: 5,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: DatabaseConfig::default(),
            log: LogConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("system-settings"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

impl Config {
    /// Load configuration from `<data_dir>/config.toml` (if present) and the environment.
    pub fn load() -> Result<Self> {
        let path = default_data_dir().join("config.toml");
        Self::build(&path, false)
    }

    /// Load from a specific config file path. The file must exist.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        Self::build(path, true)
    }

    fn build(path: &Path, required: bool) -> Result<Self> {
        let config = Self::read(path, required)?;

        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!(
                "failed to create data directory: {}",
                config.data_dir.display()
            )
        })?;

        Ok(config)
    }

    fn read(path: &Path, required: bool) -> Result<Self> {
        Self::read_layered(path, required, environment())
    }

    /// Layer defaults, the TOML file and the environment, then validate.
    fn read_layered(
        path: &Path,
        required: bool,
        environment: ::config::Environment,
    ) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(required))
            .add_source(environment)
            .build()
            .map_err(|source| ConfigError::Load {
                path: path.display().to_string(),
                source: Arc::new(source),
            })?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|source| ConfigError::Load {
                path: path.display().to_string(),
                source: Arc::new(source),
            })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".into(),
            )
            .into());
        }
        if self.database.filename.trim().is_empty() {
            return Err(
                ConfigError::Invalid("database.filename must not be empty".into()).into(),
            );
        }
        Ok(())
    }

    /// Get the SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join(&self.database.filename)
    }
}
