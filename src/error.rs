//! Top-level error types for the settings store.

use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors surfaced by settings operations.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("setting already exists: {key}")]
    DuplicateKey { key: String },

    #[error("setting not found: {key}")]
    NotFound { key: String },

    #[error("invalid setting: {0}")]
    Validation(String),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: Arc<::config::ConfigError>,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Database connection and operation errors.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("failed to connect to SQLite: {0}")]
    SqliteConnect(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(String),
}

impl Error {
    /// The settings-domain error, if this is one.
    pub fn as_settings(&self) -> Option<&SettingsError> {
        match self {
            Error::Settings(error) => Some(error),
            _ => None,
        }
    }
}
