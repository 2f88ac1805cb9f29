//! SQLite connection management and schema migrations.

use crate::config::DatabaseConfig;
use crate::error::{DbError, Result};
use anyhow::Context as _;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

/// Database handle shared by the stores.
#[derive(Debug, Clone)]
pub struct Db {
    pub sqlite: SqlitePool,
}

impl Db {
    /// Open (creating if needed) the database file and apply migrations.
    pub async fn connect(path: &Path, config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!(
                    "failed to create database directory: {}",
                    parent.display()
                )
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        let sqlite = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(DbError::SqliteConnect)?;

        run_migrations(&sqlite).await?;

        tracing::debug!(path = %path.display(), "sqlite database ready");

        Ok(Self { sqlite })
    }

    /// Single-connection in-memory database, migrated. Each call is a fresh database.
    pub async fn connect_in_memory() -> Result<Self> {
        let sqlite = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(DbError::SqliteConnect)?;

        run_migrations(&sqlite).await?;

        Ok(Self { sqlite })
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.sqlite.close().await;
    }
}

/// Apply the embedded migrations in `migrations/`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|error| DbError::Migration(error.to_string()))?;
    Ok(())
}
