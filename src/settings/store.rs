//! Key-value settings storage (SQLite).

use crate::error::{Result, SettingsError};
use crate::settings::known::KnownSetting;
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row as _, SqlitePool};

/// Longest accepted key, in characters.
pub const MAX_KEY_CHARS: usize = 100;

/// One persisted configuration row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRecord {
    pub id: i64,
    pub key: String,
    pub value: Option<String>,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Display for SettingsRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SettingsRecord(key={}, value={})",
            self.key,
            self.value.as_deref().unwrap_or("None")
        )
    }
}

/// Settings store over the `system_settings` table.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new setting. Fails if the key is invalid or already present.
    pub async fn create(
        &self,
        key: &str,
        value: Option<&str>,
        description: Option<&str>,
    ) -> Result<SettingsRecord> {
        validate_key(key)?;

        let result = sqlx::query(
            r#"
            INSERT INTO system_settings (key, value, description, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, key, value, description, updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(description)
        .bind(Utc::now().timestamp_micros())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => {
                let record = record_from_row(row)?;
                tracing::debug!(key, id = record.id, "setting created");
                Ok(record)
            }
            Err(sqlx::Error::Database(ref db_error)) if db_error.is_unique_violation() => {
                Err(SettingsError::DuplicateKey {
                    key: key.to_string(),
                }
                .into())
            }
            Err(error) => Err(anyhow::Error::new(error)
                .context("failed to insert setting")
                .into()),
        }
    }

    pub async fn get_by_key(&self, key: &str) -> Result<Option<SettingsRecord>> {
        let row = sqlx::query(
            "SELECT id, key, value, description, updated_at FROM system_settings WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch setting by key")?;

        row.map(record_from_row).transpose()
    }

    /// Replace value and description and refresh `updated_at`.
    ///
    /// The new timestamp is at least one microsecond past the stored one, so
    /// back-to-back updates always move it forward.
    pub async fn update(
        &self,
        key: &str,
        value: Option<&str>,
        description: Option<&str>,
    ) -> Result<SettingsRecord> {
        let row = sqlx::query(
            r#"
            UPDATE system_settings
            SET value = ?, description = ?, updated_at = MAX(?, updated_at + 1)
            WHERE key = ?
            RETURNING id, key, value, description, updated_at
            "#,
        )
        .bind(value)
        .bind(description)
        .bind(Utc::now().timestamp_micros())
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("failed to update setting")?;

        let Some(row) = row else {
            return Err(SettingsError::NotFound {
                key: key.to_string(),
            }
            .into());
        };

        let record = record_from_row(row)?;
        tracing::debug!(key, id = record.id, "setting updated");
        Ok(record)
    }

    /// All settings, ordered by key.
    pub async fn list_all(&self) -> Result<Vec<SettingsRecord>> {
        let rows = sqlx::query(
            "SELECT id, key, value, description, updated_at FROM system_settings ORDER BY key ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list settings")?;

        rows.into_iter().map(record_from_row).collect()
    }

    /// Insert every known setting that is missing, using its default value.
    /// Existing rows are left as they are. Returns the number inserted.
    pub async fn ensure_defaults(&self) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open settings seed transaction")?;

        let mut inserted = 0;
        for setting in KnownSetting::ALL {
            let result = sqlx::query(
                r#"
                INSERT INTO system_settings (key, value, description, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(key) DO NOTHING
                "#,
            )
            .bind(setting.as_str())
            .bind(setting.default_value())
            .bind(setting.description())
            .bind(Utc::now().timestamp_micros())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to seed setting {setting}"))?;

            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .context("failed to commit settings seed transaction")?;

        if inserted > 0 {
            tracing::info!(inserted, "seeded default settings");
        }

        Ok(inserted)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(SettingsError::Validation("key must not be empty".into()).into());
    }

    if key.contains('\0') {
        return Err(
            SettingsError::Validation("key must not contain NUL characters".into()).into(),
        );
    }

    let length = key.chars().count();
    if length > MAX_KEY_CHARS {
        return Err(SettingsError::Validation(format!(
            "key is {length} characters long, maximum is {MAX_KEY_CHARS}"
        ))
        .into());
    }

    Ok(())
}

fn record_from_row(row: sqlx::sqlite::SqliteRow) -> Result<SettingsRecord> {
    let updated_at_micros: i64 = row
        .try_get("updated_at")
        .context("failed to read setting updated_at")?;
    let updated_at = DateTime::<Utc>::from_timestamp_micros(updated_at_micros)
        .with_context(|| format!("invalid setting updated_at in database: {updated_at_micros}"))?;

    Ok(SettingsRecord {
        id: row.try_get("id").context("failed to read setting id")?,
        key: row.try_get("key").context("failed to read setting key")?,
        value: row
            .try_get("value")
            .context("failed to read setting value")?,
        description: row
            .try_get("description")
            .context("failed to read setting description")?,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::Db;
    use crate::error::Error;

    async fn setup_store() -> SettingsStore {
        let db = Db::connect_in_memory()
            .await
            .expect("in-memory sqlite should connect");
        SettingsStore::new(db.sqlite)
    }

    #[tokio::test]
    async fn create_then_get_returns_same_record() {
        let store = setup_store().await;
        let created = store
            .create("ui.theme", Some("dark"), Some("Colour scheme"))
            .await
            .expect("setting should be created");

        let fetched = store
            .get_by_key("ui.theme")
            .await
            .expect("lookup should succeed")
            .expect("setting should exist");

        assert_eq!(fetched, created);
        assert_eq!(fetched.value.as_deref(), Some("dark"));
        assert_eq!(fetched.description.as_deref(), Some("Colour scheme"));
        assert!(fetched.id > 0);
    }

    #[tokio::test]
    async fn stores_known_key_value() {
        let store = setup_store().await;
        store
            .create("transcription.max_retries", Some("5"), None)
            .await
            .expect("setting should be created");

        let fetched = store
            .get_by_key("transcription.max_retries")
            .await
            .expect("lookup should succeed")
            .expect("setting should exist");
        assert_eq!(fetched.value.as_deref(), Some("5"));
        assert!(fetched.description.is_none());
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let store = setup_store().await;
        let fetched = store.get_by_key("nope").await.expect("lookup should succeed");
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn rejects_duplicate_key() {
        let store = setup_store().await;
        store
            .create("feature.beta", Some("true"), None)
            .await
            .expect("first create should succeed");

        let error = store
            .create("feature.beta", Some("false"), None)
            .await
            .expect_err("second create must fail");

        assert!(
            matches!(
                error,
                Error::Settings(SettingsError::DuplicateKey { ref key }) if key == "feature.beta"
            ),
            "unexpected error: {error}"
        );

        let kept = store
            .get_by_key("feature.beta")
            .await
            .expect("lookup should succeed")
            .expect("setting should exist");
        assert_eq!(kept.value.as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn update_replaces_fields_and_advances_timestamp() {
        let store = setup_store().await;
        let created = store
            .create("limits.max_upload_mb", Some("10"), Some("old note"))
            .await
            .expect("setting should be created");

        let updated = store
            .update("limits.max_upload_mb", Some("20"), Some("new note"))
            .await
            .expect("update should succeed");

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.value.as_deref(), Some("20"));
        assert_eq!(updated.description.as_deref(), Some("new note"));
        assert!(
            updated.updated_at > created.updated_at,
            "expected {} > {}",
            updated.updated_at,
            created.updated_at
        );

        let again = store
            .update("limits.max_upload_mb", Some("30"), None)
            .await
            .expect("second update should succeed");
        assert!(again.updated_at > updated.updated_at);
        assert!(again.description.is_none(), "description should be cleared");

        let fetched = store
            .get_by_key("limits.max_upload_mb")
            .await
            .expect("lookup should succeed")
            .expect("setting should exist");
        assert_eq!(fetched, again);
    }

    #[tokio::test]
    async fn update_of_missing_key_is_not_found() {
        let store = setup_store().await;
        let error = store
            .update("ghost", Some("1"), None)
            .await
            .expect_err("update of missing key must fail");

        assert!(matches!(
            error.as_settings(),
            Some(SettingsError::NotFound { key }) if key == "ghost"
        ));
        assert!(store.get_by_key("ghost").await.expect("lookup").is_none());
        assert!(store.list_all().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn enforces_key_length() {
        let store = setup_store().await;

        let exact = "k".repeat(MAX_KEY_CHARS);
        store
            .create(&exact, None, None)
            .await
            .expect("100 character key should be accepted");

        let too_long = "k".repeat(MAX_KEY_CHARS + 1);
        let error = store
            .create(&too_long, None, None)
            .await
            .expect_err("101 character key must fail");
        assert!(matches!(error.as_settings(), Some(SettingsError::Validation(_))));

        // Characters, not bytes.
        let multibyte = "é".repeat(MAX_KEY_CHARS);
        store
            .create(&multibyte, Some("x"), None)
            .await
            .expect("100 multibyte characters should be accepted");
    }

    #[tokio::test]
    async fn rejects_empty_key() {
        let store = setup_store().await;
        let error = store
            .create("", Some("x"), None)
            .await
            .expect_err("empty key must fail");
        assert!(matches!(error.as_settings(), Some(SettingsError::Validation(_))));
    }

    #[tokio::test]
    async fn rejects_key_with_nul_character() {
        let store = setup_store().await;
        for key in ["\0abc", "x\0", "a\0b"] {
            let error = store
                .create(key, Some("x"), None)
                .await
                .expect_err("key containing NUL must fail");
            assert!(
                matches!(error.as_settings(), Some(SettingsError::Validation(_))),
                "unexpected error for {key:?}: {error}"
            );
        }
        assert!(store.list_all().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn null_value_is_stored() {
        let store = setup_store().await;
        let created = store
            .create("maintenance.window", None, None)
            .await
            .expect("setting should be created");
        assert!(created.value.is_none());
        assert_eq!(
            created.to_string(),
            "SettingsRecord(key=maintenance.window, value=None)"
        );
    }

    #[tokio::test]
    async fn list_all_returns_every_record_by_key() {
        let store = setup_store().await;
        for key in ["b.second", "c.third", "a.first"] {
            store
                .create(key, Some("v"), None)
                .await
                .expect("setting should be created");
        }

        let keys: Vec<String> = store
            .list_all()
            .await
            .expect("list should succeed")
            .into_iter()
            .map(|record| record.key)
            .collect();

        assert_eq!(keys, vec!["a.first", "b.second", "c.third"]);
    }

    #[tokio::test]
    async fn ensure_defaults_seeds_once_without_overwriting() {
        let store = setup_store().await;

        let inserted = store.ensure_defaults().await.expect("seed should succeed");
        assert_eq!(inserted, KnownSetting::ALL.len() as u64);

        store
            .update(
                KnownSetting::TranscriptionMaxRetries.as_str(),
                Some("7"),
                None,
            )
            .await
            .expect("update should succeed");

        let inserted = store.ensure_defaults().await.expect("reseed should succeed");
        assert_eq!(inserted, 0);

        let kept = store
            .get_by_key(KnownSetting::TranscriptionMaxRetries.as_str())
            .await
            .expect("lookup should succeed")
            .expect("setting should exist");
        assert_eq!(kept.value.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn concurrent_creates_of_one_key_have_single_winner() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = DatabaseConfig {
            max_connections: 4,
            ..Default::default()
        };
        let db = Db::connect(&dir.path().join("settings.db"), &config)
            .await
            .expect("database should open");
        let store = SettingsStore::new(db.sqlite.clone());

        let handles: Vec<_> = (0..8)
            .map(|index| {
                let store = store.clone();
                tokio::spawn(async move {
                    let value = index.to_string();
                    store.create("race.key", Some(&value), None).await
                })
            })
            .collect();

        let mut created = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.expect("task should not panic") {
                Ok(_) => created += 1,
                Err(Error::Settings(SettingsError::DuplicateKey { .. })) => duplicates += 1,
                Err(error) => panic!("unexpected error: {error}"),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(store.list_all().await.expect("list").len(), 1);

        db.close().await;
    }
}
