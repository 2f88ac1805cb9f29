//! Typed view over the conventionally recognized setting keys.
//!
//! The store accepts any key. This layer only gives names, defaults and
//! parsing to the keys other parts of the application agree on.

use crate::error::Result;
use crate::settings::store::SettingsStore;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownSetting {
    /// Stringified integer. `0` means unlimited.
    TranscriptionMaxRetries,
    /// Stringified boolean.
    TranscriptionRetryLimitEnabled,
}

impl KnownSetting {
    pub const ALL: [KnownSetting; 2] = [
        KnownSetting::TranscriptionMaxRetries,
        KnownSetting::TranscriptionRetryLimitEnabled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            KnownSetting::TranscriptionMaxRetries => "transcription.max_retries",
            KnownSetting::TranscriptionRetryLimitEnabled => "transcription.retry_limit_enabled",
        }
    }

    pub fn default_value(self) -> &'static str {
        match self {
            KnownSetting::TranscriptionMaxRetries => "3",
            KnownSetting::TranscriptionRetryLimitEnabled => "true",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            KnownSetting::TranscriptionMaxRetries => {
                "Maximum retry attempts for transcription (0 = unlimited)"
            }
            KnownSetting::TranscriptionRetryLimitEnabled => {
                "Whether transcription retry limits are enforced"
            }
        }
    }
}

impl std::fmt::Display for KnownSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Retry limits for transcription jobs, resolved from the settings table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TranscriptionRetryPolicy {
    pub max_retries: u32,
    pub retry_limit_enabled: bool,
}

impl Default for TranscriptionRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_limit_enabled: true,
        }
    }
}

impl TranscriptionRetryPolicy {
    /// Read the policy, falling back to defaults for missing or malformed values.
    pub async fn load(store: &SettingsStore) -> Result<Self> {
        let defaults = Self::default();

        let max_retries = match read_value(store, KnownSetting::TranscriptionMaxRetries).await? {
            Some(raw) => raw.trim().parse::<u32>().unwrap_or_else(|_| {
                tracing::warn!(
                    key = %KnownSetting::TranscriptionMaxRetries,
                    value = %raw,
                    "invalid integer setting, using default"
                );
                defaults.max_retries
            }),
            None => defaults.max_retries,
        };

        let retry_limit_enabled =
            match read_value(store, KnownSetting::TranscriptionRetryLimitEnabled).await? {
                Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                    tracing::warn!(
                        key = %KnownSetting::TranscriptionRetryLimitEnabled,
                        value = %raw,
                        "invalid boolean setting, using default"
                    );
                    defaults.retry_limit_enabled
                }),
                None => defaults.retry_limit_enabled,
            };

        Ok(Self {
            max_retries,
            retry_limit_enabled,
        })
    }

    /// The enforced limit, or `None` when retries are unlimited.
    pub fn retry_limit(&self) -> Option<u32> {
        if !self.retry_limit_enabled || self.max_retries == 0 {
            None
        } else {
            Some(self.max_retries)
        }
    }

    pub fn should_retry(&self, retries_so_far: u32) -> bool {
        match self.retry_limit() {
            Some(limit) => retries_so_far < limit,
            None => true,
        }
    }
}

async fn read_value(store: &SettingsStore, setting: KnownSetting) -> Result<Option<String>> {
    Ok(store
        .get_by_key(setting.as_str())
        .await?
        .and_then(|record| record.value))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
