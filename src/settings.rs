//! System-wide key/value settings: storage plus the known keys layered on top.

pub mod known;
pub mod store;

pub use known::{KnownSetting, TranscriptionRetryPolicy};
pub use store::{MAX_KEY_CHARS, SettingsRecord, SettingsStore};
