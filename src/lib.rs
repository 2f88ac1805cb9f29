//! System settings: a SQLite-backed key/value configuration store.

pub mod config;
pub mod db;
pub mod error;
pub mod settings;

pub use error::{Error, Result};
