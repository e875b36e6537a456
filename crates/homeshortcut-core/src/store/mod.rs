//! Persistent record of installed shortcuts.
//!
//! The home screen keeps one record per shortcut it accepted so that they can
//! be listed, and removed or refreshed when the owning package is uninstalled
//! or upgraded.

mod sqlite;

pub use sqlite::SqliteShortcutStore;

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored shortcut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ShortcutRecord {
    pub package: String,
    pub icon: Option<String>,
    pub name: String,
    pub extra_key: Option<String>,
    pub extra_data: Option<String>,
    /// Set by the store on insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,
}

impl ShortcutRecord {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            icon: None,
            name: name.into(),
            extra_key: None,
            extra_data: None,
            installed_at: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, data: impl Into<String>) -> Self {
        self.extra_key = Some(key.into());
        self.extra_data = Some(data.into());
        self
    }
}

/// Selects records for deletion. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortcutFilter {
    pub package: Option<String>,
    pub name: Option<String>,
    pub extra_key: Option<String>,
}

impl ShortcutFilter {
    pub fn package(package: impl Into<String>) -> Self {
        Self {
            package: Some(package.into()),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_extra_key(mut self, key: impl Into<String>) -> Self {
        self.extra_key = Some(key.into());
        self
    }
}

/// Storage backend for shortcut records.
pub trait ShortcutStore: Send + Sync {
    /// All records, or only those of `package`, in insertion order.
    fn get_shortcuts(&self, package: Option<&str>) -> Result<Vec<ShortcutRecord>>;

    /// Add a record. Fails with `AlreadyExists` when the package already has
    /// a shortcut of the same name.
    fn insert(&self, record: &ShortcutRecord) -> Result<()>;

    /// Remove every record matching `filter`, returning how many were removed.
    fn delete(&self, filter: &ShortcutFilter) -> Result<usize>;

    /// Replace all records of `package` with `records` atomically.
    ///
    /// Running it twice with the same input leaves the same contents, which
    /// is what reinstall and upgrade flows rely on.
    fn replace_package(&self, package: &str, records: &[ShortcutRecord]) -> Result<()>;
}
