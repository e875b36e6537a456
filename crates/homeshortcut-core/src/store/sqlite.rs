//! SQLite-backed shortcut store.

use super::{ShortcutFilter, ShortcutRecord, ShortcutStore};
use crate::config::StoreConfig;
use crate::error::{Result, ShortcutError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

const SELECT_COLUMNS: &str = "SELECT package, icon, name, extra_key, extra_data, installed_at FROM shortcuts";

/// Shortcut store in a single SQLite table.
///
/// Uses WAL mode so the daemon and inspection tools can read concurrently,
/// and `Arc<Mutex<Connection>>` for thread safety within a process.
#[derive(Clone)]
pub struct SqliteShortcutStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteShortcutStore {
    /// Open the store at the default platform location.
    pub fn open() -> Result<Self> {
        let db_path = crate::platform::store_db_path()?;
        Self::open_at(&db_path)
    }

    /// Open the store at a specific path, creating it if needed.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| ShortcutError::Io {
                    message: format!("Failed to create store directory: {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;
        debug!("Opened shortcut store at {}", db_path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA busy_timeout={};\n\
             PRAGMA synchronous=NORMAL;",
            StoreConfig::BUSY_TIMEOUT_MS,
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS shortcuts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                package TEXT NOT NULL,
                icon TEXT,
                name TEXT NOT NULL,
                extra_key TEXT,
                extra_data TEXT,
                installed_at TEXT NOT NULL,
                UNIQUE (package, name)
            );

            CREATE INDEX IF NOT EXISTS idx_shortcuts_package ON shortcuts(package);",
        )?;
        Ok(())
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ShortcutError::Database {
            message: "Failed to acquire store connection lock".to_string(),
            source: None,
        })
    }

    fn insert_with(conn: &Connection, record: &ShortcutRecord) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO shortcuts (package, icon, name, extra_key, extra_data, installed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.package,
                record.icon,
                record.name,
                record.extra_key,
                record.extra_data,
                now
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref failure, _)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                ShortcutError::AlreadyExists {
                    package: record.package.clone(),
                    name: record.name.clone(),
                }
            }
            other => other.into(),
        })?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShortcutRecord> {
    let installed_at: String = row.get(5)?;
    Ok(ShortcutRecord {
        package: row.get(0)?,
        icon: row.get(1)?,
        name: row.get(2)?,
        extra_key: row.get(3)?,
        extra_data: row.get(4)?,
        installed_at: DateTime::parse_from_rfc3339(&installed_at)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
    })
}

impl ShortcutStore for SqliteShortcutStore {
    fn get_shortcuts(&self, package: Option<&str>) -> Result<Vec<ShortcutRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE (?1 IS NULL OR package = ?1) ORDER BY id",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![package], row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn insert(&self, record: &ShortcutRecord) -> Result<()> {
        let conn = self.lock_conn()?;
        Self::insert_with(&conn, record)?;
        debug!("Stored shortcut {}/{}", record.package, record.name);
        Ok(())
    }

    fn delete(&self, filter: &ShortcutFilter) -> Result<usize> {
        let conn = self.lock_conn()?;
        let removed = conn.execute(
            "DELETE FROM shortcuts
             WHERE (?1 IS NULL OR package = ?1)
               AND (?2 IS NULL OR name = ?2)
               AND (?3 IS NULL OR extra_key = ?3)",
            params![filter.package, filter.name, filter.extra_key],
        )?;
        debug!("Removed {} shortcuts matching {:?}", removed, filter);
        Ok(removed)
    }

    fn replace_package(&self, package: &str, records: &[ShortcutRecord]) -> Result<()> {
        if let Some(stray) = records.iter().find(|r| r.package != package) {
            return Err(ShortcutError::invalid(format!(
                "record for {} in replacement of {}",
                stray.package, package
            )));
        }

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM shortcuts WHERE package = ?1", params![package])?;
        for record in records {
            Self::insert_with(&tx, record)?;
        }
        tx.commit()?;

        debug!(
            "Replaced shortcuts of {}: {} removed, {} stored",
            package,
            removed,
            records.len()
        );
        Ok(())
    }
}
