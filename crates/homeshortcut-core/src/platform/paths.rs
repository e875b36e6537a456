//! Platform-specific path utilities.

use crate::config::{IpcConfig, StoreConfig};
use crate::error::{Result, ShortcutError};
use std::path::PathBuf;

/// Well-known rendezvous socket path.
///
/// Lives directly in the system temp directory so that every user on the
/// host resolves the same path: `{temp_dir}/.homeshortcut.service`.
pub fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join(IpcConfig::SOCKET_FILE_NAME)
}

/// Get the application data directory.
///
/// # Platform Behavior
/// - **Linux**: `~/.local/share/homeshortcut` (XDG_DATA_HOME)
/// - **macOS**: `~/Library/Application Support/homeshortcut`
pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| ShortcutError::Config {
        message: "Could not determine platform data directory".to_string(),
    })?;
    Ok(data_dir.join(StoreConfig::APP_DATA_DIR_NAME))
}

/// Get the path to the shortcut store database.
///
/// Returns `{data_dir}/shortcuts.db`.
pub fn store_db_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(StoreConfig::DB_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_socket_path_in_temp_dir() {
        let path = default_socket_path();
        assert!(path.starts_with(std::env::temp_dir()));
        assert!(path.ends_with(".homeshortcut.service"));
    }

    #[test]
    fn test_store_db_path_ends_with_db() {
        let path = store_db_path().unwrap();
        assert!(
            path.to_string_lossy().ends_with("shortcuts.db"),
            "Store path should end with shortcuts.db: {:?}",
            path
        );
    }
}
