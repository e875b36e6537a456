//! Centralized configuration for the shortcut service.
//!
//! Protocol and socket limits live in const structs; the per-process runtime
//! settings (`ServiceConfig`) can be overridden from the environment or a JSON
//! file.

use crate::error::{Result, ShortcutError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Socket and wire protocol limits.
pub struct IpcConfig;

impl IpcConfig {
    /// File name of the rendezvous socket inside the temp directory.
    pub const SOCKET_FILE_NAME: &'static str = ".homeshortcut.service";
    /// Environment variable overriding the socket path.
    pub const SOCKET_PATH_ENV: &'static str = "HOMESHORTCUT_SOCKET";
    /// Permission bits applied to the socket file after bind (world read/write).
    pub const SOCKET_MODE: u32 = 0o666;
    /// Pending-connection queue length passed to listen(2).
    pub const LISTEN_BACKLOG: i32 = 5;

    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
    pub const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

    /// Largest request payload the server will allocate for.
    pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;
    pub const MAX_CONNECTIONS: usize = 64;
}

/// Shortcut store settings.
pub struct StoreConfig;

impl StoreConfig {
    pub const APP_DATA_DIR_NAME: &'static str = "homeshortcut";
    pub const DB_FILENAME: &'static str = "shortcuts.db";
    pub const BUSY_TIMEOUT_MS: u32 = 5000;
}

/// Runtime settings shared by the client and server engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ServiceConfig {
    /// Rendezvous socket path.
    pub socket_path: PathBuf,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// How long a client waits for the acknowledgement (0 = forever).
    pub reply_timeout_ms: u64,
    /// Concurrent server connections before new ones are dropped.
    pub max_connections: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: crate::platform::default_socket_path(),
            connect_timeout_ms: IpcConfig::CONNECT_TIMEOUT.as_millis() as u64,
            reply_timeout_ms: IpcConfig::REPLY_TIMEOUT.as_millis() as u64,
            max_connections: IpcConfig::MAX_CONNECTIONS,
        }
    }
}

impl ServiceConfig {
    /// Default settings bound to a specific socket path.
    pub fn with_socket_path(path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: path.into(),
            ..Self::default()
        }
    }

    /// Default settings, honoring `HOMESHORTCUT_SOCKET` when set.
    pub fn from_env() -> Self {
        match std::env::var_os(IpcConfig::SOCKET_PATH_ENV) {
            Some(path) if !path.is_empty() => Self::with_socket_path(path),
            _ => Self::default(),
        }
    }

    /// Load settings from a JSON file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ShortcutError::io_with_path(e, path))?;
        let config: ServiceConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(ShortcutError::Config {
                message: "socket_path must not be empty".to_string(),
            });
        }
        if self.max_connections == 0 {
            return Err(ShortcutError::Config {
                message: "max_connections must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `None` means wait for the acknowledgement indefinitely.
    pub fn reply_timeout(&self) -> Option<Duration> {
        (self.reply_timeout_ms > 0).then(|| Duration::from_millis(self.reply_timeout_ms))
    }
}
