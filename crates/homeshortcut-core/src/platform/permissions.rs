//! Socket file permission handling.

use crate::error::{Result, ShortcutError};
use std::path::Path;
use tracing::debug;

/// Set the permission bits of a bound socket file.
///
/// The service socket is made world read/write (`0o666`) so that any local
/// application can connect; peers are identified by their credentials, not by
/// file ownership.
pub fn set_socket_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = std::fs::Permissions::from_mode(mode);
    std::fs::set_permissions(path, permissions)
        .map_err(|e| ShortcutError::io_with_path(e, path))?;
    debug!("Set socket mode {:o} on: {}", mode, path.display());
    Ok(())
}

/// Remove a socket file left behind by a previous server.
///
/// A missing file is not an error.
pub fn remove_stale_socket(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed stale socket: {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ShortcutError::io_with_path(e, path)),
    }
}

/// Identity of a socket file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketFileId {
    dev: u64,
    ino: u64,
}

impl SocketFileId {
    /// Identity of the file currently at `path`.
    pub fn of(path: &Path) -> Result<Self> {
        use std::os::unix::fs::MetadataExt;

        let metadata = std::fs::symlink_metadata(path).map_err(|e| ShortcutError::io_with_path(e, path))?;
        Ok(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }
}

/// Remove the socket file at `path` only if it is still the file `owner`
/// refers to. Returns whether it was removed.
///
/// A later server may have bound a new socket at the same path; that file is
/// left alone.
pub fn remove_owned_socket(path: &Path, owner: SocketFileId) -> Result<bool> {
    match SocketFileId::of(path) {
        Ok(current) if current == owner => {
            remove_stale_socket(path)?;
            Ok(true)
        }
        Ok(_) => {
            debug!("Socket {} was rebound, leaving it in place", path.display());
            Ok(false)
        }
        Err(ShortcutError::Io { source: Some(e), .. }) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
