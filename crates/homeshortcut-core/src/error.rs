//! Error types for the shortcut service.
//!
//! Transport and protocol failures stay local to one connection. Callers only
//! ever see them as the negative result code delivered through their reply
//! callback, which is what [`ShortcutError::to_result_code`] produces.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the shortcut library.
#[derive(Debug, Error)]
pub enum ShortcutError {
    // Socket errors
    #[error("Communication error: {message}")]
    Comm {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    // Protocol errors
    #[error("Invalid packet: {message}")]
    Invalid { message: String },

    #[error("Internal fault: {message}")]
    Fault { message: String },

    #[error("Out of memory: {message}")]
    OutOfMemory { message: String },

    // Persistence errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Policy rejections surfaced by application handlers
    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Shortcut already exists: {package}/{name}")]
    AlreadyExists { package: String, name: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for shortcut operations.
pub type Result<T> = std::result::Result<T, ShortcutError>;

impl From<std::io::Error> for ShortcutError {
    fn from(err: std::io::Error) -> Self {
        ShortcutError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ShortcutError {
    fn from(err: serde_json::Error) -> Self {
        ShortcutError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for ShortcutError {
    fn from(err: rusqlite::Error) -> Self {
        ShortcutError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl ShortcutError {
    /// Create a communication error from a socket failure.
    pub fn comm(context: impl Into<String>, err: std::io::Error) -> Self {
        ShortcutError::Comm {
            message: format!("{}: {}", context.into(), err),
            source: Some(err),
        }
    }

    /// Create a protocol violation error.
    pub fn invalid(message: impl Into<String>) -> Self {
        ShortcutError::Invalid {
            message: message.into(),
        }
    }

    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ShortcutError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Convert to the negative errno carried in an acknowledgement.
    ///
    /// | Error                          | Code            |
    /// |--------------------------------|-----------------|
    /// | `Comm`                         | `-ECOMM`        |
    /// | `Timeout`                      | `-ETIMEDOUT`    |
    /// | `Invalid`                      | `-EINVAL`       |
    /// | `Fault`                        | `-EFAULT`       |
    /// | `OutOfMemory`                  | `-ENOMEM`       |
    /// | `Io`, `Database`, `Json`       | `-EIO`          |
    /// | `NotSupported`                 | `-ENOTSUP`      |
    /// | `PermissionDenied`             | `-EACCES`       |
    /// | `AlreadyExists`                | `-EEXIST`       |
    /// | `Config`                       | `-EINVAL`       |
    pub fn to_result_code(&self) -> i32 {
        let errno = match self {
            ShortcutError::Comm { .. } => libc::ECOMM,
            ShortcutError::Timeout(_) => libc::ETIMEDOUT,
            ShortcutError::Invalid { .. } | ShortcutError::Config { .. } => libc::EINVAL,
            ShortcutError::Fault { .. } => libc::EFAULT,
            ShortcutError::OutOfMemory { .. } => libc::ENOMEM,
            ShortcutError::Io { .. }
            | ShortcutError::Database { .. }
            | ShortcutError::Json { .. } => libc::EIO,
            ShortcutError::NotSupported(_) => libc::ENOTSUP,
            ShortcutError::PermissionDenied(_) => libc::EACCES,
            ShortcutError::AlreadyExists { .. } => libc::EEXIST,
        };
        -errno
    }

    /// Whether a non-blocking socket call found the socket not ready.
    pub fn is_would_block(&self) -> bool {
        matches!(
            self,
            ShortcutError::Comm { source: Some(e), .. } if e.kind() == std::io::ErrorKind::WouldBlock
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShortcutError::AlreadyExists {
            package: "com.example.app".into(),
            name: "My Shortcut".into(),
        };
        assert_eq!(
            err.to_string(),
            "Shortcut already exists: com.example.app/My Shortcut"
        );
    }

    #[test]
    fn test_result_codes_are_negative_errno() {
        assert_eq!(ShortcutError::invalid("bad kind").to_result_code(), -libc::EINVAL);
        assert_eq!(
            ShortcutError::Fault {
                message: "short write".into()
            }
            .to_result_code(),
            -libc::EFAULT
        );
        assert_eq!(
            ShortcutError::PermissionDenied("com.example".into()).to_result_code(),
            -libc::EACCES
        );
    }

    #[test]
    fn test_timeout_maps_to_etimedout() {
        let err = ShortcutError::Timeout(std::time::Duration::from_secs(2));
        assert_eq!(err.to_result_code(), -libc::ETIMEDOUT);
        assert_eq!(err.to_string(), "Timed out after 2s");
    }

    #[test]
    fn test_would_block() {
        let busy = ShortcutError::comm(
            "send",
            std::io::Error::from(std::io::ErrorKind::WouldBlock),
        );
        assert!(busy.is_would_block());

        let gone = ShortcutError::comm(
            "send",
            std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        );
        assert!(!gone.is_would_block());
        assert!(!ShortcutError::Timeout(std::time::Duration::from_secs(1)).is_would_block());
    }
}
