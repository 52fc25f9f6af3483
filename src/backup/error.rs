//! Error types for the backup store.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised while writing or enumerating backups.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BackupError {
    /// Raised when a filesystem operation on the backup directory fails.
    #[error("failed to {action} {path}: {message}")]
    Io {
        /// Operation that failed, such as `write` or `list`.
        action: &'static str,
        /// Path the operation targeted.
        path: Utf8PathBuf,
        /// Underlying I/O error message.
        message: String,
    },
    /// Raised when a suffix would escape the backup directory.
    #[error("backup suffix {suffix:?} must not contain path separators")]
    InvalidSuffix {
        /// Offending suffix.
        suffix: String,
    },
}

impl BackupError {
    pub(crate) fn io(action: &'static str, path: impl Into<Utf8PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            message: err.to_string(),
        }
    }
}
