//! Error types for lifecycle operations.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::backup::BackupError;
use crate::session::SessionError;

/// Step of a lifecycle operation, carried by errors for diagnosis.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Capturing the safety backup.
    BackingUp,
    /// Sending the command batch.
    SendingCommands,
    /// Persisting the configuration on the device.
    Saving,
    /// Reading the live configuration for a diff.
    ReadingLiveConfig,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BackingUp => "backing up",
            Self::SendingCommands => "sending commands",
            Self::Saving => "saving",
            Self::ReadingLiveConfig => "reading live configuration",
        };
        f.write_str(label)
    }
}

/// User-visible class of a lifecycle failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// Refused before touching the device.
    Refused,
    /// The device could not be reached or read.
    Unreachable,
    /// The safety backup could not be written.
    BackupFailed,
    /// Stopped after the safety backup was written, before anything was
    /// sent to the device.
    Aborted,
    /// The change was attempted and failed partway.
    Partial,
}

/// Errors raised by [`LifecycleManager`](crate::manager::LifecycleManager).
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LifecycleError {
    /// Raised when the candidate or backup file does not exist.
    #[error("configuration file not found: {path}")]
    CandidateMissing {
        /// Requested file.
        path: Utf8PathBuf,
    },
    /// Raised when the candidate file cannot be read.
    #[error("failed to read configuration file {path}: {message}")]
    CandidateUnreadable {
        /// Requested file.
        path: Utf8PathBuf,
        /// Underlying I/O error message.
        message: String,
    },
    /// Raised when the candidate holds no commands.
    #[error("no valid configuration commands found in {path}")]
    NoCommands {
        /// Requested file.
        path: Utf8PathBuf,
    },
    /// Raised when writing a backup fails.
    #[error("failed to create backup: {source}")]
    Backup {
        /// Underlying store error.
        #[source]
        source: BackupError,
    },
    /// Raised when the device session fails.
    #[error("{stage} failed on {host}: {source}")]
    Session {
        /// Step that was running.
        stage: Stage,
        /// Target device.
        host: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
}

impl LifecycleError {
    /// Classifies the failure for reporting.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::CandidateMissing { .. }
            | Self::CandidateUnreadable { .. }
            | Self::NoCommands { .. } => FailureKind::Refused,
            Self::Backup { .. } => FailureKind::BackupFailed,
            Self::Session {
                stage: Stage::SendingCommands | Stage::Saving,
                ..
            } => FailureKind::Partial,
            Self::Session { .. } => FailureKind::Unreachable,
        }
    }

    pub(crate) fn session(stage: Stage, host: &str, source: SessionError) -> Self {
        Self::Session {
            stage,
            host: host.to_owned(),
            source,
        }
    }
}

impl From<BackupError> for LifecycleError {
    fn from(source: BackupError) -> Self {
        Self::Backup { source }
    }
}

/// Outcome of one apply invocation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ApplyResult {
    /// Safety backup written before applying, when one was requested.
    pub backup_file: Option<Utf8PathBuf>,
    /// `true` once the batch was sent and saved.
    pub applied: bool,
    /// Failure description when `applied` is `false`.
    pub error: Option<String>,
}

/// Failed apply, carrying the populated [`ApplyResult`].
///
/// `result.backup_file` names the recovery snapshot when one was written.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct ApplyError {
    /// Diagnostic result with `applied == false`.
    pub result: ApplyResult,
    /// Underlying failure.
    #[source]
    pub source: Box<LifecycleError>,
}

impl ApplyError {
    pub(crate) fn new(mut result: ApplyResult, source: LifecycleError) -> Self {
        result.applied = false;
        result.error = Some(source.to_string());
        Self {
            result,
            source: Box::new(source),
        }
    }

    /// Classifies the failure for reporting.
    ///
    /// A refusal raised once the safety backup exists is reported as
    /// [`FailureKind::Aborted`], since the device was already read.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self.source.kind() {
            FailureKind::Refused if self.result.backup_file.is_some() => FailureKind::Aborted,
            kind => kind,
        }
    }

    /// Recovery snapshot written before the failure, if any.
    #[must_use]
    pub fn backup_file(&self) -> Option<&Utf8Path> {
        self.result.backup_file.as_deref()
    }
}
