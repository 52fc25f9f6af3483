//! Configuration lifecycle orchestration.
//!
//! [`LifecycleManager`] composes the backup store, validator and differ
//! around a caller-supplied [`Session`]. Every state-changing operation takes
//! its safety backup first; a failed apply leaves that backup on disk as the
//! recovery path and never rolls back on its own.

mod error;

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{error, info, warn};

use crate::backup::{BackupError, BackupRecord, BackupStore, RetentionPolicy};
use crate::commands::CommandSet;
use crate::config::RtxConfig;
use crate::differ::{candidate_label, live_label, unified_diff};
use crate::session::Session;
use crate::text_file;
use crate::validator::{ValidationResult, Validator};

pub use error::{ApplyError, ApplyResult, FailureKind, LifecycleError, Stage};

/// Suffix of the safety backup taken before a restore.
pub const BEFORE_RESTORE_SUFFIX: &str = "before_restore";
/// Prefix of the safety backup suffix taken before an apply.
pub const BEFORE_APPLY_PREFIX: &str = "before_apply";

/// Orchestrates backup, apply, diff and restore for one device.
#[derive(Clone, Debug)]
pub struct LifecycleManager {
    host: String,
    store: BackupStore,
    validator: Validator,
}

impl LifecycleManager {
    /// Creates a manager for `host` storing backups under `policy`.
    #[must_use]
    pub fn new(host: impl Into<String>, policy: RetentionPolicy) -> Self {
        Self {
            host: host.into(),
            store: BackupStore::new(policy),
            validator: Validator::default(),
        }
    }

    /// Creates a manager from loaded settings.
    #[must_use]
    pub fn from_config(config: &RtxConfig) -> Self {
        Self::new(config.host.clone(), config.retention_policy())
    }

    /// Device this manager targets.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Backing snapshot store.
    #[must_use]
    pub const fn store(&self) -> &BackupStore {
        &self.store
    }

    /// Captures the live configuration as a new snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Session`] when the device cannot be read and
    /// [`LifecycleError::Backup`] when the snapshot cannot be written.
    pub fn backup<S>(&self, session: &mut S, suffix: &str) -> Result<BackupRecord, LifecycleError>
    where
        S: Session + ?Sized,
    {
        info!(host = %self.host, suffix, "creating backup");
        let running = session
            .get_running_config()
            .map_err(|err| LifecycleError::session(Stage::BackingUp, &self.host, err))?;
        Ok(self.store.capture(&running, suffix)?)
    }

    /// Writes the live configuration to an explicit `path`, creating parents.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Session`] when the device cannot be read and
    /// [`LifecycleError::Backup`] when the file cannot be written.
    pub fn backup_to<S>(&self, session: &mut S, path: &Utf8Path) -> Result<(), LifecycleError>
    where
        S: Session + ?Sized,
    {
        let running = session
            .get_running_config()
            .map_err(|err| LifecycleError::session(Stage::BackingUp, &self.host, err))?;
        text_file::write_text(path, &running)
            .map_err(|err| LifecycleError::from(BackupError::io("write", path, &err)))?;
        info!(host = %self.host, path = %path, "configuration written");
        Ok(())
    }

    /// Applies the commands in `candidate` to the device and saves them.
    ///
    /// With `create_backup`, a `before_apply_<stem>` snapshot is written
    /// first; if that fails nothing is sent.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError`] carrying the populated [`ApplyResult`]; its
    /// `backup_file` still names the safety snapshot when one was written.
    pub fn apply<S>(
        &self,
        session: &mut S,
        candidate: &Utf8Path,
        create_backup: bool,
    ) -> Result<ApplyResult, ApplyError>
    where
        S: Session + ?Sized,
    {
        let mut result = ApplyResult::default();
        match self.run_apply(session, candidate, create_backup, &mut result) {
            Ok(count) => {
                result.applied = true;
                info!(host = %self.host, file = %candidate, commands = count, "configuration applied");
                Ok(result)
            }
            Err(err) => {
                error!(host = %self.host, file = %candidate, error = %err, "failed to apply configuration");
                Err(ApplyError::new(result, err))
            }
        }
    }

    fn run_apply<S>(
        &self,
        session: &mut S,
        candidate: &Utf8Path,
        create_backup: bool,
        result: &mut ApplyResult,
    ) -> Result<usize, LifecycleError>
    where
        S: Session + ?Sized,
    {
        ensure_exists(candidate)?;

        if create_backup {
            let record = self.backup(session, &before_apply_suffix(candidate))?;
            result.backup_file = Some(record.path);
        }

        let commands = read_commands(candidate)?;
        info!(host = %self.host, count = commands.len(), "applying configuration commands");
        session
            .send_command_batch(commands.as_slice())
            .map_err(|err| LifecycleError::session(Stage::SendingCommands, &self.host, err))?;
        session
            .save_config()
            .map_err(|err| LifecycleError::session(Stage::Saving, &self.host, err))?;
        Ok(commands.len())
    }

    /// Renders a unified diff from the live configuration to `candidate`.
    ///
    /// An empty string means no differences.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when the candidate is missing or unreadable
    /// or the live configuration cannot be read.
    pub fn diff<S>(&self, session: &mut S, candidate: &Utf8Path) -> Result<String, LifecycleError>
    where
        S: Session + ?Sized,
    {
        ensure_exists(candidate)?;
        let live = session
            .get_running_config()
            .map_err(|err| LifecycleError::session(Stage::ReadingLiveConfig, &self.host, err))?;
        let desired = read_candidate(candidate)?;
        Ok(unified_diff(
            &live,
            &desired,
            &live_label(&self.host),
            &candidate_label(candidate.file_name().unwrap_or(candidate.as_str())),
        ))
    }

    /// Re-applies `backup_file` after snapshotting the current state.
    ///
    /// The `before_restore` snapshot is always taken; the re-apply itself
    /// takes none. Returns `Ok(false)` when the re-apply fails, logging why.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when `backup_file` is missing or the
    /// `before_restore` snapshot cannot be taken.
    pub fn restore<S>(&self, session: &mut S, backup_file: &Utf8Path) -> Result<bool, LifecycleError>
    where
        S: Session + ?Sized,
    {
        ensure_exists(backup_file)?;
        info!(host = %self.host, file = %backup_file, "restoring configuration");
        let safety = self.backup(session, BEFORE_RESTORE_SUFFIX)?;

        match self.apply(session, backup_file, false) {
            Ok(result) => {
                info!(host = %self.host, "configuration restored");
                Ok(result.applied)
            }
            Err(err) => {
                error!(
                    host = %self.host,
                    file = %backup_file,
                    safety_backup = %safety.path,
                    error = %err,
                    "failed to restore configuration"
                );
                Ok(false)
            }
        }
    }

    /// Purges snapshots under the retention policy.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError`] when the backup directory cannot be listed.
    pub fn cleanup_old_backups(&self) -> Result<usize, BackupError> {
        let removed = self.store.purge()?;
        if removed > 0 {
            info!(removed, "removed old backup files");
        }
        Ok(removed)
    }

    /// Lists snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError`] when the backup directory cannot be listed.
    pub fn list_backups(&self) -> Result<Vec<BackupRecord>, BackupError> {
        self.store.list()
    }

    /// Validates a candidate file without touching the device.
    #[must_use]
    pub fn validate_config_file(&self, path: &Utf8Path) -> ValidationResult {
        self.validator.validate_file(path)
    }
}

fn before_apply_suffix(candidate: &Utf8Path) -> String {
    candidate.file_stem().map_or_else(
        || BEFORE_APPLY_PREFIX.to_owned(),
        |stem| format!("{BEFORE_APPLY_PREFIX}_{stem}"),
    )
}

fn ensure_exists(path: &Utf8Path) -> Result<(), LifecycleError> {
    match text_file::exists(path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(LifecycleError::CandidateMissing {
            path: path.to_path_buf(),
        }),
        Err(err) => {
            warn!(path = %path, error = %err, "cannot check configuration file");
            Err(unreadable(path, &err))
        }
    }
}

fn unreadable(path: &Utf8Path, err: &io::Error) -> LifecycleError {
    LifecycleError::CandidateUnreadable {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn read_candidate(path: &Utf8Path) -> Result<String, LifecycleError> {
    text_file::read_text(path).map_err(|err| unreadable(path, &err))
}

fn read_commands(path: &Utf8Path) -> Result<CommandSet, LifecycleError> {
    let commands = CommandSet::from_file(path).map_err(|err| unreadable(path, &err))?;
    if commands.is_empty() {
        return Err(LifecycleError::NoCommands {
            path: Utf8PathBuf::from(path),
        });
    }
    Ok(commands)
}

#[cfg(test)]
mod tests;
