//! Timestamped configuration snapshots and their retention.
//!
//! The backup directory is the only persisted state: every call rebuilds its
//! view from a directory listing, so the store itself holds nothing beyond
//! the retention policy.

mod error;

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use chrono::{DateTime, Local, TimeDelta};
use tracing::{debug, info, warn};

pub use error::BackupError;

/// Leading component of every backup file name.
pub const BACKUP_PREFIX: &str = "rtx830_config";
/// Extension of every backup file name.
pub const BACKUP_EXTENSION: &str = ".txt";
/// `chrono` format of the timestamp embedded in backup file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A single snapshot discovered on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupRecord {
    /// Full path to the snapshot.
    pub path: Utf8PathBuf,
    /// File name, which is also the snapshot's identity.
    pub name: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Last modification time.
    pub modified: DateTime<Local>,
    /// Whole days elapsed since `modified`.
    pub age_days: i64,
}

/// Age-based retention rule for a backup directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Directory holding the snapshots.
    pub directory: Utf8PathBuf,
    /// Snapshots older than this many days are purged; `<= 0` disables
    /// purging.
    pub keep_days: i64,
}

impl RetentionPolicy {
    /// Returns `true` when purging is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.keep_days > 0
    }

    /// Modification times strictly before the returned instant are expired.
    ///
    /// Returns `None` when purging is disabled or the cutoff is out of range.
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        if !self.is_enabled() {
            return None;
        }
        TimeDelta::try_days(self.keep_days).and_then(|keep| now.checked_sub_signed(keep))
    }
}

/// Directory-backed snapshot store.
#[derive(Clone, Debug)]
pub struct BackupStore {
    policy: RetentionPolicy,
}

impl BackupStore {
    /// Creates a store rooted at the policy's directory.
    #[must_use]
    pub const fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    /// Directory holding the snapshots.
    #[must_use]
    pub fn directory(&self) -> &Utf8Path {
        &self.policy.directory
    }

    /// Retention policy applied by [`Self::purge`].
    #[must_use]
    pub const fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Builds `rtx830_config_<YYYYMMDD>_<HHMMSS>[_<suffix>].txt` for `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::InvalidSuffix`] when `suffix` contains a path
    /// separator.
    pub fn file_name(timestamp: DateTime<Local>, suffix: &str) -> Result<String, BackupError> {
        if suffix.contains(['/', '\\']) {
            return Err(BackupError::InvalidSuffix {
                suffix: suffix.to_owned(),
            });
        }
        let stamp = timestamp.format(TIMESTAMP_FORMAT);
        Ok(if suffix.is_empty() {
            format!("{BACKUP_PREFIX}_{stamp}{BACKUP_EXTENSION}")
        } else {
            format!("{BACKUP_PREFIX}_{stamp}_{suffix}{BACKUP_EXTENSION}")
        })
    }

    /// Returns `true` when `name` follows the backup naming scheme.
    #[must_use]
    pub fn is_backup_name(name: &str) -> bool {
        name.strip_prefix(BACKUP_PREFIX)
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|rest| rest.ends_with(BACKUP_EXTENSION))
    }

    /// Writes `text` verbatim as a new snapshot stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError`] when the suffix is invalid or the directory
    /// cannot be created or written.
    pub fn capture(&self, text: &str, suffix: &str) -> Result<BackupRecord, BackupError> {
        self.capture_at(text, suffix, Local::now())
    }

    /// Writes `text` as a snapshot stamped with `now`.
    ///
    /// The backup directory is created, including parents, when absent.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError`] when the suffix is invalid or the directory
    /// cannot be created or written.
    pub fn capture_at(
        &self,
        text: &str,
        suffix: &str,
        now: DateTime<Local>,
    ) -> Result<BackupRecord, BackupError> {
        let name = Self::file_name(now, suffix)?;
        let directory = self.directory();
        let path = directory.join(&name);

        Dir::create_ambient_dir_all(directory, ambient_authority())
            .map_err(|err| BackupError::io("create", directory, &err))?;
        let dir = Self::open(directory)?;
        dir.write(&name, text)
            .map_err(|err| BackupError::io("write", path.as_path(), &err))?;

        let record = Self::record(&dir, directory, &name, now)
            .map_err(|err| BackupError::io("stat", path.as_path(), &err))?;
        info!(path = %record.path, bytes = record.size_bytes, "configuration backed up");
        Ok(record)
    }

    /// Lists snapshots, newest first.
    ///
    /// A missing directory yields an empty list. Entries that cannot be
    /// inspected are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Io`] when the directory exists but cannot be
    /// read.
    pub fn list(&self) -> Result<Vec<BackupRecord>, BackupError> {
        self.list_at(Local::now())
    }

    /// Lists snapshots, computing ages relative to `now`.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Io`] when the directory exists but cannot be
    /// read.
    pub fn list_at(&self, now: DateTime<Local>) -> Result<Vec<BackupRecord>, BackupError> {
        let directory = self.directory();
        let dir = match Dir::open_ambient_dir(directory, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(BackupError::io("open", directory, &err)),
        };
        let entries = dir
            .entries()
            .map_err(|err| BackupError::io("list", directory, &err))?;

        let mut records = Vec::new();
        for entry in entries {
            let name = match entry.and_then(|item| item.file_name()) {
                Ok(name) => name,
                Err(err) => {
                    warn!(directory = %directory, error = %err, "skipping unreadable backup entry");
                    continue;
                }
            };
            if !Self::is_backup_name(&name) {
                continue;
            }
            match Self::record(&dir, directory, &name, now) {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(file = %name, error = %err, "skipping backup that cannot be inspected");
                }
            }
        }

        records.sort_by(|left, right| {
            right
                .modified
                .cmp(&left.modified)
                .then_with(|| right.name.cmp(&left.name))
        });
        Ok(records)
    }

    /// Deletes snapshots older than the retention policy allows.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Io`] when the directory cannot be listed.
    pub fn purge(&self) -> Result<usize, BackupError> {
        self.purge_at(Local::now())
    }

    /// Deletes snapshots modified strictly before `now - keep_days`.
    ///
    /// Returns the number of files removed; per-file failures are logged and
    /// skipped. A disabled policy removes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Io`] when the directory cannot be listed.
    pub fn purge_at(&self, now: DateTime<Local>) -> Result<usize, BackupError> {
        let Some(cutoff) = self.policy.cutoff(now) else {
            debug!(keep_days = self.policy.keep_days, "backup retention disabled");
            return Ok(0);
        };
        let expired: Vec<BackupRecord> = self
            .list_at(now)?
            .into_iter()
            .filter(|record| record.modified < cutoff)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let dir = Self::open(self.directory())?;
        let mut removed = 0;
        for record in expired {
            match dir.remove_file(&record.name) {
                Ok(()) => {
                    info!(file = %record.name, age_days = record.age_days, "removed expired backup");
                    removed += 1;
                }
                Err(err) => {
                    warn!(file = %record.path, error = %err, "failed to remove expired backup");
                }
            }
        }
        Ok(removed)
    }

    fn open(directory: &Utf8Path) -> Result<Dir, BackupError> {
        Dir::open_ambient_dir(directory, ambient_authority())
            .map_err(|err| BackupError::io("open", directory, &err))
    }

    fn record(
        dir: &Dir,
        directory: &Utf8Path,
        name: &str,
        now: DateTime<Local>,
    ) -> io::Result<BackupRecord> {
        let metadata = dir.metadata(name)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{name} is not a regular file"),
            ));
        }
        let modified: DateTime<Local> = metadata.modified()?.into_std().into();
        Ok(BackupRecord {
            path: directory.join(name),
            name: name.to_owned(),
            size_bytes: metadata.len(),
            modified,
            age_days: now.signed_duration_since(modified).num_days(),
        })
    }
}
