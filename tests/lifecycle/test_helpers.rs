//! Shared fixtures for lifecycle BDD scenarios.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use rstest::fixture;
use rtxconfig::test_support::{FailurePoint, ScriptedSession};
use rtxconfig::{
    ApplyError, ApplyResult, LifecycleError, LifecycleManager, RetentionPolicy, ValidationResult,
};
use tempfile::TempDir;

pub const HOST: &str = "192.168.100.1";
pub const LIVE_CONFIG: &str =
    "ip lan1 address 192.168.100.1/24\nip route default gateway 192.168.100.254\n";
pub const CANDIDATE: &str =
    "# branch office\n\nip lan1 address 192.168.1.1/24\n  ip route default gateway 192.168.1.254\n";
pub const CANDIDATE_COMMANDS: [&str; 2] = [
    "ip lan1 address 192.168.1.1/24",
    "ip route default gateway 192.168.1.254",
];

/// Device double plus a scratch directory holding backups and candidates.
#[derive(Clone, Debug)]
pub struct Device {
    pub root: Utf8PathBuf,
    pub manager: LifecycleManager,
    pub session: ScriptedSession,
    _tmp: Arc<TempDir>,
}

impl Device {
    pub fn new(failure: Option<FailurePoint>) -> Self {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("create scenario tempdir: {err}"));
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("tempdir should be utf8: {}", path.display()));
        let manager = LifecycleManager::new(
            HOST,
            RetentionPolicy {
                directory: root.join("backups"),
                keep_days: 30,
            },
        );
        let scripted = ScriptedSession::new(LIVE_CONFIG);
        let session = match failure {
            Some(point) => scripted.failing_at(point),
            None => scripted,
        }
        .connected();
        Self {
            root,
            manager,
            session,
            _tmp: Arc::new(tmp),
        }
    }

    pub fn write(&self, name: &str, contents: &str) -> Utf8PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, contents).unwrap_or_else(|err| panic!("write {path}: {err}"));
        path
    }

    pub fn backup_directory(&self) -> &Utf8Path {
        self.manager.store().directory()
    }
}

/// Result of the `When` step.
#[derive(Debug, Default)]
pub enum Outcome {
    #[default]
    Pending,
    Apply(Result<ApplyResult, ApplyError>),
    Restore(Result<bool, LifecycleError>),
    Purge(usize),
    Validation(ValidationResult),
}

#[fixture]
pub fn device() -> Device {
    Device::new(None)
}

#[fixture]
pub fn outcome() -> Outcome {
    Outcome::Pending
}
