//! Unit tests for the lifecycle manager.

use super::*;
use crate::backup::BackupStore;
use crate::session::{SAVE_COMMAND, SHOW_CONFIG_COMMAND};
use crate::test_support::{FailurePoint, ScriptedSession};
use rstest::{fixture, rstest};
use tempfile::TempDir;

const LIVE: &str = "ip lan1 address 192.168.100.1/24\nip route default gateway 192.168.100.254\n";
const CANDIDATE: &str = "# office router\n\nip lan1 address 192.168.1.1/24\n  ip route default gateway 192.168.1.254\n";

struct Workspace {
    _tmp: TempDir,
    root: Utf8PathBuf,
    manager: LifecycleManager,
}

impl Workspace {
    fn write(&self, name: &str, contents: &str) -> Utf8PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, contents).expect("write candidate");
        path
    }

    fn backups(&self) -> Vec<BackupRecord> {
        self.manager.list_backups().expect("list backups")
    }
}

#[fixture]
fn workspace() -> Workspace {
    let tmp = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 tempdir");
    let manager = LifecycleManager::new(
        "192.168.100.1",
        RetentionPolicy {
            directory: root.join("backups"),
            keep_days: 30,
        },
    );
    Workspace {
        _tmp: tmp,
        root,
        manager,
    }
}

#[rstest]
fn backup_stores_running_config_verbatim(workspace: Workspace) {
    let mut session = ScriptedSession::new(LIVE).connected();

    let record = workspace
        .manager
        .backup(&mut session, "manual")
        .expect("backup");

    assert!(record.name.ends_with("_manual.txt"));
    assert_eq!(std::fs::read_to_string(&record.path).expect("read"), LIVE);
    assert_eq!(session.commands(), vec![SHOW_CONFIG_COMMAND.to_owned()]);
}

#[rstest]
fn backup_failure_is_unreachable_and_writes_nothing(workspace: Workspace) {
    let mut session = ScriptedSession::new(LIVE)
        .failing_at(FailurePoint::RunningConfig)
        .connected();

    let err = workspace
        .manager
        .backup(&mut session, "")
        .expect_err("backup should fail");

    assert_eq!(err.kind(), FailureKind::Unreachable);
    assert!(workspace.backups().is_empty());
}

#[rstest]
fn backup_to_writes_explicit_path(workspace: Workspace) {
    let mut session = ScriptedSession::new(LIVE).connected();
    let target = workspace.root.join("exports").join("today.txt");

    workspace
        .manager
        .backup_to(&mut session, &target)
        .expect("backup to file");

    assert_eq!(std::fs::read_to_string(&target).expect("read"), LIVE);
    assert!(workspace.backups().is_empty());
}

#[rstest]
fn apply_backs_up_then_sends_commands_in_order_then_saves(workspace: Workspace) {
    let candidate = workspace.write("office.txt", CANDIDATE);
    let mut session = ScriptedSession::new(LIVE).connected();

    let result = workspace
        .manager
        .apply(&mut session, &candidate, true)
        .expect("apply");

    assert!(result.applied);
    assert!(result.error.is_none());
    let backup = result.backup_file.expect("backup path");
    assert!(backup.as_str().ends_with("_before_apply_office.txt"));
    assert_eq!(std::fs::read_to_string(&backup).expect("read backup"), LIVE);
    assert_eq!(
        session.batches(),
        vec![vec![
            "ip lan1 address 192.168.1.1/24".to_owned(),
            "ip route default gateway 192.168.1.254".to_owned(),
        ]]
    );
    assert_eq!(
        session.commands(),
        vec![SHOW_CONFIG_COMMAND.to_owned(), SAVE_COMMAND.to_owned()]
    );
}

#[rstest]
fn apply_without_backup_skips_snapshot(workspace: Workspace) {
    let candidate = workspace.write("office.txt", CANDIDATE);
    let mut session = ScriptedSession::new(LIVE).connected();

    let result = workspace
        .manager
        .apply(&mut session, &candidate, false)
        .expect("apply");

    assert!(result.applied);
    assert!(result.backup_file.is_none());
    assert!(workspace.backups().is_empty());
    assert_eq!(session.save_count(), 1);
}

#[rstest]
fn apply_batch_failure_keeps_backup_and_propagates(workspace: Workspace) {
    let candidate = workspace.write("office.txt", CANDIDATE);
    let mut session = ScriptedSession::new(LIVE)
        .failing_at(FailurePoint::Batch)
        .connected();

    let err = workspace
        .manager
        .apply(&mut session, &candidate, true)
        .expect_err("apply should fail");

    assert!(!err.result.applied);
    assert!(err.result.error.is_some());
    assert_eq!(err.kind(), FailureKind::Partial);
    let backup = err.backup_file().expect("backup path retained");
    assert!(backup.exists());
    assert_eq!(session.save_count(), 0);
}

#[rstest]
fn apply_save_failure_is_partial(workspace: Workspace) {
    let candidate = workspace.write("office.txt", CANDIDATE);
    let mut session = ScriptedSession::new(LIVE)
        .failing_at(FailurePoint::Save)
        .connected();

    let err = workspace
        .manager
        .apply(&mut session, &candidate, true)
        .expect_err("save should fail");

    assert!(matches!(
        *err.source,
        LifecycleError::Session {
            stage: Stage::Saving,
            ..
        }
    ));
    assert_eq!(session.batches().len(), 1);
}

#[rstest]
fn apply_aborts_when_safety_backup_fails(workspace: Workspace) {
    let candidate = workspace.write("office.txt", CANDIDATE);
    let mut session = ScriptedSession::new(LIVE)
        .failing_at(FailurePoint::RunningConfig)
        .connected();

    let err = workspace
        .manager
        .apply(&mut session, &candidate, true)
        .expect_err("apply should abort");

    assert!(err.backup_file().is_none());
    assert!(session.batches().is_empty());
    assert_eq!(session.save_count(), 0);
}

#[rstest]
fn apply_refuses_missing_candidate_before_touching_device(workspace: Workspace) {
    let mut session = ScriptedSession::new(LIVE).connected();
    let missing = workspace.root.join("missing.txt");

    let err = workspace
        .manager
        .apply(&mut session, &missing, true)
        .expect_err("missing file");

    assert_eq!(err.kind(), FailureKind::Refused);
    assert!(session.commands().is_empty());
    assert!(workspace.backups().is_empty());
}

#[rstest]
fn comment_only_candidate_after_safety_backup_is_aborted(workspace: Workspace) {
    let candidate = workspace.write("empty.txt", "# nothing to do\n\n");
    let mut session = ScriptedSession::new(LIVE).connected();

    let err = workspace
        .manager
        .apply(&mut session, &candidate, true)
        .expect_err("no commands");

    assert!(matches!(*err.source, LifecycleError::NoCommands { .. }));
    assert_eq!(err.kind(), FailureKind::Aborted);
    assert_eq!(err.source.kind(), FailureKind::Refused);
    assert!(err.backup_file().is_some_and(|path| path.exists()));
    assert_eq!(workspace.backups().len(), 1);
    assert!(session.batches().is_empty());
    assert_eq!(session.save_count(), 0);
}

#[rstest]
fn apply_refuses_comment_only_candidate(workspace: Workspace) {
    let candidate = workspace.write("empty.txt", "# nothing to do\n\n");
    let mut session = ScriptedSession::new(LIVE).connected();

    let err = workspace
        .manager
        .apply(&mut session, &candidate, false)
        .expect_err("no commands");

    assert!(matches!(*err.source, LifecycleError::NoCommands { .. }));
    assert_eq!(err.kind(), FailureKind::Refused);
    assert!(session.batches().is_empty());
}

#[rstest]
fn diff_labels_host_and_file(workspace: Workspace) {
    let candidate = workspace.write("office.txt", "ip lan1 address 192.168.100.1/24\n");
    let mut session = ScriptedSession::new(LIVE).connected();

    let diff = workspace
        .manager
        .diff(&mut session, &candidate)
        .expect("diff");

    assert!(diff.starts_with(
        "--- Current RTX830 Config (192.168.100.1)\n+++ File Config (office.txt)\n"
    ));
    assert!(diff.contains("-ip route default gateway 192.168.100.254\n"));
}

#[rstest]
fn diff_against_identical_file_is_empty(workspace: Workspace) {
    let candidate = workspace.write("same.txt", LIVE);
    let mut session = ScriptedSession::new(LIVE).connected();

    let diff = workspace
        .manager
        .diff(&mut session, &candidate)
        .expect("diff");

    assert_eq!(diff, "");
}

#[rstest]
fn restore_snapshots_current_state_then_reapplies(workspace: Workspace) {
    let saved = workspace.write("rtx830_config_20240101_000000.txt", LIVE);
    let mut session = ScriptedSession::new("ip lan1 address 10.0.0.1/24\n").connected();

    let restored = workspace
        .manager
        .restore(&mut session, &saved)
        .expect("restore");

    assert!(restored);
    let backups = workspace.backups();
    assert_eq!(backups.len(), 1);
    assert!(backups.iter().all(|record| record.name.ends_with("_before_restore.txt")));
    assert_eq!(session.batches().len(), 1);
}

#[rstest]
fn restore_failure_returns_false_and_keeps_safety_backup(workspace: Workspace) {
    let saved = workspace.write("rtx830_config_20240101_000000.txt", LIVE);
    let mut session = ScriptedSession::new(LIVE)
        .failing_at(FailurePoint::Batch)
        .connected();

    let restored = workspace
        .manager
        .restore(&mut session, &saved)
        .expect("restore reports failure as false");

    assert!(!restored);
    assert!(
        workspace
            .backups()
            .iter()
            .any(|record| record.name.ends_with("_before_restore.txt"))
    );
}

#[rstest]
fn restore_of_missing_backup_is_refused(workspace: Workspace) {
    let mut session = ScriptedSession::new(LIVE).connected();

    let err = workspace
        .manager
        .restore(&mut session, &workspace.root.join("gone.txt"))
        .expect_err("missing backup");

    assert_eq!(err.kind(), FailureKind::Refused);
    assert!(session.commands().is_empty());
}

#[rstest]
fn validate_delegates_to_validator(workspace: Workspace) {
    let candidate = workspace.write("office.txt", CANDIDATE);

    let result = workspace.manager.validate_config_file(&candidate);

    assert!(result.valid);
    assert_eq!(result.command_count, 2);
}

#[rstest]
fn cleanup_uses_retention_policy(workspace: Workspace) {
    let store: &BackupStore = workspace.manager.store();
    let record = store
        .capture("x\n", "")
        .expect("capture");
    let old = filetime::FileTime::from_unix_time(
        chrono::Local::now().timestamp() - 40 * 86_400,
        0,
    );
    filetime::set_file_mtime(&record.path, old).expect("age backup");

    let removed = workspace.manager.cleanup_old_backups().expect("cleanup");

    assert_eq!(removed, 1);
    assert!(workspace.backups().is_empty());
}
