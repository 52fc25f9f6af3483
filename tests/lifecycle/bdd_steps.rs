//! BDD step definitions for backup, apply, restore and purge.

use filetime::FileTime;
use rtxconfig::test_support::FailurePoint;
use rtxconfig::{BackupStore, FailureKind};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{CANDIDATE, CANDIDATE_COMMANDS, Device, LIVE_CONFIG, Outcome};

const SECONDS_PER_DAY: i64 = 86_400;

#[given("a healthy device")]
fn healthy_device() -> Device {
    Device::new(None)
}

#[given("a device whose command batch fails")]
fn batch_fails() -> Device {
    Device::new(Some(FailurePoint::Batch))
}

#[given("a device whose configuration cannot be read")]
fn running_config_fails() -> Device {
    Device::new(Some(FailurePoint::RunningConfig))
}

#[given("a backup directory with backups aged \"{older}\" and \"{newer}\" days")]
fn aged_backups(older: i64, newer: i64) -> Device {
    let device = Device::new(None);
    let store = device.manager.store();
    let now = chrono::Local::now();
    for (age, suffix) in [(older, "older"), (newer, "newer")] {
        let record = store
            .capture(LIVE_CONFIG, &format!("aged_{suffix}"))
            .unwrap_or_else(|err| panic!("seed backup: {err}"));
        let mtime = FileTime::from_unix_time(now.timestamp() - age * SECONDS_PER_DAY, 0);
        filetime::set_file_mtime(&record.path, mtime)
            .unwrap_or_else(|err| panic!("age backup {}: {err}", record.path));
    }
    device
}

#[when("I apply the candidate file with a safety backup")]
fn apply_candidate(device: &Device) -> Outcome {
    let candidate = device.write("branch.txt", CANDIDATE);
    let mut session = device.session.clone();
    Outcome::Apply(device.manager.apply(&mut session, &candidate, true))
}

#[when("I restore the saved backup")]
fn restore_backup(device: &Device) -> Outcome {
    let saved = device.write("rtx830_config_20240101_000000.txt", LIVE_CONFIG);
    let mut session = device.session.clone();
    Outcome::Restore(device.manager.restore(&mut session, &saved))
}

#[when("I purge with a retention of \"{days}\" days")]
fn purge(device: &Device, days: i64) -> Outcome {
    let mut policy = device.manager.store().policy().clone();
    policy.keep_days = days;
    let removed = BackupStore::new(policy)
        .purge()
        .unwrap_or_else(|err| panic!("purge: {err}"));
    Outcome::Purge(removed)
}

#[when("I validate a comment-only file")]
fn validate_comment_only(device: &Device) -> Outcome {
    let path = device.write("empty.txt", "# nothing to apply\n\n   \n");
    Outcome::Validation(device.manager.validate_config_file(&path))
}

#[then("the apply succeeds")]
fn apply_succeeds(outcome: &Outcome) {
    let Outcome::Apply(Ok(result)) = outcome else {
        panic!("expected a successful apply, got {outcome:?}");
    };
    assert!(result.applied);
    assert!(result.error.is_none());
}

#[then("the apply fails with a partial change")]
fn apply_partial(outcome: &Outcome) {
    let Outcome::Apply(Err(err)) = outcome else {
        panic!("expected a failed apply, got {outcome:?}");
    };
    assert_eq!(err.kind(), FailureKind::Partial);
    assert!(!err.result.applied);
    assert!(err.result.error.is_some());
}

#[then("the apply fails before sending commands")]
fn apply_aborted(device: &Device, outcome: &Outcome) {
    let Outcome::Apply(Err(err)) = outcome else {
        panic!("expected a failed apply, got {outcome:?}");
    };
    assert_eq!(err.kind(), FailureKind::Unreachable);
    assert!(err.backup_file().is_none());
    assert!(device.session.batches().is_empty());
    assert_eq!(device.session.save_count(), 0);
}

#[then("the commands are sent in file order")]
fn commands_in_order(device: &Device) {
    let expected: Vec<String> = CANDIDATE_COMMANDS.iter().map(|line| (*line).to_owned()).collect();
    assert_eq!(device.session.batches(), vec![expected]);
}

#[then("the safety backup holds the previous configuration")]
fn safety_backup_kept(outcome: &Outcome) {
    let backup = match outcome {
        Outcome::Apply(Ok(result)) => result.backup_file.clone(),
        Outcome::Apply(Err(err)) => err.backup_file().map(ToOwned::to_owned),
        other => panic!("expected an apply outcome, got {other:?}"),
    }
    .unwrap_or_else(|| panic!("apply should name its safety backup"));
    assert!(backup.as_str().ends_with("_before_apply_branch.txt"));
    let contents =
        std::fs::read_to_string(&backup).unwrap_or_else(|err| panic!("read {backup}: {err}"));
    assert_eq!(contents, LIVE_CONFIG);
}

#[then("the configuration is saved \"{count}\" times")]
fn saved_times(device: &Device, count: usize) {
    assert_eq!(device.session.save_count(), count);
}

#[then("the restore reports failure")]
fn restore_failed(outcome: &Outcome) {
    assert!(
        matches!(outcome, Outcome::Restore(Ok(false))),
        "expected restore to report false, got {outcome:?}"
    );
}

#[then("a before_restore backup exists")]
fn before_restore_exists(device: &Device) {
    let backups = device
        .manager
        .list_backups()
        .unwrap_or_else(|err| panic!("list backups: {err}"));
    assert!(
        backups
            .iter()
            .any(|record| record.name.ends_with("_before_restore.txt")),
        "no before_restore backup in {}",
        device.backup_directory()
    );
}

#[then("\"{count}\" backup is removed")]
fn removed_count(outcome: &Outcome, count: usize) {
    assert!(
        matches!(outcome, Outcome::Purge(removed) if *removed == count),
        "expected {count} removals, got {outcome:?}"
    );
}

#[then("only the backup aged \"{age}\" days remains")]
fn survivor(device: &Device, age: i64) {
    let backups = device
        .manager
        .list_backups()
        .unwrap_or_else(|err| panic!("list backups: {err}"));
    assert_eq!(backups.len(), 1);
    assert!(
        backups
            .iter()
            .all(|record| record.age_days == age && record.name.ends_with("_aged_newer.txt"))
    );
}

#[then("validation fails with \"{message}\"")]
fn validation_fails(outcome: &Outcome, message: String) {
    let Outcome::Validation(result) = outcome else {
        panic!("expected a validation outcome, got {outcome:?}");
    };
    assert!(!result.valid);
    assert_eq!(result.command_count, 0);
    assert_eq!(result.errors, vec![message]);
}
