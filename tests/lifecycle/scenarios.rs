//! BDD scenarios for the configuration lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{Device, Outcome, device, outcome};

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Apply sends commands in file order behind a safety backup"
)]
fn scenario_apply_in_order(device: Device, outcome: Outcome) {
    let _ = (device, outcome);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Failed apply keeps the safety backup"
)]
fn scenario_apply_failure(device: Device, outcome: Outcome) {
    let _ = (device, outcome);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Failed safety backup aborts the apply"
)]
fn scenario_backup_failure(device: Device, outcome: Outcome) {
    let _ = (device, outcome);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Failed restore reports false and keeps the pre-restore snapshot"
)]
fn scenario_restore_failure(device: Device, outcome: Outcome) {
    let _ = (device, outcome);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Purge removes only expired backups"
)]
fn scenario_purge(device: Device, outcome: Outcome) {
    let _ = (device, outcome);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Comment-only candidate is refused"
)]
fn scenario_comment_only(device: Device, outcome: Outcome) {
    let _ = (device, outcome);
}
