//! Core library for the `rtxconfig` configuration lifecycle tool.
//!
//! The crate captures the running configuration of a Yamaha RTX830 over an
//! interactive SSH shell, applies line-oriented configuration scripts behind a
//! mandatory safety backup, diffs a candidate file against the live device,
//! restores prior snapshots, and purges old snapshots under an age-based
//! retention policy.

pub mod backup;
pub mod commands;
pub mod config;
pub mod config_store;
pub mod differ;
pub mod logging;
pub mod manager;
pub mod session;
pub mod status;
pub mod test_support;
mod text_file;
pub mod validator;

pub use backup::{BackupError, BackupRecord, BackupStore, RetentionPolicy};
pub use commands::CommandSet;
pub use config::{ConfigError, RtxConfig};
pub use config_store::{ConfigStore, ConfigStoreError};
pub use differ::unified_diff;
pub use manager::{
    ApplyError, ApplyResult, FailureKind, LifecycleError, LifecycleManager, Stage,
};
pub use session::{Session, SessionError, SessionGuard, SshSession, SshSettings};
pub use status::{StatusReport, StatusSection};
pub use validator::{ValidationResult, Validator};
