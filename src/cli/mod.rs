//! Command-line interface definitions for the `rtxconfig` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI for the `rtxconfig` binary.
#[derive(Debug, Parser)]
#[command(
    name = "rtxconfig",
    version,
    about = "Back up, apply, diff, and restore Yamaha RTX830 configuration over SSH",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Load settings from this file instead of the discovered `rtxconfig.toml`.
    #[arg(short, long, global = true, value_name = "PATH")]
    pub(crate) config: Option<Utf8PathBuf>,
    /// Log at debug level regardless of the configured level.
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
    /// Operation to run.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands of `rtxconfig`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Check that the device accepts a session and answers a show command.
    Connect,
    /// Capture the running configuration as a timestamped backup.
    Backup(BackupCommand),
    /// Apply a configuration file to the device and save it.
    Apply(ApplyCommand),
    /// Show a unified diff from the running configuration to a file.
    Diff(DiffCommand),
    /// Re-apply a backup file after snapshotting the current state.
    Restore(RestoreCommand),
    /// List backup files or purge those past the retention period.
    Backups(BackupsCommand),
    /// Write an example configuration file.
    InitConfig(InitConfigCommand),
    /// Check a configuration file without contacting the device.
    Validate(ValidateCommand),
    /// Print environment, interface and routing status.
    Status(StatusCommand),
}

/// Arguments for `rtxconfig backup`.
#[derive(Debug, Args)]
pub(crate) struct BackupCommand {
    /// Write the configuration to this file instead of the backup directory.
    #[arg(short, long, value_name = "PATH")]
    pub(crate) output: Option<Utf8PathBuf>,
}

/// Arguments for `rtxconfig apply`.
#[derive(Debug, Args)]
pub(crate) struct ApplyCommand {
    /// Configuration file holding one command per line.
    #[arg(value_name = "FILE")]
    pub(crate) file: Utf8PathBuf,
    /// Skip the safety backup normally taken before applying.
    #[arg(long)]
    pub(crate) no_backup: bool,
    /// Validate and print the commands without contacting the device.
    #[arg(long)]
    pub(crate) dry_run: bool,
    /// Apply without asking for confirmation.
    #[arg(short, long)]
    pub(crate) yes: bool,
}

/// Arguments for `rtxconfig diff`.
#[derive(Debug, Args)]
pub(crate) struct DiffCommand {
    /// Candidate configuration file.
    #[arg(value_name = "FILE")]
    pub(crate) file: Utf8PathBuf,
}

/// Arguments for `rtxconfig restore`.
#[derive(Debug, Args)]
pub(crate) struct RestoreCommand {
    /// Backup file to re-apply.
    #[arg(value_name = "BACKUP_FILE")]
    pub(crate) file: Utf8PathBuf,
    /// Restore without asking for confirmation.
    #[arg(short, long)]
    pub(crate) yes: bool,
}

/// Arguments for `rtxconfig backups`.
#[derive(Debug, Args)]
pub(crate) struct BackupsCommand {
    /// Remove backups older than `keep_days` instead of listing them.
    #[arg(long)]
    pub(crate) cleanup: bool,
}

/// Arguments for `rtxconfig init-config`.
#[derive(Debug, Args)]
pub(crate) struct InitConfigCommand {
    /// Destination file; defaults to the discovered configuration location.
    #[arg(value_name = "PATH")]
    pub(crate) path: Option<Utf8PathBuf>,
    /// Replace an existing file.
    #[arg(long)]
    pub(crate) force: bool,
}

/// Arguments for `rtxconfig validate`.
#[derive(Debug, Args)]
pub(crate) struct ValidateCommand {
    /// Configuration file to check.
    #[arg(value_name = "FILE")]
    pub(crate) file: Utf8PathBuf,
}

/// Arguments for `rtxconfig status`.
#[derive(Debug, Args)]
pub(crate) struct StatusCommand {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = StatusFormat::Text)]
    pub(crate) format: StatusFormat,
}

/// Rendering of `rtxconfig status`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum StatusFormat {
    /// Upper-cased section headings followed by raw output.
    Text,
    /// A JSON object keyed by section name.
    Json,
}
