//! Binary entry point for the `rtxconfig` CLI.

mod cli;

use std::io::{self, BufRead, Write};
use std::process;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use tabled::settings::{Alignment, Style, object::Columns};
use tabled::{Table, Tabled};
use thiserror::Error;

use rtxconfig::{
    ApplyError, BackupError, BackupRecord, CommandSet, ConfigError, ConfigStore, ConfigStoreError,
    FailureKind, LifecycleError, LifecycleManager, RtxConfig, Session, SessionError, SessionGuard,
    SshSession, StatusReport, ValidationResult,
    logging::{self, LoggingError},
    status::ENVIRONMENT_COMMAND,
};

use cli::{
    ApplyCommand, BackupCommand, BackupsCommand, Cli, Command, DiffCommand, InitConfigCommand,
    RestoreCommand, StatusCommand, StatusFormat, ValidateCommand,
};

const EXIT_FAILURE: i32 = 1;
const EXIT_REFUSED: i32 = 2;
const EXIT_UNREACHABLE: i32 = 3;
const EXIT_INCOMPLETE: i32 = 4;

const MODIFIED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    ConfigStore(#[from] ConfigStoreError),
    #[error("logging setup failed: {0}")]
    Logging(#[from] LoggingError),
    #[error("connection failed: {0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Lifecycle(#[from] LifecycleError),
    #[error("apply failed: {0}")]
    Apply(#[from] ApplyError),
    #[error("backup directory error: {0}")]
    Backup(#[from] BackupError),
    #[error("configuration file {path} is invalid")]
    Invalid { path: Utf8PathBuf },
    #[error("failed to restore configuration from {path}")]
    RestoreFailed { path: Utf8PathBuf },
    #[error("failed to render status: {0}")]
    Render(String),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Lifecycle(err) => exit_code_for(err.kind()),
            Self::Apply(err) => exit_code_for(err.kind()),
            Self::Session(err) if err.is_connection_failure() => EXIT_UNREACHABLE,
            Self::Invalid { .. } => EXIT_REFUSED,
            Self::RestoreFailed { .. } => EXIT_INCOMPLETE,
            _ => EXIT_FAILURE,
        }
    }
}

const fn exit_code_for(kind: FailureKind) -> i32 {
    match kind {
        FailureKind::Refused => EXIT_REFUSED,
        FailureKind::Unreachable => EXIT_UNREACHABLE,
        FailureKind::BackupFailed | FailureKind::Aborted | FailureKind::Partial => {
            EXIT_INCOMPLETE
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let stdout = io::stdout();
    let stdin = io::stdin();
    let exit_code = match dispatch(&cli, &mut stdout.lock(), &mut stdin.lock()) {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            err.exit_code()
        }
    };

    process::exit(exit_code);
}

fn dispatch(cli: &Cli, out: &mut impl Write, input: &mut impl BufRead) -> Result<(), CliError> {
    // init-config must work before any configuration exists.
    let config = if matches!(cli.command, Command::InitConfig(_)) {
        RtxConfig::default()
    } else {
        load_config(cli.config.as_deref())?
    };
    config.validate_logging()?;
    logging::init(&config.log_level, cli.verbose, config.log_path().as_deref())?;

    if needs_device(&cli.command) {
        config.validate()?;
    }

    match &cli.command {
        Command::Validate(args) => validate(&config, args, out),
        Command::Backups(args) => backups(&config, args, out),
        Command::Apply(args) if args.dry_run => apply_dry_run(&config, args, out),
        Command::Apply(args) => apply(&config, args, out, input),
        Command::Connect => connect(&config, out),
        Command::Backup(args) => backup(&config, args, out),
        Command::Diff(args) => diff(&config, args, out),
        Command::Restore(args) => restore(&config, args, out, input),
        Command::Status(args) => status(&config, args, out),
        Command::InitConfig(args) => init_config(args, out),
    }
}

const fn needs_device(command: &Command) -> bool {
    match command {
        Command::Validate(_) | Command::Backups(_) | Command::InitConfig(_) => false,
        Command::Apply(args) => !args.dry_run,
        Command::Connect
        | Command::Backup(_)
        | Command::Diff(_)
        | Command::Restore(_)
        | Command::Status(_) => true,
    }
}

fn load_config(path: Option<&Utf8Path>) -> Result<RtxConfig, CliError> {
    let config = path.map_or_else(RtxConfig::load_without_cli_args, RtxConfig::load_from_file)?;
    Ok(config)
}

fn open_session(config: &RtxConfig) -> Result<SessionGuard<SshSession>, CliError> {
    let session = SshSession::new(config.ssh_settings())?;
    Ok(SessionGuard::open(session)?)
}

fn connect(config: &RtxConfig, out: &mut impl Write) -> Result<(), CliError> {
    let mut session = open_session(config)?;
    session.execute_command(ENVIRONMENT_COMMAND, None)?;
    writeln!(out, "Connection successful")?;
    writeln!(out, "RTX830 at {} is accessible", config.host)?;
    Ok(())
}

fn backup(config: &RtxConfig, args: &BackupCommand, out: &mut impl Write) -> Result<(), CliError> {
    let manager = LifecycleManager::from_config(config);
    let mut session = open_session(config)?;
    if let Some(path) = &args.output {
        manager.backup_to(&mut *session, path)?;
        writeln!(out, "Configuration saved to: {path}")?;
    } else {
        let record = manager.backup(&mut *session, "")?;
        writeln!(out, "Backup created: {}", record.path)?;
    }
    Ok(())
}

fn checked_commands(
    manager: &LifecycleManager,
    file: &Utf8Path,
    out: &mut impl Write,
) -> Result<usize, CliError> {
    let validation = manager.validate_config_file(file);
    if !validation.valid {
        writeln!(out, "Configuration file validation failed:")?;
        write_bullets(out, &validation.errors)?;
        return Err(CliError::Invalid {
            path: file.to_path_buf(),
        });
    }
    if !validation.warnings.is_empty() {
        writeln!(out, "Configuration file warnings:")?;
        write_bullets(out, &validation.warnings)?;
    }
    writeln!(out, "Found {} configuration commands", validation.command_count)?;
    Ok(validation.command_count)
}

fn apply_dry_run(
    config: &RtxConfig,
    args: &ApplyCommand,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let manager = LifecycleManager::from_config(config);
    checked_commands(&manager, &args.file, out)?;
    let commands = CommandSet::from_file(&args.file).map_err(|err| {
        CliError::Lifecycle(LifecycleError::CandidateUnreadable {
            path: args.file.clone(),
            message: err.to_string(),
        })
    })?;
    writeln!(out)?;
    writeln!(out, "Configuration to be applied:")?;
    for (number, command) in commands.iter().enumerate() {
        writeln!(out, "{:>4}  {command}", number + 1)?;
    }
    Ok(())
}

fn apply(
    config: &RtxConfig,
    args: &ApplyCommand,
    out: &mut impl Write,
    input: &mut impl BufRead,
) -> Result<(), CliError> {
    let manager = LifecycleManager::from_config(config);
    checked_commands(&manager, &args.file, out)?;
    if !args.yes && !confirm(&format!("Apply configuration from {}?", args.file), out, input)? {
        writeln!(out, "Operation cancelled")?;
        return Ok(());
    }

    let mut session = open_session(config)?;
    match manager.apply(&mut *session, &args.file, !args.no_backup) {
        Ok(result) => {
            writeln!(out, "Configuration applied successfully")?;
            if let Some(path) = result.backup_file {
                writeln!(out, "Backup created: {path}")?;
            }
            Ok(())
        }
        Err(err) => {
            if let Some(path) = err.backup_file() {
                writeln!(out, "Safety backup kept at: {path}")?;
            }
            Err(err.into())
        }
    }
}

fn diff(config: &RtxConfig, args: &DiffCommand, out: &mut impl Write) -> Result<(), CliError> {
    let manager = LifecycleManager::from_config(config);
    let mut session = open_session(config)?;
    let rendered = manager.diff(&mut *session, &args.file)?;
    if rendered.trim().is_empty() {
        writeln!(out, "No differences found")?;
    } else {
        write!(out, "{rendered}")?;
    }
    Ok(())
}

fn restore(
    config: &RtxConfig,
    args: &RestoreCommand,
    out: &mut impl Write,
    input: &mut impl BufRead,
) -> Result<(), CliError> {
    if !args.yes
        && !confirm(
            &format!("Restore configuration from {}?", args.file),
            out,
            input,
        )?
    {
        writeln!(out, "Operation cancelled")?;
        return Ok(());
    }

    let manager = LifecycleManager::from_config(config);
    let mut session = open_session(config)?;
    if manager.restore(&mut *session, &args.file)? {
        writeln!(out, "Configuration restored successfully")?;
        Ok(())
    } else {
        Err(CliError::RestoreFailed {
            path: args.file.clone(),
        })
    }
}

fn backups(config: &RtxConfig, args: &BackupsCommand, out: &mut impl Write) -> Result<(), CliError> {
    let manager = LifecycleManager::from_config(config);
    if args.cleanup {
        let removed = manager.cleanup_old_backups()?;
        writeln!(out, "Removed {removed} old backup files")?;
        return Ok(());
    }

    let records = manager.list_backups()?;
    if records.is_empty() {
        writeln!(out, "No backup files found")?;
    } else {
        write!(out, "{}", render_backup_table(&records))?;
    }
    Ok(())
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "File")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
    #[tabled(rename = "Age (days)")]
    age_days: String,
}

impl From<&BackupRecord> for BackupRow {
    fn from(record: &BackupRecord) -> Self {
        Self {
            name: record.name.clone(),
            size: format!("{} B", record.size_bytes),
            modified: record.modified.format(MODIFIED_FORMAT).to_string(),
            age_days: record.age_days.to_string(),
        }
    }
}

fn render_backup_table(records: &[BackupRecord]) -> String {
    let mut table = Table::new(records.iter().map(BackupRow::from));
    table
        .with(Style::blank())
        .modify(Columns::single(1), Alignment::right())
        .modify(Columns::last(), Alignment::right());
    format!("{table}\n")
}

fn init_config(args: &InitConfigCommand, out: &mut impl Write) -> Result<(), CliError> {
    let path = ConfigStore::new().write_example(args.path.as_deref(), args.force)?;
    writeln!(out, "Example configuration created: {path}")?;
    writeln!(out)?;
    writeln!(out, "Edit the file with your RTX830 details:")?;
    write_bullets(
        out,
        &[
            String::from("host: device IP address"),
            String::from("username: SSH user"),
            String::from("key_file: SSH private key path"),
        ],
    )?;
    Ok(())
}

fn validate(config: &RtxConfig, args: &ValidateCommand, out: &mut impl Write) -> Result<(), CliError> {
    let manager = LifecycleManager::from_config(config);
    let validation = manager.validate_config_file(&args.file);
    write_validation(out, &validation)?;
    if validation.valid {
        Ok(())
    } else {
        Err(CliError::Invalid {
            path: args.file.clone(),
        })
    }
}

fn write_validation(out: &mut impl Write, validation: &ValidationResult) -> io::Result<()> {
    if validation.valid {
        writeln!(out, "Configuration file is valid")?;
        writeln!(out, "Found {} commands", validation.command_count)?;
    } else {
        writeln!(out, "Configuration file is invalid")?;
        write_bullets(out, &validation.errors)?;
    }
    if !validation.warnings.is_empty() {
        writeln!(out, "Warnings:")?;
        write_bullets(out, &validation.warnings)?;
    }
    Ok(())
}

fn status(config: &RtxConfig, args: &StatusCommand, out: &mut impl Write) -> Result<(), CliError> {
    let mut session = open_session(config)?;
    let report = StatusReport::gather(&mut *session, &config.host)?;
    match args.format {
        StatusFormat::Json => {
            let json = report
                .to_json()
                .map_err(|err| CliError::Render(err.to_string()))?;
            writeln!(out, "{json}")?;
        }
        StatusFormat::Text => write!(out, "{}", report.render_text())?,
    }
    Ok(())
}

fn write_bullets(out: &mut impl Write, lines: &[String]) -> io::Result<()> {
    for line in lines {
        writeln!(out, "  - {line}")?;
    }
    Ok(())
}

fn confirm(prompt: &str, out: &mut impl Write, input: &mut impl BufRead) -> io::Result<bool> {
    write!(out, "{prompt} [y/N]: ")?;
    out.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "Error: {err}").ok();
}
