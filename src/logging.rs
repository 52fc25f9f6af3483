//! `tracing-subscriber` installation for the command-line binary.
//!
//! The library only emits events; the binary decides where they go.

use std::env;
use std::io;
use std::sync::Mutex;

use camino::Utf8Path;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt::writer::BoxMakeWriter};

use crate::text_file;

/// Environment variable whose filter directives override every other setting.
pub const RUST_LOG_ENV: &str = "RUST_LOG";

/// Errors raised while installing the subscriber.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum LoggingError {
    /// Raised when the level or directive cannot be parsed.
    #[error("invalid log filter '{directive}': {message}")]
    InvalidFilter {
        /// Directive that failed to parse.
        directive: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when the log file cannot be opened.
    #[error("failed to open log file {path}: {message}")]
    LogFile {
        /// Requested log file.
        path: String,
        /// Underlying I/O error message.
        message: String,
    },
    /// Raised when a global subscriber is already installed.
    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

/// Parses a configured level name, case-insensitively.
///
/// `warning` and `critical` are accepted as aliases of `warn` and `error`.
#[must_use]
pub fn parse_level(value: &str) -> Option<Level> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" | "critical" => Some(Level::ERROR),
        _ => None,
    }
}

/// Chooses the filter directive: `RUST_LOG` wins, then `--verbose`, then
/// the configured level.
///
/// # Errors
///
/// Returns [`LoggingError::InvalidFilter`] when `configured` is not a level.
pub fn filter_directive(
    rust_log: Option<&str>,
    configured: &str,
    verbose: bool,
) -> Result<String, LoggingError> {
    if let Some(directive) = rust_log.filter(|value| !value.trim().is_empty()) {
        return Ok(directive.to_owned());
    }
    if verbose {
        return Ok(Level::DEBUG.as_str().to_ascii_lowercase());
    }
    parse_level(configured)
        .map(|level| level.as_str().to_ascii_lowercase())
        .ok_or_else(|| LoggingError::InvalidFilter {
            directive: configured.to_owned(),
            message: String::from("expected one of trace, debug, info, warn, error"),
        })
}

/// Installs the global `fmt` subscriber.
///
/// Events go to `log_file` when given, appending and creating parent
/// directories, and to stderr otherwise.
///
/// # Errors
///
/// Returns [`LoggingError`] when the filter is invalid, the log file cannot be
/// opened or a subscriber is already installed.
pub fn init(level: &str, verbose: bool, log_file: Option<&Utf8Path>) -> Result<(), LoggingError> {
    let rust_log = env::var(RUST_LOG_ENV).ok();
    let directive = filter_directive(rust_log.as_deref(), level, verbose)?;
    let filter = EnvFilter::try_new(&directive).map_err(|err| LoggingError::InvalidFilter {
        directive: directive.clone(),
        message: err.to_string(),
    })?;

    let (writer, ansi) = match log_file {
        Some(path) => {
            let file = text_file::open_append(path).map_err(|err| LoggingError::LogFile {
                path: path.to_string(),
                message: err.to_string(),
            })?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(io::stderr), true),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false)
        .try_init()
        .map_err(|err| LoggingError::Install(err.to_string()))
}
