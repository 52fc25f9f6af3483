//! Configuration loading via `ortho-config`.
//!
//! Values merge defaults, the discovered `rtxconfig.toml`, and `RTXCONFIG_*`
//! environment variables. An explicit file passed with `--config` replaces
//! discovery and environment layering entirely.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, toml};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backup::RetentionPolicy;
use crate::logging;
use crate::session::{DEFAULT_PROMPT_PATTERN, DISABLE_PAGING_COMMAND, SshSettings};
use crate::text_file;

/// Environment variable prefix for every setting.
pub const ENV_PREFIX: &str = "RTXCONFIG";
/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;
/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Default per-command timeout in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;
/// Default backup directory.
pub const DEFAULT_BACKUP_DIRECTORY: &str = "./backups";
/// Default retention in days.
pub const DEFAULT_KEEP_DAYS: i64 = 30;
/// Default privileged-mode command.
pub const DEFAULT_PRIVILEGE_COMMAND: &str = "administrator";

/// Device, backup and logging settings.
#[derive(Clone, Debug, Deserialize, Serialize, OrthoConfig, PartialEq, Eq)]
#[serde(default)]
#[ortho_config(
    prefix = "RTXCONFIG",
    discovery(
        app_name = "rtxconfig",
        env_var = "RTXCONFIG_CONFIG_PATH",
        config_file_name = "rtxconfig.toml",
        dotfile_name = ".rtxconfig.toml",
        project_file_name = "rtxconfig.toml"
    )
)]
pub struct RtxConfig {
    /// Router hostname or IP address. Required.
    #[ortho_config(default = String::new())]
    pub host: String,
    /// SSH login user. Required.
    #[ortho_config(default = String::new())]
    pub username: String,
    /// Private key path; a leading `~/` is expanded. Required.
    #[ortho_config(default = String::new())]
    pub key_file: String,
    /// SSH port.
    #[ortho_config(default = DEFAULT_PORT)]
    pub port: u16,
    /// Seconds to wait for the first prompt.
    #[ortho_config(default = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout_secs: u64,
    /// Seconds to wait for each command's prompt.
    #[ortho_config(default = DEFAULT_COMMAND_TIMEOUT_SECS)]
    pub command_timeout_secs: u64,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Whether to enforce host key checking.
    #[ortho_config(default = false)]
    pub strict_host_key_checking: bool,
    /// Known hosts file override.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub known_hosts_file: String,
    /// Regex matched against the last output line to detect the prompt.
    #[ortho_config(default = DEFAULT_PROMPT_PATTERN.to_owned())]
    pub prompt_pattern: String,
    /// Command entering privileged mode.
    #[ortho_config(default = DEFAULT_PRIVILEGE_COMMAND.to_owned())]
    pub privilege_command: String,
    /// Privileged-mode password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Directory holding backups.
    #[ortho_config(default = DEFAULT_BACKUP_DIRECTORY.to_owned())]
    pub backup_directory: String,
    /// Backups older than this many days are purged; `<= 0` disables.
    #[ortho_config(default = DEFAULT_KEEP_DAYS)]
    pub keep_days: i64,
    /// Log level: trace, debug, info, warn or error.
    #[ortho_config(default = "info".to_owned())]
    pub log_level: String,
    /// Optional log file; logs go to stderr when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

impl Default for RtxConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            key_file: String::new(),
            port: DEFAULT_PORT,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            ssh_bin: String::from("ssh"),
            strict_host_key_checking: false,
            known_hosts_file: String::from("/dev/null"),
            prompt_pattern: DEFAULT_PROMPT_PATTERN.to_owned(),
            privilege_command: DEFAULT_PRIVILEGE_COMMAND.to_owned(),
            secret: None,
            backup_directory: DEFAULT_BACKUP_DIRECTORY.to_owned(),
            keep_days: DEFAULT_KEEP_DAYS,
            log_level: String::from("info"),
            log_file: None,
        }
    }
}

/// Explicit configuration file: every known key lands in `config`, and
/// anything left over is collected so it can be reported.
#[derive(Debug, Deserialize)]
struct FileLayer {
    #[serde(flatten)]
    config: RtxConfig,
    #[serde(flatten)]
    unknown: BTreeMap<String, toml::Value>,
}

/// Metadata for a configuration field, used to generate actionable error
/// messages.
struct FieldMetadata {
    description: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            toml_key,
        }
    }

    fn env_var(&self) -> String {
        format!("{ENV_PREFIX}_{}", self.toml_key.to_uppercase())
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to rtxconfig.toml",
            self.description,
            self.env_var(),
            self.toml_key
        ))
    }

    fn invalid(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            field: self.toml_key.to_owned(),
            message: format!("{} ({})", message.into(), self.env_var()),
        }
    }
}

impl RtxConfig {
    /// Loads configuration from defaults, the discovered file, and the
    /// environment, without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("rtxconfig")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration from an explicit TOML file over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the file cannot be read or holds
    /// unknown keys or mistyped values.
    pub fn load_from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = text_file::read_text(path)
            .map_err(|err| ConfigError::Parse(format!("failed to read {path}: {err}")))?;
        Self::from_toml_str(&contents)
            .map_err(|err| ConfigError::Parse(format!("{path}: {err}")))
    }

    /// Parses TOML text over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on unknown keys or mistyped values.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let layer: FileLayer =
            toml::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string()))?;
        if let Some(key) = layer.unknown.keys().next() {
            return Err(ConfigError::Parse(format!("unknown field `{key}`")));
        }
        Ok(layer.config)
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that supply the field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::InvalidValue`] when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (&self.host, FieldMetadata::new("router host", "host")),
            (&self.username, FieldMetadata::new("SSH username", "username")),
            (&self.key_file, FieldMetadata::new("SSH private key file", "key_file")),
            (&self.ssh_bin, FieldMetadata::new("ssh executable", "ssh_bin")),
            (
                &self.privilege_command,
                FieldMetadata::new("privileged mode command", "privilege_command"),
            ),
            (
                &self.backup_directory,
                FieldMetadata::new("backup directory", "backup_directory"),
            ),
        ];
        for (value, metadata) in &required {
            if value.trim().is_empty() {
                return Err(metadata.missing());
            }
        }

        if self.port == 0 {
            return Err(FieldMetadata::new("SSH port", "port").invalid("port must be between 1 and 65535"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(FieldMetadata::new("connect timeout", "connect_timeout_secs")
                .invalid("timeout must be at least one second"));
        }
        if self.command_timeout_secs == 0 {
            return Err(FieldMetadata::new("command timeout", "command_timeout_secs")
                .invalid("timeout must be at least one second"));
        }
        if let Err(err) = Regex::new(&self.prompt_pattern) {
            return Err(FieldMetadata::new("prompt pattern", "prompt_pattern")
                .invalid(format!("invalid regular expression: {err}")));
        }
        self.validate_logging()
    }

    /// Validates only the logging fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unknown log level or an
    /// empty log file path.
    pub fn validate_logging(&self) -> Result<(), ConfigError> {
        if logging::parse_level(&self.log_level).is_none() {
            return Err(FieldMetadata::new("log level", "log_level").invalid(format!(
                "unknown log level {:?}; expected trace, debug, info, warn or error",
                self.log_level
            )));
        }
        if self
            .log_file
            .as_deref()
            .is_some_and(|file| file.trim().is_empty())
        {
            return Err(FieldMetadata::new("log file", "log_file").missing());
        }
        Ok(())
    }

    /// Key file path with a leading `~/` expanded.
    #[must_use]
    pub fn key_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(expand_tilde(&self.key_file))
    }

    /// Log file path with a leading `~/` expanded.
    #[must_use]
    pub fn log_path(&self) -> Option<Utf8PathBuf> {
        self.log_file
            .as_deref()
            .map(|file| Utf8PathBuf::from(expand_tilde(file)))
    }

    /// Connection parameters for [`crate::session::SshSession`].
    #[must_use]
    pub fn ssh_settings(&self) -> SshSettings {
        SshSettings {
            ssh_bin: self.ssh_bin.clone(),
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            key_file: self.key_path(),
            strict_host_key_checking: self.strict_host_key_checking,
            known_hosts_file: self.known_hosts_file.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            prompt_pattern: self.prompt_pattern.clone(),
            privilege_command: self.privilege_command.clone(),
            secret: self.secret.clone(),
            on_open_commands: vec![DISABLE_PAGING_COMMAND.to_owned()],
        }
    }

    /// Retention policy for the backup directory.
    #[must_use]
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            directory: Utf8PathBuf::from(expand_tilde(&self.backup_directory)),
            keep_days: self.keep_days,
        }
    }

    /// Example configuration written by `init-config`.
    #[must_use]
    pub fn example() -> Self {
        Self {
            host: String::from("192.168.100.1"),
            username: String::from("admin"),
            key_file: String::from("~/.ssh/id_rsa"),
            ..Self::default()
        }
    }

    /// Renders the configuration as TOML, omitting unset optional fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when serialisation fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|err| ConfigError::Parse(err.to_string()))
    }
}

/// Expands a leading `~/` prefix to the user's home directory.
///
/// The input is returned unchanged when `HOME` is unset.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds an unusable value.
    #[error("invalid {field}: {message}")]
    InvalidValue {
        /// TOML key of the offending field.
        field: String,
        /// Explanation including the environment variable.
        message: String,
    },
    /// Surfaces errors from the `ortho-config` loader or TOML parser.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
