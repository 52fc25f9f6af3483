//! Locating and writing `rtxconfig.toml`.
//!
//! The store follows `OrthoConfig`'s discovery search order so `init-config`
//! writes the same file the loader later reads.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::ConfigDiscovery;
use thiserror::Error;
use tracing::info;

use crate::config::RtxConfig;
use crate::text_file;

const APP_NAME: &str = "rtxconfig";
const CONFIG_ENV_VAR: &str = "RTXCONFIG_CONFIG_PATH";
const CONFIG_FILE_NAME: &str = "rtxconfig.toml";
const DOTFILE_NAME: &str = ".rtxconfig.toml";
const PROJECT_FILE_NAME: &str = "rtxconfig.toml";

const EXAMPLE_HEADER: &str = "\
# rtxconfig configuration
#
# Every key can also be set through an RTXCONFIG_<KEY> environment variable.
# Set `secret` to the administrator password when configuration changes
# require privileged mode.

";

/// Errors raised while locating or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    /// Raised when no configuration candidates are available.
    #[error("no configuration file candidates were discovered")]
    NoCandidates,
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when rendering the example configuration fails.
    #[error("failed to render configuration: {message}")]
    Render {
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the target exists and overwrite is disabled.
    #[error("{path} already exists; rerun with --force to replace it")]
    AlreadyExists {
        /// Existing configuration file.
        path: Utf8PathBuf,
    },
}

/// Reads and writes `rtxconfig.toml` using `OrthoConfig`'s discovery order.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    discovery: ConfigDiscovery,
}

impl ConfigStore {
    /// Builds a config store using the standard discovery settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            discovery: ConfigDiscovery::builder(APP_NAME)
                .env_var(CONFIG_ENV_VAR)
                .config_file_name(CONFIG_FILE_NAME)
                .dotfile_name(DOTFILE_NAME)
                .project_file_name(PROJECT_FILE_NAME)
                .build(),
        }
    }

    /// Builds a config store using an explicit discovery configuration.
    #[must_use]
    pub const fn with_discovery(discovery: ConfigDiscovery) -> Self {
        Self { discovery }
    }

    /// Returns the configuration file the loader will read, if any exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Io`] when a candidate cannot be checked.
    pub fn discovered(&self) -> Result<Option<Utf8PathBuf>, ConfigStoreError> {
        let target = self.resolve_target()?;
        Ok(target.exists.then_some(target.path))
    }

    /// Writes an example configuration to `path`, or to the discovered
    /// location when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::AlreadyExists`] when the target exists and
    /// `force` is unset, and [`ConfigStoreError::Io`] when writing fails.
    pub fn write_example(
        &self,
        path: Option<&Utf8Path>,
        force: bool,
    ) -> Result<Utf8PathBuf, ConfigStoreError> {
        let target = match path {
            Some(explicit) => ConfigTarget {
                path: explicit.to_path_buf(),
                exists: path_exists(explicit)?,
            },
            None => self.resolve_target()?,
        };
        if target.exists && !force {
            return Err(ConfigStoreError::AlreadyExists { path: target.path });
        }

        let body = RtxConfig::example()
            .to_toml_string()
            .map_err(|err| ConfigStoreError::Render {
                message: err.to_string(),
            })?;
        text_file::write_text(&target.path, &format!("{EXAMPLE_HEADER}{body}"))
            .map_err(|err| io_failure(&target.path, &err))?;
        info!(path = %target.path, "example configuration written");
        Ok(target.path)
    }

    fn resolve_target(&self) -> Result<ConfigTarget, ConfigStoreError> {
        let candidates = self.discovery.utf8_candidates();
        if candidates.is_empty() {
            return Err(ConfigStoreError::NoCandidates);
        }

        for candidate in &candidates {
            if path_exists(candidate)? {
                return Ok(ConfigTarget {
                    path: candidate.clone(),
                    exists: true,
                });
            }
        }

        // Nothing exists yet, so fall back to the last candidate.
        candidates
            .last()
            .map(|path| ConfigTarget {
                path: path.clone(),
                exists: false,
            })
            .ok_or(ConfigStoreError::NoCandidates)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
struct ConfigTarget {
    path: Utf8PathBuf,
    exists: bool,
}

fn io_failure(path: &Utf8Path, err: &io::Error) -> ConfigStoreError {
    ConfigStoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn path_exists(path: &Utf8Path) -> Result<bool, ConfigStoreError> {
    text_file::exists(path).map_err(|err| io_failure(path, &err))
}
