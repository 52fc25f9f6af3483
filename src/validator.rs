//! Connection-free sanity checks for candidate configuration files.

use std::io;

use camino::Utf8Path;
use serde::Serialize;

use crate::{commands::command_in, text_file};

/// Commands longer than this many characters draw a warning.
pub const MAX_LINE_LENGTH: usize = 1000;

/// Substrings that mark a command as potentially destructive.
pub const DEFAULT_DANGEROUS_PATTERNS: [&str; 3] = ["format", "erase", "delete flash"];

/// Error recorded when a candidate holds no commands.
pub const NO_COMMANDS_ERROR: &str = "No valid configuration commands found";

/// Verdict for a single candidate configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// `false` when the file is unreadable or holds no commands.
    pub valid: bool,
    /// Fatal problems.
    pub errors: Vec<String>,
    /// Advisory findings that never affect `valid`.
    pub warnings: Vec<String>,
    /// Number of non-blank, non-comment lines.
    pub command_count: usize,
}

impl ValidationResult {
    fn invalid(error: String) -> Self {
        Self {
            valid: false,
            errors: vec![error],
            ..Self::default()
        }
    }
}

/// Static checker for candidate configuration files.
#[derive(Clone, Debug)]
pub struct Validator {
    dangerous_patterns: Vec<String>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::with_patterns(DEFAULT_DANGEROUS_PATTERNS)
    }
}

impl Validator {
    /// Builds a validator flagging the supplied destructive substrings.
    ///
    /// Patterns are matched case-insensitively.
    #[must_use]
    pub fn with_patterns<I, P>(patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let dangerous_patterns = patterns
            .into_iter()
            .map(|pattern| pattern.as_ref().to_lowercase())
            .filter(|pattern| !pattern.is_empty())
            .collect();
        Self { dangerous_patterns }
    }

    /// Reads and validates the file at `path`.
    ///
    /// A missing or unreadable file yields `valid == false` with a single
    /// descriptive error rather than an `Err`.
    #[must_use]
    pub fn validate_file(&self, path: &Utf8Path) -> ValidationResult {
        match text_file::read_text(path) {
            Ok(text) => self.validate_text(&text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                ValidationResult::invalid(format!("File not found: {path}"))
            }
            Err(err) => ValidationResult::invalid(format!("Error reading file: {err}")),
        }
    }

    /// Validates already-loaded file contents.
    ///
    /// Warnings reference 1-based line numbers in `text`.
    #[must_use]
    pub fn validate_text(&self, text: &str) -> ValidationResult {
        let mut result = ValidationResult {
            valid: true,
            ..ValidationResult::default()
        };

        for (line_number, command) in text
            .lines()
            .enumerate()
            .filter_map(|(index, line)| command_in(line).map(|command| (index + 1, command)))
        {
            result.command_count += 1;

            let length = command.chars().count();
            if length > MAX_LINE_LENGTH {
                result.warnings.push(format!(
                    "Line {line_number}: Very long command ({length} chars)"
                ));
            }

            let lowered = command.to_lowercase();
            for pattern in &self.dangerous_patterns {
                if lowered.contains(pattern.as_str()) {
                    result.warnings.push(format!(
                        "Line {line_number}: Potentially dangerous command: {command}"
                    ));
                }
            }
        }

        if result.command_count == 0 {
            result.valid = false;
            result.errors.push(NO_COMMANDS_ERROR.to_owned());
        }
        result
    }
}
