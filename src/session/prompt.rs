//! Prompt detection and output normalisation for line-based device shells.
//!
//! Patterns are matched against the final line of the accumulated output
//! only. The configured pattern is only trusted for the login banner; after
//! that the session matches the exact prompt the device announced, so a
//! read that happens to stop after a bare `#` or `>` is not taken for one.

use regex::Regex;

use crate::session::SessionError;

/// Accepts either the unprivileged (`>`) or privileged (`#`) prompt.
pub const DEFAULT_PROMPT_PATTERN: &str = r"(?:>|#)\s*$";

/// Compiled end-of-output pattern.
#[derive(Clone, Debug)]
pub struct PromptMatcher {
    regex: Regex,
}

impl PromptMatcher {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidPattern`] when the regex is malformed.
    pub fn new(pattern: &str) -> Result<Self, SessionError> {
        Regex::new(pattern)
            .map(|regex| Self { regex })
            .map_err(|err| SessionError::invalid_pattern(pattern, &err))
    }

    /// Source pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Derives a matcher for the device's own prompt from the final line of
    /// `banner`.
    ///
    /// `RTX830> ` yields a matcher accepting `RTX830>`, `RTX830#` and mode
    /// prompts such as `RTX830 pp1#`. A final line that does not end in `>`
    /// or `#` must reappear verbatim. An empty final line keeps `self`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidPattern`] when the derived regex fails
    /// to compile.
    pub fn learned(&self, banner: &str) -> Result<Self, SessionError> {
        let announced = last_line(banner).trim();
        if announced.is_empty() {
            return Ok(self.clone());
        }
        let pattern = match announced.strip_suffix(['>', '#']).map(str::trim_end) {
            Some(base) if !base.is_empty() => {
                format!(r"^{}(?:\s+\S+)?[>#]\s*$", regex::escape(base))
            }
            _ => format!(r"^{}\s*$", regex::escape(announced)),
        };
        Self::new(&pattern)
    }

    /// Returns `true` when the last line of `buffer` is a prompt.
    ///
    /// A buffer ending in a newline has no pending prompt.
    #[must_use]
    pub fn matches_tail(&self, buffer: &str) -> bool {
        !buffer.ends_with('\n') && self.regex.is_match(last_line(buffer))
    }

    /// Strips carriage returns, the echoed `command` line and the trailing
    /// prompt from raw shell output.
    #[must_use]
    pub fn clean_output(&self, raw: &str, command: &str) -> String {
        let normalised = raw.replace('\r', "");
        let mut lines: Vec<&str> = normalised.split('\n').collect();

        if lines
            .last()
            .is_some_and(|line| !line.is_empty() && self.regex.is_match(line))
        {
            lines.pop();
        }
        let wanted = command.trim();
        if !wanted.is_empty()
            && lines
                .first()
                .is_some_and(|line| line.trim_end().ends_with(wanted))
        {
            lines.remove(0);
        }
        while lines.last().is_some_and(|line| line.trim().is_empty()) {
            lines.pop();
        }

        let mut cleaned = lines.join("\n");
        if !cleaned.is_empty() {
            cleaned.push('\n');
        }
        cleaned
    }
}

impl Default for PromptMatcher {
    fn default() -> Self {
        Self {
            regex: default_regex(),
        }
    }
}

#[expect(
    clippy::expect_used,
    reason = "the default prompt pattern is a compile-time constant"
)]
fn default_regex() -> Regex {
    Regex::new(DEFAULT_PROMPT_PATTERN).expect("default prompt pattern compiles")
}

/// Final line of `buffer` with carriage returns removed.
#[must_use]
pub fn last_line(buffer: &str) -> &str {
    buffer
        .rsplit('\n')
        .next()
        .unwrap_or(buffer)
        .trim_matches('\r')
}
