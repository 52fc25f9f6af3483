//! Line-oriented configuration command extraction.
//!
//! A configuration file is a plain text script: one device command per line,
//! `#` introduces a comment line, and blank lines are ignored.

use std::io;
use std::slice;

use camino::Utf8Path;

use crate::text_file;

/// Leading character marking a comment line.
pub const COMMENT_MARKER: char = '#';

/// Returns the trimmed command carried by `line`, or `None` when the line is
/// blank or a comment.
#[must_use]
pub fn command_in(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    (!trimmed.is_empty() && !trimmed.starts_with(COMMENT_MARKER)).then_some(trimmed)
}

/// Ordered, non-empty, trimmed command lines extracted from a text script.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandSet {
    commands: Vec<String>,
}

impl CommandSet {
    /// Extracts commands from `text`, preserving their order.
    ///
    /// Lines are trimmed; empty lines and lines whose trimmed form starts
    /// with `#` are skipped.
    ///
    /// # Examples
    ///
    /// ```
    /// use rtxconfig::CommandSet;
    ///
    /// let set = CommandSet::parse("# header\n\nip route default gateway 10.0.0.1\n");
    /// assert_eq!(set.as_slice(), ["ip route default gateway 10.0.0.1"]);
    /// ```
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let commands = text
            .lines()
            .filter_map(command_in)
            .map(ToOwned::to_owned)
            .collect();
        Self { commands }
    }

    /// Reads `path` and extracts its commands.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while reading the file.
    pub fn from_file(path: &Utf8Path) -> io::Result<Self> {
        text_file::read_text(path).map(|text| Self::parse(&text))
    }

    /// Number of extracted commands.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` when no command survived extraction.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Iterates over the commands in file order.
    pub fn iter(&self) -> slice::Iter<'_, String> {
        self.commands.iter()
    }

    /// Borrows the commands as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.commands
    }

    /// Renders the commands back to text, one per line.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut text = self.commands.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }
}

impl<'a> IntoIterator for &'a CommandSet {
    type Item = &'a String;
    type IntoIter = slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
