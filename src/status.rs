//! Read-only device status snapshot.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::session::{Session, SessionError};

/// Show command used for the connectivity check and the `environment` section.
pub const ENVIRONMENT_COMMAND: &str = "show environment";

/// Sections gathered by [`StatusReport::gather`], in output order.
pub const STATUS_COMMANDS: [(&str, &str); 3] = [
    ("environment", ENVIRONMENT_COMMAND),
    ("interface", "show status lan1"),
    ("routes", "show ip route"),
];

/// Output of one show command.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StatusSection {
    /// Section key used in JSON and text output.
    pub name: String,
    /// Command that produced the output.
    pub command: String,
    /// Cleaned command output.
    pub output: String,
}

/// Status sections collected from one device.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StatusReport {
    /// Device the report was read from.
    pub host: String,
    /// Sections in [`STATUS_COMMANDS`] order.
    pub sections: Vec<StatusSection>,
}

impl StatusReport {
    /// Runs every show command in [`STATUS_COMMANDS`] on `session`.
    ///
    /// # Errors
    ///
    /// Returns the first [`SessionError`] raised by the device.
    pub fn gather<S>(session: &mut S, host: &str) -> Result<Self, SessionError>
    where
        S: Session + ?Sized,
    {
        let mut sections = Vec::with_capacity(STATUS_COMMANDS.len());
        for (name, command) in STATUS_COMMANDS {
            debug!(host, command, "gathering status");
            let output = session.execute_command(command, None)?;
            sections.push(StatusSection {
                name: name.to_owned(),
                command: command.to_owned(),
                output,
            });
        }
        Ok(Self {
            host: host.to_owned(),
            sections,
        })
    }

    /// Renders the sections as a JSON object keyed by section name.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialisation fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let object: Map<String, Value> = self
            .sections
            .iter()
            .map(|section| (section.name.clone(), Value::String(section.output.clone())))
            .collect();
        serde_json::to_string_pretty(&Value::Object(object))
    }

    /// Renders each section under an upper-cased heading.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut text = String::new();
        for section in &self.sections {
            text.push('\n');
            text.push_str(&section.name.to_uppercase());
            text.push_str(":\n");
            text.push_str(&section.output);
            if !section.output.ends_with('\n') {
                text.push('\n');
            }
        }
        text
    }
}
