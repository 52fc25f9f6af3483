//! Command sessions against the managed device.
//!
//! [`Session`] is the capability the lifecycle manager drives: connect,
//! disconnect, run one command, or push an ordered batch of configuration
//! lines. [`SshSession`] implements it over the system `ssh` client;
//! [`crate::test_support::ScriptedSession`] implements it for tests.

mod error;
mod prompt;
mod ssh;

use std::ops::{Deref, DerefMut};

use tracing::debug;

pub use error::SessionError;
pub use prompt::{DEFAULT_PROMPT_PATTERN, PromptMatcher};
pub use ssh::{DISABLE_PAGING_COMMAND, SshSession, SshSettings};

/// Command printing the running configuration.
pub const SHOW_CONFIG_COMMAND: &str = "show config";
/// Command persisting the running configuration to flash.
pub const SAVE_COMMAND: &str = "save";

/// Interactive command channel to a device.
///
/// At most one command or batch is in flight at a time.
pub trait Session {
    /// Opens the channel.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the device cannot be reached or rejects
    /// authentication.
    fn connect(&mut self) -> Result<(), SessionError>;

    /// Closes the channel. Failures are logged, never raised.
    fn disconnect(&mut self);

    /// Returns `true` while the channel is open.
    fn is_connected(&self) -> bool;

    /// Runs `command` and returns its cleaned output.
    ///
    /// When `expect_pattern` is given, output is collected until the final
    /// line matches it instead of the prompt.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when not connected, on timeout, or when the
    /// channel fails.
    fn execute_command(
        &mut self,
        command: &str,
        expect_pattern: Option<&str>,
    ) -> Result<String, SessionError>;

    /// Sends configuration `lines` in order and returns their combined
    /// output.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on the first line that fails.
    fn send_command_batch(&mut self, lines: &[String]) -> Result<String, SessionError>;

    /// Returns the device's running configuration.
    ///
    /// # Errors
    ///
    /// Propagates [`Session::execute_command`] failures.
    fn get_running_config(&mut self) -> Result<String, SessionError> {
        self.execute_command(SHOW_CONFIG_COMMAND, None)
    }

    /// Persists the running configuration.
    ///
    /// # Errors
    ///
    /// Propagates [`Session::execute_command`] failures.
    fn save_config(&mut self) -> Result<String, SessionError> {
        self.execute_command(SAVE_COMMAND, None)
    }
}

/// Connected session that disconnects when dropped.
///
/// # Examples
///
/// ```
/// use rtxconfig::{Session, SessionGuard, test_support::ScriptedSession};
///
/// let probe = ScriptedSession::new("ip lan1 address 192.168.100.1/24\n");
/// {
///     let mut guard = SessionGuard::open(probe.clone()).expect("connect");
///     assert!(guard.get_running_config().is_ok());
/// }
/// assert!(!probe.is_connected());
/// ```
#[derive(Debug)]
pub struct SessionGuard<S: Session> {
    session: S,
}

impl<S: Session> SessionGuard<S> {
    /// Connects `session` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns the connection failure; the session is dropped unconnected.
    pub fn open(mut session: S) -> Result<Self, SessionError> {
        session.connect()?;
        Ok(Self { session })
    }
}

impl<S: Session> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl<S: Session> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}

impl<S: Session> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if self.session.is_connected() {
            debug!("releasing device session");
            self.session.disconnect();
        }
    }
}
