//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::session::{SAVE_COMMAND, SHOW_CONFIG_COMMAND, Session, SessionError};

/// Host reported in errors raised by [`ScriptedSession`].
pub const SCRIPTED_HOST: &str = "rtx830.test";

/// Stage at which a [`ScriptedSession`] is told to fail.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailurePoint {
    /// `connect` fails.
    Connect,
    /// Reading the running configuration fails.
    RunningConfig,
    /// Sending a configuration batch fails.
    Batch,
    /// Saving the configuration fails.
    Save,
}

impl fmt::Display for FailurePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connect => "connect",
            Self::RunningConfig => "show config",
            Self::Batch => "command batch",
            Self::Save => "save",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    connected: bool,
    running_config: String,
    responses: BTreeMap<String, String>,
    failure: Option<FailurePoint>,
    commands: Vec<String>,
    batches: Vec<Vec<String>>,
    saves: usize,
    disconnects: usize,
}

/// In-memory [`Session`] that records every command it receives.
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect the other afterwards.
#[derive(Clone, Debug, Default)]
pub struct ScriptedSession {
    state: Rc<RefCell<ScriptState>>,
}

impl ScriptedSession {
    /// Creates a disconnected session reporting `running_config` for
    /// `show config`.
    #[must_use]
    pub fn new(running_config: impl Into<String>) -> Self {
        let session = Self::default();
        session.state.borrow_mut().running_config = running_config.into();
        session
    }

    /// Makes the session fail at `point`.
    #[must_use]
    pub fn failing_at(self, point: FailurePoint) -> Self {
        self.state.borrow_mut().failure = Some(point);
        self
    }

    /// Scripts the output returned for `command`.
    #[must_use]
    pub fn with_response(self, command: &str, output: impl Into<String>) -> Self {
        self.state
            .borrow_mut()
            .responses
            .insert(command.to_owned(), output.into());
        self
    }

    /// Connects, panicking if the session was scripted to refuse.
    ///
    /// # Panics
    ///
    /// Panics when the session fails at [`FailurePoint::Connect`].
    #[must_use]
    pub fn connected(mut self) -> Self {
        if let Err(err) = self.connect() {
            panic!("scripted session refused to connect: {err}");
        }
        self
    }

    /// Every single command executed, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.state.borrow().commands.clone()
    }

    /// Every configuration batch sent, in order.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.state.borrow().batches.clone()
    }

    /// Number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.state.borrow().saves
    }

    /// Number of disconnects.
    #[must_use]
    pub fn disconnect_count(&self) -> usize {
        self.state.borrow().disconnects
    }

    fn fails_at(&self, point: FailurePoint) -> bool {
        self.state.borrow().failure == Some(point)
    }

    fn failure(point: FailurePoint) -> SessionError {
        SessionError::Closed {
            host: SCRIPTED_HOST.to_owned(),
            message: format!("scripted failure during {point}"),
        }
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.state.borrow().connected {
            Ok(())
        } else {
            Err(SessionError::NotConnected {
                host: SCRIPTED_HOST.to_owned(),
            })
        }
    }
}

impl Session for ScriptedSession {
    fn connect(&mut self) -> Result<(), SessionError> {
        if self.fails_at(FailurePoint::Connect) {
            return Err(SessionError::Authentication {
                host: SCRIPTED_HOST.to_owned(),
                message: String::from("scripted authentication failure"),
            });
        }
        self.state.borrow_mut().connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.state.borrow_mut();
        state.connected = false;
        state.disconnects += 1;
    }

    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn execute_command(
        &mut self,
        command: &str,
        _expect_pattern: Option<&str>,
    ) -> Result<String, SessionError> {
        self.ensure_connected()?;
        self.state.borrow_mut().commands.push(command.to_owned());

        if command == SHOW_CONFIG_COMMAND {
            if self.fails_at(FailurePoint::RunningConfig) {
                return Err(Self::failure(FailurePoint::RunningConfig));
            }
            return Ok(self.state.borrow().running_config.clone());
        }
        if command == SAVE_COMMAND {
            if self.fails_at(FailurePoint::Save) {
                return Err(Self::failure(FailurePoint::Save));
            }
            self.state.borrow_mut().saves += 1;
        }
        Ok(self
            .state
            .borrow()
            .responses
            .get(command)
            .cloned()
            .unwrap_or_default())
    }

    fn send_command_batch(&mut self, lines: &[String]) -> Result<String, SessionError> {
        self.ensure_connected()?;
        if self.fails_at(FailurePoint::Batch) {
            return Err(Self::failure(FailurePoint::Batch));
        }
        self.state.borrow_mut().batches.push(lines.to_vec());
        Ok(String::new())
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets `pairs` and removes `cleared` while holding a global mutex.
    #[must_use]
    pub fn set_vars(pairs: &[(&str, &str)], cleared: &[&str]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs
                    .iter()
                    .map(|(key, _)| *key)
                    .chain(cleared.iter().copied())
                    .all(|key| seen.insert(key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let mut previous = Vec::with_capacity(pairs.len() + cleared.len());
        for (key, value) in pairs {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
        }
        for key in cleared {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.previous.iter().rev() {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
