//! Session over the system `ssh` client.
//!
//! The client runs with a forced pseudo-terminal and piped stdio, driven by
//! a single-threaded `tokio` runtime owned by the session. Output
//! accumulates until the final line matches the device prompt. The banner
//! prompt is accepted only after the channel goes quiet, and its final line
//! becomes the exact prompt expected for every later command.

use std::borrow::Cow;
use std::ffi::OsString;
use std::future;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use shell_escape::unix::escape;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::runtime::{Builder, Runtime};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::prompt::{PromptMatcher, last_line};
use super::{SAVE_COMMAND, Session, SessionError};

/// Disables output paging so long listings arrive without `--More--` stops.
pub const DISABLE_PAGING_COMMAND: &str = "console lines infinity";
/// Leaves the current mode, or closes the shell from unprivileged mode.
pub const EXIT_COMMAND: &str = "exit";
/// Lines starting with any of these mark a rejected command.
pub const FAILURE_MARKERS: [&str; 1] = ["Error:"];

const PASSWORD_PATTERN: &str = r"(?i)password:\s*$";
const CONFIRM_PATTERN: &str = r"(?i)\(Y/N\)\s*:?\s*$";
const AUTH_FAILURE_MARKER: &str = "Permission denied";
const READ_CHUNK: usize = 4096;
const PROMPT_SETTLE: Duration = Duration::from_millis(300);
const OUTPUT_TAIL: usize = 200;

/// Connection parameters for [`SshSession`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshSettings {
    /// SSH client executable.
    pub ssh_bin: String,
    /// Device hostname or address.
    pub host: String,
    /// SSH port.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Private key used for authentication.
    pub key_file: Utf8PathBuf,
    /// Whether to enforce host key checking.
    pub strict_host_key_checking: bool,
    /// Known-hosts file handed to the client.
    pub known_hosts_file: String,
    /// Deadline for the first prompt after spawning the client.
    pub connect_timeout: Duration,
    /// Deadline for each command's prompt.
    pub command_timeout: Duration,
    /// Regex matched against the final output line to detect a prompt.
    pub prompt_pattern: String,
    /// Command entering privileged mode.
    pub privilege_command: String,
    /// Password answering the privileged-mode prompt.
    pub secret: Option<String>,
    /// Commands run right after the first prompt.
    pub on_open_commands: Vec<String>,
}

impl SshSettings {
    /// Builds the client argument vector.
    #[must_use]
    pub fn ssh_args(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-tt"),
            OsString::from("-p"),
            OsString::from(self.port.to_string()),
            OsString::from("-i"),
            OsString::from(self.key_file.as_str()),
            OsString::from("-o"),
            OsString::from("BatchMode=yes"),
            OsString::from("-o"),
            OsString::from(format!(
                "ConnectTimeout={}",
                self.connect_timeout.as_secs().max(1)
            )),
        ];

        if !self.strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.known_hosts_file
            )));
        }

        args.push(OsString::from(format!("{}@{}", self.username, self.host)));
        args
    }

    /// Shell-escaped rendering of the client invocation, for logs.
    #[must_use]
    pub fn display_command(&self) -> String {
        let mut rendered = escape(Cow::from(self.ssh_bin.as_str())).into_owned();
        for arg in self.ssh_args() {
            rendered.push(' ');
            rendered.push_str(&escape(arg.to_string_lossy()));
        }
        rendered
    }
}

/// Spawned client plus the single-threaded runtime that drives its pipes.
///
/// `runtime` is declared last so the pipes are released before it shuts
/// down.
struct Transport {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: Option<ChildStderr>,
    runtime: Runtime,
}

enum Source {
    Stdout(usize),
    Stderr(usize),
}

impl Transport {
    fn send_line(&mut self, host: &str, line: &str) -> Result<(), SessionError> {
        let Self { stdin, runtime, .. } = self;
        runtime
            .block_on(async {
                stdin.write_all(format!("{line}\n").as_bytes()).await?;
                stdin.flush().await
            })
            .map_err(|err| io_failure(host, &err))
    }

    /// Accumulates output until `done` accepts the final line.
    fn read_until(
        &mut self,
        host: &str,
        wait: &Wait<'_>,
        done: impl Fn(&str) -> bool,
    ) -> Result<String, SessionError> {
        let Self {
            stdout,
            stderr,
            runtime,
            ..
        } = self;
        runtime.block_on(read_prompted(stdout, stderr, host, wait, done))
    }

    fn wait_for_exit(&mut self, limit: Duration) -> bool {
        let Self { child, runtime, .. } = self;
        matches!(
            runtime.block_on(time::timeout(limit, child.wait())),
            Ok(Ok(_))
        )
    }

    /// Kills the client if it is still running and reaps it.
    fn terminate(self) {
        let Self {
            mut child,
            stdin,
            stdout,
            stderr,
            runtime,
        } = self;
        drop(stdin);
        if let Err(err) = runtime.block_on(child.kill()) {
            debug!(error = %err, "ssh client already exited");
        }
        drop((stdout, stderr, child));
        drop(runtime);
    }
}

/// Deadline policy for one [`Transport::read_until`] call.
struct Wait<'a> {
    timeout: Duration,
    settle: Option<Duration>,
    waiting_for: &'a str,
}

impl<'a> Wait<'a> {
    const fn prompt(timeout: Duration, waiting_for: &'a str) -> Self {
        Self {
            timeout,
            settle: None,
            waiting_for,
        }
    }

    const fn settled(timeout: Duration, waiting_for: &'a str) -> Self {
        Self {
            timeout,
            settle: Some(PROMPT_SETTLE),
            waiting_for,
        }
    }

    fn timed_out(&self, host: &str) -> SessionError {
        SessionError::Timeout {
            host: host.to_owned(),
            waiting_for: self.waiting_for.to_owned(),
            seconds: self.timeout.as_secs(),
        }
    }
}

/// Collects output until `done` accepts its final, unterminated line.
///
/// With `wait.settle`, a match only counts once the channel has stayed quiet
/// for that long; output arriving in the meantime resumes the wait.
async fn read_prompted(
    stdout: &mut ChildStdout,
    stderr: &mut Option<ChildStderr>,
    host: &str,
    wait: &Wait<'_>,
    done: impl Fn(&str) -> bool,
) -> Result<String, SessionError> {
    let deadline = Instant::now() + wait.timeout;
    let mut buffer: Vec<u8> = Vec::new();
    loop {
        let reached = {
            let text = String::from_utf8_lossy(&buffer);
            !text.ends_with('\n') && !text.is_empty() && done(last_line(&text))
        };
        let read = if reached {
            let Some(quiet) = wait.settle else {
                return Ok(String::from_utf8_lossy(&buffer).into_owned());
            };
            let until = deadline.min(Instant::now() + quiet);
            match time::timeout_at(until, next_chunk(stdout, stderr)).await {
                Ok(outcome) => outcome,
                Err(_quiet) => return Ok(String::from_utf8_lossy(&buffer).into_owned()),
            }
        } else {
            time::timeout_at(deadline, next_chunk(stdout, stderr))
                .await
                .map_err(|_elapsed| wait.timed_out(host))?
        };
        match read.map_err(|err| io_failure(host, &err))? {
            Some(chunk) => buffer.extend_from_slice(&chunk),
            None => return Err(closed_error(host, &String::from_utf8_lossy(&buffer))),
        }
    }
}

/// Reads the next chunk from whichever pipe has data. `None` means both
/// pipes reached end of file.
async fn next_chunk(
    stdout: &mut ChildStdout,
    stderr: &mut Option<ChildStderr>,
) -> io::Result<Option<Vec<u8>>> {
    let mut out = [0_u8; READ_CHUNK];
    let mut err = [0_u8; READ_CHUNK];
    loop {
        let stderr_open = stderr.is_some();
        let source = tokio::select! {
            read = stdout.read(&mut out) => Source::Stdout(read?),
            read = read_stderr(stderr.as_mut(), &mut err), if stderr_open => Source::Stderr(read?),
        };
        match source {
            // Drain stderr first so a client's parting message is not lost.
            Source::Stdout(0) => {
                if let Some(pipe) = stderr.as_mut() {
                    let count = pipe.read(&mut err).await?;
                    if count > 0 {
                        return Ok(err.get(..count).map(<[u8]>::to_vec));
                    }
                }
                *stderr = None;
                return Ok(None);
            }
            Source::Stdout(count) => return Ok(out.get(..count).map(<[u8]>::to_vec)),
            Source::Stderr(0) => *stderr = None,
            Source::Stderr(count) => return Ok(err.get(..count).map(<[u8]>::to_vec)),
        }
    }
}

async fn read_stderr(stderr: Option<&mut ChildStderr>, buf: &mut [u8]) -> io::Result<usize> {
    match stderr {
        Some(pipe) => pipe.read(buf).await,
        None => future::pending().await,
    }
}

fn io_failure(host: &str, err: &io::Error) -> SessionError {
    SessionError::Io {
        host: host.to_owned(),
        message: err.to_string(),
    }
}

fn closed_error(host: &str, output: &str) -> SessionError {
    let trimmed = output.trim();
    if trimmed.contains(AUTH_FAILURE_MARKER) {
        return SessionError::Authentication {
            host: host.to_owned(),
            message: tail(trimmed).to_owned(),
        };
    }
    SessionError::Closed {
        host: host.to_owned(),
        message: if trimmed.is_empty() {
            String::from("no output received")
        } else {
            tail(trimmed).to_owned()
        },
    }
}

fn tail(text: &str) -> &str {
    let start = text
        .char_indices()
        .rev()
        .nth(OUTPUT_TAIL)
        .map_or(0, |(index, _)| index);
    text.get(start..).unwrap_or(text)
}

fn rejection(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|line| {
        FAILURE_MARKERS
            .iter()
            .any(|marker| line.starts_with(marker))
    })
}

#[cfg(unix)]
fn warn_on_permissive_key(key_file: &Utf8Path) {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(key_file) {
        Ok(metadata) if metadata.permissions().mode() & 0o077 != 0 => {
            warn!(
                key_file = %key_file,
                mode = format_args!("{:o}", metadata.permissions().mode() & 0o777),
                "SSH key file is accessible by group or others; consider chmod 600"
            );
        }
        Ok(_) => {}
        Err(err) => debug!(key_file = %key_file, error = %err, "cannot inspect SSH key file"),
    }
}

#[cfg(not(unix))]
const fn warn_on_permissive_key(_key_file: &Utf8Path) {}

/// Interactive shell on the device driven through the `ssh` client.
pub struct SshSession {
    settings: SshSettings,
    configured_prompt: PromptMatcher,
    prompt: PromptMatcher,
    password: Regex,
    confirm: Regex,
    transport: Option<Transport>,
    privileged: bool,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("host", &self.settings.host)
            .field("prompt", &self.prompt.as_str())
            .field("connected", &self.transport.is_some())
            .field("privileged", &self.privileged)
            .finish_non_exhaustive()
    }
}

impl SshSession {
    /// Creates an unconnected session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidPattern`] when the prompt pattern does
    /// not compile.
    pub fn new(settings: SshSettings) -> Result<Self, SessionError> {
        let prompt = PromptMatcher::new(&settings.prompt_pattern)?;
        let password = Regex::new(PASSWORD_PATTERN)
            .map_err(|err| SessionError::invalid_pattern(PASSWORD_PATTERN, &err))?;
        let confirm = Regex::new(CONFIRM_PATTERN)
            .map_err(|err| SessionError::invalid_pattern(CONFIRM_PATTERN, &err))?;
        Ok(Self {
            settings,
            configured_prompt: prompt.clone(),
            prompt,
            password,
            confirm,
            transport: None,
            privileged: false,
        })
    }

    /// Connection parameters.
    #[must_use]
    pub const fn settings(&self) -> &SshSettings {
        &self.settings
    }

    /// Returns `true` when the last prompt seen was the privileged one.
    #[must_use]
    pub const fn is_privileged(&self) -> bool {
        self.privileged
    }

    fn not_connected(&self) -> SessionError {
        SessionError::NotConnected {
            host: self.settings.host.clone(),
        }
    }

    fn note_prompt(&mut self, raw: &str) {
        self.privileged = last_line(raw).trim_end().ends_with('#');
    }

    fn spawn(&mut self) -> Result<(), SessionError> {
        let settings = &self.settings;
        let spawn_error = |message: String| SessionError::Spawn {
            program: settings.ssh_bin.clone(),
            message,
        };
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| spawn_error(err.to_string()))?;

        debug!(command = %settings.display_command(), "spawning ssh client");
        let mut child = {
            let _context = runtime.enter();
            Command::new(&settings.ssh_bin)
                .args(settings.ssh_args())
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|err| spawn_error(err.to_string()))?
        };

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (Some(stdin), Some(stdout), Some(stderr)) = pipes else {
            if let Err(err) = runtime.block_on(child.kill()) {
                debug!(error = %err, "ssh client already exited");
            }
            return Err(spawn_error(String::from("stdio pipes were not captured")));
        };

        self.transport = Some(Transport {
            child,
            stdin,
            stdout,
            stderr: Some(stderr),
            runtime,
        });
        Ok(())
    }

    fn open_shell(&mut self) -> Result<(), SessionError> {
        self.spawn()?;
        let host = self.settings.host.as_str();
        let transport = self.transport.as_mut().ok_or_else(|| SessionError::NotConnected {
            host: host.to_owned(),
        })?;
        let configured = &self.configured_prompt;
        let banner = transport.read_until(
            host,
            &Wait::settled(self.settings.connect_timeout, "login prompt"),
            |line| configured.matches_tail(line),
        )?;
        self.prompt = configured.learned(&banner)?;
        debug!(host, prompt = self.prompt.as_str(), "learned device prompt");
        self.note_prompt(&banner);

        for command in self.settings.on_open_commands.clone() {
            self.execute_command(&command, None)?;
        }
        Ok(())
    }

    /// Enters privileged mode unless the last prompt already was `#`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Authentication`] when a password is requested
    /// without a configured secret, or when the device refuses it.
    pub fn enter_privileged(&mut self) -> Result<(), SessionError> {
        if self.privileged {
            return Ok(());
        }
        let host = self.settings.host.as_str();
        let timeout = self.settings.command_timeout;
        let command = self.settings.privilege_command.as_str();
        let transport = self.transport.as_mut().ok_or_else(|| SessionError::NotConnected {
            host: host.to_owned(),
        })?;
        let (prompt, password) = (&self.prompt, &self.password);

        debug!(host, command, "entering privileged mode");
        transport.send_line(host, command)?;
        let wait = Wait::prompt(timeout, "privileged mode");
        let mut raw = transport.read_until(host, &wait, |line| {
            password.is_match(line) || prompt.matches_tail(line)
        })?;

        if password.is_match(last_line(&raw)) {
            let Some(secret) = self.settings.secret.as_deref() else {
                return Err(SessionError::Authentication {
                    host: host.to_owned(),
                    message: String::from("privileged mode requires a secret"),
                });
            };
            transport.send_line(host, secret)?;
            let answered = Wait::prompt(timeout, "privileged prompt");
            raw = transport.read_until(host, &answered, |line| prompt.matches_tail(line))?;
        }

        self.note_prompt(&raw);
        if self.privileged {
            info!(host = %self.settings.host, "entered privileged mode");
            Ok(())
        } else {
            Err(SessionError::Authentication {
                host: self.settings.host.clone(),
                message: String::from("privileged mode password was rejected"),
            })
        }
    }

    fn leave_privileged(&mut self) -> Result<(), SessionError> {
        if !self.privileged {
            return Ok(());
        }
        let host = self.settings.host.as_str();
        let timeout = self.settings.command_timeout;
        let transport = self.transport.as_mut().ok_or_else(|| SessionError::NotConnected {
            host: host.to_owned(),
        })?;
        let (prompt, confirm) = (&self.prompt, &self.confirm);

        transport.send_line(host, EXIT_COMMAND)?;
        let wait = Wait::prompt(timeout, "unprivileged prompt");
        let mut raw = transport.read_until(host, &wait, |line| {
            confirm.is_match(line) || prompt.matches_tail(line)
        })?;
        if confirm.is_match(last_line(&raw)) {
            debug!(host, "declining to save on privileged exit");
            transport.send_line(host, "N")?;
            raw = transport.read_until(host, &wait, |line| prompt.matches_tail(line))?;
        }
        self.note_prompt(&raw);
        Ok(())
    }

    fn close_gracefully(&mut self) -> Result<(), SessionError> {
        self.leave_privileged()?;
        let host = self.settings.host.as_str();
        let timeout = self.settings.connect_timeout;
        let transport = self.transport.as_mut().ok_or_else(|| SessionError::NotConnected {
            host: host.to_owned(),
        })?;
        transport.send_line(host, EXIT_COMMAND)?;
        if transport.wait_for_exit(timeout) {
            Ok(())
        } else {
            Err(SessionError::Timeout {
                host: host.to_owned(),
                waiting_for: String::from("ssh client to exit"),
                seconds: timeout.as_secs(),
            })
        }
    }

    /// Tears the transport down without talking to the device.
    fn abort(&mut self) {
        let Some(transport) = self.transport.take() else {
            return;
        };
        self.privileged = false;
        transport.terminate();
    }

    /// Drops the transport on failures that leave the channel in an unknown
    /// state. Unread output from a timed-out command would otherwise be
    /// returned as the answer to the next one.
    fn fail<T>(&mut self, err: SessionError) -> Result<T, SessionError> {
        if matches!(
            err,
            SessionError::Closed { .. }
                | SessionError::Authentication { .. }
                | SessionError::Timeout { .. }
                | SessionError::Io { .. }
        ) && self.transport.is_some()
        {
            warn!(host = %self.settings.host, error = %err, "dropping ssh session");
            self.abort();
        }
        Err(err)
    }
}

impl Session for SshSession {
    fn connect(&mut self) -> Result<(), SessionError> {
        if self.transport.is_some() {
            return Ok(());
        }
        warn_on_permissive_key(&self.settings.key_file);
        info!(host = %self.settings.host, port = self.settings.port, "connecting");
        if let Err(err) = self.open_shell() {
            self.abort();
            return Err(err);
        }
        info!(host = %self.settings.host, "connected");
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.transport.is_none() {
            return;
        }
        if let Err(err) = self.close_gracefully() {
            warn!(host = %self.settings.host, error = %err, "graceful logout failed; terminating ssh client");
        }
        self.abort();
        info!(host = %self.settings.host, "disconnected");
    }

    fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn execute_command(
        &mut self,
        command: &str,
        expect_pattern: Option<&str>,
    ) -> Result<String, SessionError> {
        let expect = expect_pattern
            .map(|pattern| {
                Regex::new(pattern).map_err(|err| SessionError::invalid_pattern(pattern, &err))
            })
            .transpose()?;
        if self.transport.is_none() {
            return Err(self.not_connected());
        }

        let host = self.settings.host.as_str();
        let timeout = self.settings.command_timeout;
        let prompt = &self.prompt;
        debug!(host, command, "sending command");
        let result = self.transport.as_mut().map_or_else(
            || {
                Err(SessionError::NotConnected {
                    host: host.to_owned(),
                })
            },
            |transport| {
                transport.send_line(host, command)?;
                transport.read_until(host, &Wait::prompt(timeout, command), |line| {
                    expect
                        .as_ref()
                        .map_or_else(|| prompt.matches_tail(line), |regex| regex.is_match(line))
                })
            },
        );

        match result {
            Ok(raw) => {
                if expect.is_none() {
                    self.note_prompt(&raw);
                }
                Ok(self.prompt.clean_output(&raw, command))
            }
            Err(err) => self.fail(err),
        }
    }

    fn send_command_batch(&mut self, lines: &[String]) -> Result<String, SessionError> {
        if self.transport.is_none() {
            return Err(self.not_connected());
        }
        if let Err(err) = self.enter_privileged() {
            return self.fail(err);
        }

        let mut combined = String::new();
        for line in lines {
            let output = self.execute_command(line, None)?;
            if let Some(message) = rejection(&output) {
                return Err(SessionError::CommandRejected {
                    host: self.settings.host.clone(),
                    command: line.clone(),
                    message: message.to_owned(),
                });
            }
            combined.push_str(&output);
        }
        info!(host = %self.settings.host, count = lines.len(), "configuration batch sent");
        Ok(combined)
    }

    fn save_config(&mut self) -> Result<String, SessionError> {
        if self.transport.is_none() {
            return Err(self.not_connected());
        }
        if let Err(err) = self.enter_privileged() {
            return self.fail(err);
        }
        let output = self.execute_command(SAVE_COMMAND, None)?;
        if let Some(message) = rejection(&output) {
            return Err(SessionError::CommandRejected {
                host: self.settings.host.clone(),
                command: SAVE_COMMAND.to_owned(),
                message: message.to_owned(),
            });
        }
        Ok(output)
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const FAKE_DEVICE: &str = r#"#!/bin/sh
mode=user
printf 'Warning: Permanently added the host key.\r\n' >&2
printf 'RTX830> '
while IFS= read -r line; do
  printf '%s\r\n' "$line"
  case "$line" in
    "console lines infinity") ;;
    "show config") printf '# RTX830 Rev.15.02.30\r\nip lan1 address 192.168.100.1/24\r\n' ;;
    "show environment") printf 'RTX830 Rev.15.02.30\r\nCPU:   3%%\r\n' ;;
    administrator)
      printf 'Password: '
      IFS= read -r pw
      if [ "$pw" = "s3cret" ]; then mode=admin; printf '\r\n'; else printf '\r\nError: Password is incorrect\r\n'; fi ;;
    save) printf 'Saving ... CONFIG0 Done.\r\n' ;;
    exit)
      if [ "$mode" = admin ]; then
        printf 'Save new configuration ? (Y/N)'
        IFS= read -r answer
        printf '\r\n'
        mode=user
      else
        exit 0
      fi ;;
    bogus*) printf 'Error: Invalid command name\r\n' ;;
    *) ;;
  esac
  if [ "$mode" = admin ]; then printf 'RTX830# '; else printf 'RTX830> '; fi
done
"#;

    const PAUSING_DEVICE: &str = r#"#!/bin/sh
printf 'RTX830> '
while IFS= read -r line; do
  printf '%s\r\n' "$line"
  case "$line" in
    "show config")
      printf 'ip lan1 address 192.168.100.1/24\r\n#'
      sleep 0.5
      printf ' end of section\r\nip route default gateway 192.168.100.254\r\n' ;;
    "show environment") printf 'RTX830 Rev.15.02.30\r\n' ;;
    "show status lan1") sleep 3 ;;
    exit) exit 0 ;;
    *) ;;
  esac
  printf 'RTX830> '
done
"#;

    const DENIED: &str = "#!/bin/sh\nprintf 'admin@192.0.2.1: Permission denied (publickey).\\r\\n' >&2\nexit 255\n";

    struct FakeDevice {
        _tmp: TempDir,
        settings: SshSettings,
    }

    fn fake_device(script: &str, secret: Option<&str>) -> FakeDevice {
        let tmp = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 tempdir");
        let bin = root.join("fake-ssh");
        fs::write(&bin, script).expect("write fake ssh");
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).expect("chmod fake ssh");
        let key_file = root.join("id_ed25519");
        fs::write(&key_file, "key").expect("write key");
        fs::set_permissions(&key_file, fs::Permissions::from_mode(0o600)).expect("chmod key");

        let settings = SshSettings {
            ssh_bin: bin.into_string(),
            host: String::from("192.0.2.1"),
            port: 22,
            username: String::from("admin"),
            key_file,
            strict_host_key_checking: false,
            known_hosts_file: String::from("/dev/null"),
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(5),
            prompt_pattern: String::from(crate::session::DEFAULT_PROMPT_PATTERN),
            privilege_command: String::from("administrator"),
            secret: secret.map(ToOwned::to_owned),
            on_open_commands: vec![String::from(DISABLE_PAGING_COMMAND)],
        };
        FakeDevice {
            _tmp: tmp,
            settings,
        }
    }

    fn connected(device: &FakeDevice) -> SshSession {
        let mut session = SshSession::new(device.settings.clone()).expect("session");
        session.connect().expect("connect");
        session
    }

    #[test]
    fn ssh_args_follow_settings() {
        let device = fake_device(FAKE_DEVICE, None);
        let mut settings = device.settings.clone();
        settings.ssh_bin = String::from("ssh");
        settings.port = 2222;
        settings.strict_host_key_checking = true;
        settings.known_hosts_file = String::new();

        let args: Vec<String> = settings
            .ssh_args()
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "-tt".to_owned(),
                "-p".to_owned(),
                "2222".to_owned(),
                "-i".to_owned(),
                settings.key_file.to_string(),
                "-o".to_owned(),
                "BatchMode=yes".to_owned(),
                "-o".to_owned(),
                "ConnectTimeout=5".to_owned(),
                "admin@192.0.2.1".to_owned(),
            ]
        );
    }

    #[test]
    fn display_command_escapes_arguments() {
        let device = fake_device(FAKE_DEVICE, None);
        let mut settings = device.settings.clone();
        settings.ssh_bin = String::from("ssh");
        settings.known_hosts_file = String::from("/tmp/known hosts");

        let rendered = settings.display_command();

        assert!(rendered.starts_with("ssh -tt -p 22 "));
        assert!(rendered.contains("'UserKnownHostsFile=/tmp/known hosts'"));
    }

    #[test]
    fn reads_running_config_without_echo_or_prompt() {
        let device = fake_device(FAKE_DEVICE, None);
        let mut session = connected(&device);

        let config = session.get_running_config().expect("show config");

        assert_eq!(
            config,
            "# RTX830 Rev.15.02.30\nip lan1 address 192.168.100.1/24\n"
        );
        assert!(!session.is_privileged());
        session.disconnect();
        assert!(!session.is_connected());
    }

    #[test]
    fn batch_enters_privileged_mode_with_secret() {
        let device = fake_device(FAKE_DEVICE, Some("s3cret"));
        let mut session = connected(&device);

        session
            .send_command_batch(&[
                String::from("ip lan1 address 192.168.100.1/24"),
                String::from("dns server 192.0.2.53"),
            ])
            .expect("batch");
        let saved = session.save_config().expect("save");

        assert!(session.is_privileged());
        assert_eq!(saved, "Saving ... CONFIG0 Done.\n");
        session.disconnect();
        assert!(!session.is_connected());
    }

    #[test]
    fn batch_without_secret_fails_authentication() {
        let device = fake_device(FAKE_DEVICE, None);
        let mut session = connected(&device);

        let err = session
            .send_command_batch(&[String::from("ip lan1 address 10.0.0.1/24")])
            .expect_err("privileged mode needs a secret");

        assert!(matches!(err, SessionError::Authentication { .. }));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let device = fake_device(FAKE_DEVICE, Some("wrong"));
        let mut session = connected(&device);

        let err = session
            .send_command_batch(&[String::from("ip lan1 address 10.0.0.1/24")])
            .expect_err("wrong secret");

        assert!(matches!(err, SessionError::Authentication { .. }));
    }

    #[test]
    fn error_marker_rejects_batch_line() {
        let device = fake_device(FAKE_DEVICE, Some("s3cret"));
        let mut session = connected(&device);

        let err = session
            .send_command_batch(&[
                String::from("ip lan1 address 10.0.0.1/24"),
                String::from("bogus command"),
                String::from("dns server 192.0.2.53"),
            ])
            .expect_err("device error marker");

        assert_eq!(
            err,
            SessionError::CommandRejected {
                host: String::from("192.0.2.1"),
                command: String::from("bogus command"),
                message: String::from("Error: Invalid command name"),
            }
        );
    }

    #[test]
    fn permission_denied_maps_to_authentication() {
        let device = fake_device(DENIED, None);
        let mut session = SshSession::new(device.settings.clone()).expect("session");

        let err = session.connect().expect_err("auth failure");

        assert!(matches!(err, SessionError::Authentication { .. }));
        assert!(!session.is_connected());
    }

    #[test]
    fn missing_client_is_a_spawn_error() {
        let device = fake_device(FAKE_DEVICE, None);
        let mut settings = device.settings.clone();
        settings.ssh_bin = String::from("/nonexistent/ssh-client");
        let mut session = SshSession::new(settings).expect("session");

        let err = session.connect().expect_err("spawn failure");

        assert!(matches!(err, SessionError::Spawn { .. }));
    }

    #[test]
    fn commands_before_connect_are_refused() {
        let device = fake_device(FAKE_DEVICE, None);
        let mut session = SshSession::new(device.settings.clone()).expect("session");

        let err = session
            .execute_command("show config", None)
            .expect_err("not connected");

        assert_eq!(
            err,
            SessionError::NotConnected {
                host: String::from("192.0.2.1")
            }
        );
    }

    #[test]
    fn expect_pattern_overrides_prompt() {
        let device = fake_device(FAKE_DEVICE, Some("s3cret"));
        let mut session = connected(&device);

        let output = session
            .execute_command("administrator", Some(r"Password:\s*$"))
            .expect("password prompt");

        assert_eq!(output, "Password: \n");
    }

    #[test]
    fn output_pausing_after_a_bare_marker_is_read_to_the_prompt() {
        let device = fake_device(PAUSING_DEVICE, None);
        let mut session = connected(&device);

        let config = session.get_running_config().expect("show config");
        let environment = session
            .execute_command("show environment", None)
            .expect("show environment");

        assert_eq!(
            config,
            "ip lan1 address 192.168.100.1/24\n# end of section\n\
             ip route default gateway 192.168.100.254\n"
        );
        assert_eq!(environment, "RTX830 Rev.15.02.30\n");
    }

    #[test]
    fn command_timeout_drops_the_session() {
        let mut device = fake_device(PAUSING_DEVICE, None);
        device.settings.command_timeout = Duration::from_secs(1);
        let mut session = connected(&device);

        let err = session
            .execute_command("show status lan1", None)
            .expect_err("slow command");

        assert!(matches!(err, SessionError::Timeout { .. }));
        assert!(!session.is_connected());
        assert_eq!(
            session.execute_command("show environment", None),
            Err(SessionError::NotConnected {
                host: String::from("192.0.2.1")
            })
        );
    }
}
