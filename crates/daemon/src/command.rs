// External command execution with deadlines.
//
// Every git and gpg invocation goes through `CommandExecutor`, which keeps the
// coordinators testable with scripted executors and gives each call its own
// timeout. A timed-out call fails that call only.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    /// Output to report on failure: stderr, or stdout when stderr is empty.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommandOptions<'a> {
    pub timeout: Duration,
    pub stdin: Option<&'a [u8]>,
}

impl<'a> CommandOptions<'a> {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout, stdin: None }
    }

    pub fn stdin(mut self, input: &'a [u8]) -> Self {
        self.stdin = Some(input);
        self
    }
}

pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        options: &CommandOptions<'_>,
    ) -> Result<CommandResult, io::Error>;
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for std::sync::Arc<E> {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        options: &CommandOptions<'_>,
    ) -> Result<CommandResult, io::Error> {
        (**self).execute(program, args, cwd, options)
    }
}

/// Runs real child processes. Prompts are disabled so a missing credential
/// or pinentry fails fast instead of hanging until the deadline.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        options: &CommandOptions<'_>,
    ) -> Result<CommandResult, io::Error> {
        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(if options.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let writer = match (options.stdin, child.stdin.take()) {
            (Some(input), Some(mut pipe)) => {
                let input = input.to_vec();
                Some(thread::spawn(move || {
                    // A child that exits early closes the pipe; that is its answer.
                    let _ = pipe.write_all(&input);
                }))
            }
            _ => None,
        };
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + options.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = bounded_reap(&mut child);
                drop(child);
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("`{program}` timed out after {}ms", options.timeout.as_millis()),
                ));
            }
            thread::sleep(POLL_INTERVAL);
        };

        if let Some(writer) = writer {
            let _ = writer.join();
        }

        Ok(CommandResult {
            success: status.success(),
            code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn bounded_reap(child: &mut Child) -> Option<ExitStatus> {
    let deadline = Instant::now() + REAP_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
            _ => return None,
        }
    }
}

// ── Timeouts ───────────────────────────────────────────────────────

/// Per-kind deadlines for external commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTimeouts {
    /// Config reads, rev-parse, key listings, `git show`.
    pub query: Duration,
    /// `git verify-commit`.
    pub verify: Duration,
    /// add, commit, amend, reset, and gpg signing probes.
    pub write: Duration,
}

impl Default for CommandTimeouts {
    fn default() -> Self {
        Self {
            query: Duration::from_secs(10),
            verify: Duration::from_secs(30),
            write: Duration::from_secs(60),
        }
    }
}

// ── Checked execution ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    SpawnFailed { command: String, message: String },
    TimedOut { command: String, timeout: Duration },
    CommandFailed { command: String, code: Option<i32>, stderr: String },
}

impl CommandError {
    pub fn command(&self) -> &str {
        match self {
            Self::SpawnFailed { command, .. }
            | Self::TimedOut { command, .. }
            | Self::CommandFailed { command, .. } => command,
        }
    }

    /// Raw backend diagnostic, for logs.
    pub fn diagnostic(&self) -> &str {
        match self {
            Self::SpawnFailed { message, .. } => message,
            Self::TimedOut { .. } => "timed out",
            Self::CommandFailed { stderr, .. } => stderr.trim(),
        }
    }
}

impl Display for CommandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpawnFailed { command, message } => {
                write!(f, "failed to run `{command}`: {message}")
            }
            Self::TimedOut { command, timeout } => {
                write!(f, "`{command}` timed out after {}ms", timeout.as_millis())
            }
            Self::CommandFailed { command, code, stderr } => {
                write!(f, "`{command}` failed with code {:?}: {}", code, stderr.trim())
            }
        }
    }
}

impl Error for CommandError {}

/// Run a command and return its raw result, mapping only spawn failures and
/// timeouts to errors. Callers that treat non-zero exit as an answer (e.g.
/// `verify-commit`, `cat-file -e`) use this.
pub fn execute_raw<E: CommandExecutor + ?Sized>(
    executor: &E,
    program: &str,
    args: Vec<String>,
    cwd: &Path,
    options: &CommandOptions<'_>,
) -> Result<CommandResult, CommandError> {
    let command = render(program, &args);
    executor.execute(program, &args, cwd, options).map_err(|error| {
        if error.kind() == io::ErrorKind::TimedOut {
            CommandError::TimedOut { command, timeout: options.timeout }
        } else {
            CommandError::SpawnFailed { command, message: error.to_string() }
        }
    })
}

/// Run a command and require a zero exit status.
pub fn execute_checked<E: CommandExecutor + ?Sized>(
    executor: &E,
    program: &str,
    args: Vec<String>,
    cwd: &Path,
    options: &CommandOptions<'_>,
) -> Result<CommandResult, CommandError> {
    let command = render(program, &args);
    let result = execute_raw(executor, program, args, cwd, options)?;
    if result.success {
        return Ok(result);
    }
    let stderr = result.diagnostic().to_string();
    Err(CommandError::CommandFailed { command, code: result.code, stderr })
}

fn render(program: &str, args: &[String]) -> String {
    let mut command = program.to_string();
    for arg in args {
        command.push(' ');
        command.push_str(arg);
    }
    command
}

pub(crate) fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}
