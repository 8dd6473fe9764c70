//! Shell command runner.
//!
//! Commands arrive as plain command lines (from descriptors or built by the
//! installer). [`prepare`] turns a line into an [`Invocation`], applying the
//! normalisation policy, and an [`Executor`] spawns it. [`run_command`] ties
//! the two together and collapses the outcome to "stdout or nothing".
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::logging::{COMMAND_TARGET, RUNNING};
use crate::timeout;
use crate::workdir::WorkDirGuard;

/// Substrings that force a command through a shell interpreter.
pub const SHELL_METACHARACTERS: &[&str] = &["&&", "||", ">", "<", "|", ";", "&", "*", "$"];

/// Privilege-escalation prefix stripped when already running as root.
const ESCALATION_PREFIX: &str = "sudo ";

/// How often a child is polled while a deadline is active.
const DEADLINE_POLL: Duration = Duration::from_millis(50);

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, if the process was not killed by a signal.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// How a command line should be run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Pass the whole line to a shell instead of splitting it into argv.
    pub as_shell: bool,
    /// Apply metacharacter detection, `~` expansion and `sudo` stripping.
    pub normalize: bool,
    /// Whether the current user is root; detected on demand when `None`.
    pub is_root: Option<bool>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            as_shell: false,
            normalize: true,
            is_root: None,
        }
    }
}

impl RunOptions {
    /// Options with the privilege state already known.
    #[must_use]
    pub fn with_root(is_root: bool) -> Self {
        Self {
            is_root: Some(is_root),
            ..Self::default()
        }
    }
}

/// A prepared command, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Run the line through `sh -c`.
    Shell(String),
    /// Run `program` directly with `args`.
    Direct {
        /// Program name or path.
        program: String,
        /// Arguments, already split.
        args: Vec<String>,
    },
}

impl Invocation {
    /// Whether this invocation goes through a shell interpreter.
    #[must_use]
    pub const fn is_shell(&self) -> bool {
        matches!(self, Self::Shell(_))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell(line) => f.write_str(line),
            Self::Direct { program, args } => {
                f.write_str(program)?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
        }
    }
}

/// Return `true` if `command` contains any of [`SHELL_METACHARACTERS`].
#[must_use]
pub fn needs_shell(command: &str) -> bool {
    SHELL_METACHARACTERS.iter().any(|m| command.contains(m))
}

/// Replace every `~` in `command` with `home`.
///
/// This is purely textual. A path that contains both `~` and a space will
/// be split apart in direct mode.
#[must_use]
pub fn expand_home(command: &str, home: &Path) -> String {
    command.replace('~', &home.to_string_lossy())
}

/// Remove `sudo ` where it starts a command word.
///
/// Only a `sudo ` at the start of the line or after whitespace or a shell
/// separator (`;`, `&`, `|`, `(`) is removed; `nosudo x` is left alone.
#[must_use]
pub fn strip_escalation(command: &str) -> String {
    let starts_word = |idx: usize| {
        command
            .get(..idx)
            .and_then(|before| before.chars().next_back())
            .is_none_or(|c| c.is_whitespace() || matches!(c, ';' | '&' | '|' | '('))
    };

    let mut out = String::with_capacity(command.len());
    let mut kept_from = 0;
    for (idx, _) in command.match_indices(ESCALATION_PREFIX) {
        if starts_word(idx) {
            out.push_str(command.get(kept_from..idx).unwrap_or_default());
            kept_from = idx + ESCALATION_PREFIX.len();
        }
    }
    out.push_str(command.get(kept_from..).unwrap_or_default());
    out
}

/// Turn a command line into an [`Invocation`].
///
/// `is_root` is only consulted when normalisation is on and
/// `opts.is_root` is unset.
pub fn prepare(
    command: &str,
    opts: RunOptions,
    home: Option<&Path>,
    is_root: impl FnOnce() -> bool,
) -> Invocation {
    let mut line = command.trim().to_string();
    let mut as_shell = opts.as_shell;

    if opts.normalize {
        if needs_shell(&line) {
            as_shell = true;
        }
        if let Some(home) = home {
            line = expand_home(&line, home);
        }
        let stripped = strip_escalation(&line);
        if stripped != line && opts.is_root.unwrap_or_else(is_root) {
            line = stripped;
        }
    }

    if as_shell {
        return Invocation::Shell(line);
    }

    let mut parts = line.split_whitespace().map(str::to_string);
    let program = parts.next().unwrap_or_default();
    Invocation::Direct {
        program,
        args: parts.collect(),
    }
}

/// Abstraction over process spawning and host introspection.
pub trait Executor: Send + Sync {
    /// Spawn `invocation`, wait for it, and capture its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started. A non-zero exit
    /// is reported through [`ExecResult::success`], not as an error.
    fn spawn(&self, invocation: &Invocation) -> Result<ExecResult>;

    /// Check if a program is available on `PATH`.
    fn which(&self, program: &str) -> bool;

    /// Whether the current user is root.
    fn is_root(&self) -> bool;

    /// The current user's home directory.
    fn home_dir(&self) -> Option<PathBuf>;
}

/// [`Executor`] backed by real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn spawn(&self, invocation: &Invocation) -> Result<ExecResult> {
        let mut cmd = match invocation {
            Invocation::Shell(line) => {
                #[cfg(windows)]
                let mut cmd = {
                    let mut c = Command::new("cmd");
                    c.arg("/C");
                    c
                };
                #[cfg(not(windows))]
                let mut cmd = {
                    let mut c = Command::new("sh");
                    c.arg("-c");
                    c
                };
                cmd.arg(line);
                cmd
            }
            Invocation::Direct { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        };
        let output = match timeout::current_deadline() {
            Some(deadline) => output_before(&mut cmd, deadline),
            None => cmd.output(),
        }
        .with_context(|| format!("failed to execute: {invocation}"))?;
        Ok(ExecResult::from(output))
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }

    #[cfg(unix)]
    fn is_root(&self) -> bool {
        Command::new("id")
            .arg("-u")
            .output()
            .is_ok_and(|o| o.status.success() && String::from_utf8_lossy(&o.stdout).trim() == "0")
    }

    #[cfg(not(unix))]
    fn is_root(&self) -> bool {
        false
    }

    fn home_dir(&self) -> Option<PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
    }
}

/// Like [`Command::output`], but kill the child's process group if it is
/// still running at `deadline`.
///
/// The killed child is reaped before returning, so nothing it started keeps
/// running after a [`TimedOut`](io::ErrorKind::TimedOut) error.
fn output_before(cmd: &mut Command, deadline: Instant) -> io::Result<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Output {
                status,
                stdout: collect(stdout),
                stderr: collect(stderr),
            });
        }
        let now = Instant::now();
        if now >= deadline {
            kill_group(&mut child);
            child.wait()?;
            timeout::note_expired();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "killed at deadline",
            ));
        }
        thread::sleep(DEADLINE_POLL.min(deadline.saturating_duration_since(now)));
    }
}

/// Read a child pipe to the end on a helper thread so the child never
/// blocks on a full pipe.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf).ok();
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Kill `child` and, on Unix, every process in its group.
fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let killed = Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success());
        if killed {
            return;
        }
    }
    if let Err(e) = child.kill() {
        tracing::debug!("failed to kill pid {}: {e}", child.id());
    }
}

/// Run `command` and return its trimmed stdout, or `None` if it failed.
///
/// Failure covers a non-zero exit and a process that could not be started.
/// Captured stderr is logged at debug level and otherwise dropped.
pub fn run_command(executor: &dyn Executor, command: &str, opts: RunOptions) -> Option<String> {
    if command.trim().is_empty() {
        tracing::warn!("refusing to run an empty command");
        return None;
    }

    let home = if opts.normalize {
        executor.home_dir()
    } else {
        None
    };
    let invocation = prepare(command, opts, home.as_deref(), || executor.is_root());
    tracing::debug!(target: COMMAND_TARGET, command = %invocation, "{RUNNING}");

    match executor.spawn(&invocation) {
        Ok(result) if result.success => Some(result.stdout.trim().to_string()),
        Ok(result) => {
            tracing::debug!(
                target: COMMAND_TARGET,
                command = %invocation,
                code = result.code.map_or(-1, i64::from),
                stderr = result.stderr.trim(),
                "failed"
            );
            None
        }
        Err(e) => {
            tracing::debug!(
                target: COMMAND_TARGET,
                command = %invocation,
                stderr = %format!("{e:#}"),
                "not started"
            );
            None
        }
    }
}

/// Run `command` with the process working directory set to `dir`.
///
/// The previous working directory is restored before returning.
///
/// # Errors
///
/// Returns an error if the working directory cannot be changed to `dir`.
pub fn run_command_in(
    executor: &dyn Executor,
    dir: &Path,
    command: &str,
    opts: RunOptions,
) -> io::Result<Option<String>> {
    let _guard = WorkDirGuard::enter(dir)?;
    Ok(run_command(executor, command, opts))
}


#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::test_helpers::RecordingExecutor;
    use super::*;

    fn never_root() -> bool {
        false
    }

    #[test]
    fn every_metacharacter_forces_shell_mode() {
        for meta in SHELL_METACHARACTERS {
            let command = format!("echo a {meta} b");
            let invocation = prepare(&command, RunOptions::default(), None, never_root);
            assert!(invocation.is_shell(), "'{meta}' should force shell mode");
        }
    }

    #[test]
    fn plain_command_runs_direct() {
        let invocation = prepare("git clone repo", RunOptions::default(), None, never_root);
        assert_eq!(
            invocation,
            Invocation::Direct {
                program: "git".to_string(),
                args: vec!["clone".to_string(), "repo".to_string()],
            }
        );
    }

    #[test]
    fn as_shell_is_honoured_without_metacharacters() {
        let opts = RunOptions {
            as_shell: true,
            ..RunOptions::default()
        };
        let invocation = prepare("ls -la", opts, None, never_root);
        assert_eq!(invocation, Invocation::Shell("ls -la".to_string()));
    }

    #[test]
    fn normalize_off_leaves_metacharacters_alone() {
        let opts = RunOptions {
            normalize: false,
            ..RunOptions::default()
        };
        let invocation = prepare("echo a > b", opts, Some(Path::new("/home/u")), never_root);
        assert!(!invocation.is_shell());
    }

    #[test]
    fn tilde_is_expanded_to_home() {
        let invocation = prepare(
            "cp vimrc ~/.vimrc",
            RunOptions::default(),
            Some(Path::new("/home/user")),
            never_root,
        );
        assert_eq!(invocation.to_string(), "cp vimrc /home/user/.vimrc");
    }

    #[test]
    fn sudo_is_stripped_for_root() {
        let invocation = prepare(
            "sudo apt install -y git",
            RunOptions::with_root(true),
            None,
            || panic!("root state already known"),
        );
        assert_eq!(invocation.to_string(), "apt install -y git");
    }

    #[test]
    fn sudo_is_kept_for_regular_user() {
        let invocation = prepare(
            "sudo apt install -y git",
            RunOptions::default(),
            None,
            never_root,
        );
        assert_eq!(invocation.to_string(), "sudo apt install -y git");
    }

    #[test]
    fn sudo_only_stripped_as_a_command_word() {
        assert_eq!(strip_escalation("echo nosudo x"), "echo nosudo x");
        assert_eq!(strip_escalation("sudo make install"), "make install");
        assert_eq!(
            strip_escalation("sudo apt update && sudo apt install -y git"),
            "apt update && apt install -y git"
        );
        assert_eq!(strip_escalation("cd /tmp;sudo ls"), "cd /tmp;ls");
        assert_eq!(strip_escalation("echo visudo x"), "echo visudo x");
    }

    #[test]
    fn embedded_sudo_substring_survives_for_root() {
        let invocation = prepare(
            "echo nosudo x",
            RunOptions::default(),
            None,
            || panic!("no escalation to strip, root state not needed"),
        );
        assert_eq!(invocation.to_string(), "echo nosudo x");
    }

    #[test]
    fn root_is_detected_lazily() {
        let invocation = prepare("sudo ls", RunOptions::default(), None, || true);
        assert_eq!(invocation.to_string(), "ls");
    }

    #[test]
    fn run_command_returns_trimmed_stdout() {
        #[cfg(windows)]
        let out = run_command(&SystemExecutor, "cmd /C echo hello", RunOptions::default());
        #[cfg(not(windows))]
        let out = run_command(&SystemExecutor, "echo   hello  ", RunOptions::default());
        assert_eq!(out.as_deref(), Some("hello"));
    }

    #[cfg(unix)]
    #[test]
    fn run_command_failure_is_absent() {
        assert_eq!(run_command(&SystemExecutor, "false", RunOptions::default()), None);
        assert_eq!(
            run_command(&SystemExecutor, "echo partial && exit 3", RunOptions::default()),
            None,
            "output before a failing exit must not leak"
        );
    }

    #[test]
    fn run_command_missing_binary_is_absent() {
        assert_eq!(
            run_command(
                &SystemExecutor,
                "this-program-does-not-exist-12345 --flag",
                RunOptions::default()
            ),
            None
        );
    }

    #[test]
    fn run_command_rejects_empty_line() {
        let executor = RecordingExecutor::new();
        assert_eq!(run_command(&executor, "   ", RunOptions::default()), None);
        assert!(executor.invocations().is_empty());
    }

    #[test]
    fn run_command_uses_executor_home_and_root() {
        let executor = RecordingExecutor::new()
            .as_root(true)
            .with_home("/root");
        let out = run_command(&executor, "sudo cp a ~/b", RunOptions::default());
        assert_eq!(out.as_deref(), Some(""));
        assert_eq!(executor.command_lines(), vec!["cp a /root/b"]);
    }

    #[test]
    fn run_command_mock_failure_is_absent() {
        let executor = RecordingExecutor::new().failing_on("make");
        assert_eq!(run_command(&executor, "make install", RunOptions::default()), None);
    }

    #[test]
    fn which_finds_known_program() {
        #[cfg(windows)]
        assert!(SystemExecutor.which("cmd"), "cmd should be found on Windows");
        #[cfg(not(windows))]
        assert!(SystemExecutor.which("sh"), "sh should be found on Unix");
    }

    #[test]
    fn which_missing_program() {
        assert!(
            !SystemExecutor.which("this-program-does-not-exist-12345"),
            "non-existent program should not be found"
        );
    }

    #[test]
    fn invocation_display_joins_args() {
        let invocation = Invocation::Direct {
            program: "brew".to_string(),
            args: vec!["install".to_string(), "git".to_string()],
        };
        assert_eq!(invocation.to_string(), "brew install git");
    }
}
