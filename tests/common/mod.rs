// Shared helpers for integration tests.
//
// Provides a temporary data root builder, a scripted executor, and a
// recording log so each integration test can drive a setup run without
// touching the host's package manager.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use provision::exec::{ExecResult, Executor, Invocation};
use provision::logging::Log;

/// Serialises tests that run config commands, since those change the
/// process working directory.
static CWD_LOCK: Mutex<()> = Mutex::new(());

/// Hold the working-directory lock for the duration of a test.
pub fn cwd_lock() -> MutexGuard<'static, ()> {
    CWD_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An isolated data root backed by a [`tempfile::TempDir`].
pub struct DataRootBuilder {
    /// Temporary directory holding `packages.toml` and `configs/`.
    pub root: tempfile::TempDir,
}

impl DataRootBuilder {
    /// Create an empty data root with a `configs/` directory.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(root.path().join("configs")).expect("create configs dir");
        Self { root }
    }

    /// Write `packages.toml`.
    pub fn packages(self, content: &str) -> Self {
        std::fs::write(self.root.path().join("packages.toml"), content)
            .expect("write packages.toml");
        self
    }

    /// Write `configs/<name>/setup.toml`.
    pub fn config(self, name: &str, content: &str) -> Self {
        let dir = self.config_dir(name);
        std::fs::create_dir_all(&dir).expect("create config dir");
        std::fs::write(dir.join("setup.toml"), content).expect("write setup.toml");
        self
    }

    /// Path to the data root.
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Path to `configs/<name>`.
    pub fn config_dir(&self, name: &str) -> PathBuf {
        self.root.path().join("configs").join(name)
    }
}

/// An [`Executor`] that records invocations and fails on matching lines.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    calls: Mutex<Vec<(String, PathBuf)>>,
    failing: Vec<String>,
    installed: Vec<String>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `programs` as present on `PATH`.
    pub fn with_installed(mut self, programs: &[&str]) -> Self {
        self.installed
            .extend(programs.iter().map(|p| (*p).to_string()));
        self
    }

    /// Fail every command line containing `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.failing.push(needle.to_string());
        self
    }

    /// Command lines in the order they were spawned.
    pub fn lines(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|(l, _)| l.clone())
            .collect()
    }

    /// Working directory at each spawn.
    pub fn dirs(&self) -> Vec<PathBuf> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|(_, d)| d.clone())
            .collect()
    }
}

impl Executor for ScriptedExecutor {
    fn spawn(&self, invocation: &Invocation) -> anyhow::Result<ExecResult> {
        let line = invocation.to_string();
        let cwd = std::env::current_dir().expect("current dir");
        self.calls.lock().expect("calls lock").push((line.clone(), cwd));
        let success = !self.failing.iter().any(|f| line.contains(f.as_str()));
        Ok(ExecResult {
            stdout: "ok\n".to_string(),
            stderr: String::new(),
            success,
            code: Some(i32::from(!success)),
        })
    }

    fn which(&self, program: &str) -> bool {
        self.installed.iter().any(|p| p == program)
    }

    fn is_root(&self) -> bool {
        false
    }

    fn home_dir(&self) -> Option<PathBuf> {
        Some(PathBuf::from("/home/tester"))
    }
}

/// A [`Log`] that keeps every message with its level.
#[derive(Debug, Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages logged at `level`.
    pub fn at(&self, level: &str) -> Vec<String> {
        self.entries
            .lock()
            .expect("log lock")
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn push(&self, level: &'static str, msg: &str) {
        self.entries
            .lock()
            .expect("log lock")
            .push((level, msg.to_string()));
    }
}

impl Log for RecordingLog {
    fn stage(&self, msg: &str) {
        self.push("stage", msg);
    }
    fn info(&self, msg: &str) {
        self.push("info", msg);
    }
    fn debug(&self, msg: &str) {
        self.push("debug", msg);
    }
    fn warn(&self, msg: &str) {
        self.push("warn", msg);
    }
    fn error(&self, msg: &str) {
        self.push("error", msg);
    }
}
