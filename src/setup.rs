//! System setup: install packages, then apply config setups.
//!
//! Both phases are sequential and fire-and-forget per step. A failed package
//! batch or config command is logged and the run moves on; a missing package
//! manager or unsupported platform ends the package phase only.
use std::fmt;
use std::ops::ControlFlow;

use anyhow::{Context as _, Result};

use crate::config::setups::{self, SetupEntry};
use crate::config::{DataRoot, packages};
use crate::exec::{Executor, RunOptions, run_command_in};
use crate::installer::Installer;
use crate::logging::Log;
use crate::platform::Os;

/// Which phases of the setup to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phases {
    /// Install system packages from `packages.toml`.
    pub packages: bool,
    /// Apply every `configs/<name>/setup.toml`.
    pub configs: bool,
}

impl Default for Phases {
    fn default() -> Self {
        Self {
            packages: true,
            configs: true,
        }
    }
}

/// What happened to a single config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOutcome {
    /// Every command succeeded.
    Applied,
    /// The current OS is not in the config's platform list.
    NotApplicable,
    /// The config is marked `enabled = false`.
    Disabled,
    /// `command` failed; the config's remaining commands were skipped.
    Failed {
        /// The command that failed.
        command: String,
    },
}

/// Drives the installer and the config commands for one run.
pub struct SystemSetup<'a> {
    data: DataRoot,
    installer: Installer<'a>,
    executor: &'a dyn Executor,
    log: &'a dyn Log,
}

impl fmt::Debug for SystemSetup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemSetup")
            .field("data", &self.data)
            .field("installer", &self.installer)
            .field("executor", &"<dyn Executor>")
            .field("log", &"<dyn Log>")
            .finish()
    }
}

impl<'a> SystemSetup<'a> {
    /// Create a setup run for `os` over the descriptors in `data`.
    #[must_use]
    pub fn new(data: DataRoot, os: Os, executor: &'a dyn Executor, log: &'a dyn Log) -> Self {
        Self {
            data,
            installer: Installer::new(os, executor),
            executor,
            log,
        }
    }

    /// The OS this run targets.
    #[must_use]
    pub const fn os(&self) -> Os {
        self.installer.os()
    }

    /// Run the selected phases, packages first.
    ///
    /// # Errors
    ///
    /// Returns an error only if a descriptor file cannot be loaded. Failed
    /// steps are logged, not returned.
    pub fn run(&self, phases: Phases) -> Result<()> {
        if phases.packages {
            self.install_packages()?;
        }
        if phases.configs {
            self.apply_configs()?;
        }
        Ok(())
    }

    /// Install the `any` packages, then the packages for the current OS.
    ///
    /// There is no rollback: if the OS batch fails, the `any` batch stays
    /// installed.
    ///
    /// # Errors
    ///
    /// Returns an error if `packages.toml` cannot be loaded.
    pub fn install_packages(&self) -> Result<()> {
        self.log.stage("Installing system packages");
        let path = self.data.packages_file();
        let descriptor = packages::load(&path)
            .with_context(|| format!("loading {}", path.display()))?;

        let any = descriptor.any();
        self.log
            .info(&format!("installing {} any system packages", any.len()));
        if self.install_batch(any).is_break() {
            return Ok(());
        }

        let os = self.os();
        match descriptor.for_os(os) {
            Some(list) => {
                self.log
                    .info(&format!("installing {} {os} system packages", list.len()));
                if self.install_batch(list).is_break() {
                    return Ok(());
                }
            }
            None => self.log.debug(&format!("no {os} packages declared")),
        }

        self.log.info("package installation complete");
        Ok(())
    }

    /// Install one batch. Breaks when the package phase must stop.
    fn install_batch(&self, names: &[String]) -> ControlFlow<()> {
        match self.installer.install_system_packages(names, true) {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) if e.is_recoverable() => {
                self.log.warn(&format!("failed to install packages: {e}"));
                ControlFlow::Continue(())
            }
            Err(e) => {
                self.log.error(&format!("package installation stopped: {e}"));
                ControlFlow::Break(())
            }
        }
    }

    /// Apply every config descriptor in discovery order.
    ///
    /// # Errors
    ///
    /// Returns an error if any `setup.toml` cannot be loaded.
    pub fn apply_configs(&self) -> Result<Vec<(String, ConfigOutcome)>> {
        self.log.stage("Setting up configs");
        let dir = self.data.configs_dir();
        let entries =
            setups::load_all(&dir).with_context(|| format!("loading configs from {}", dir.display()))?;
        self.log
            .debug(&format!("found {} config descriptors", entries.len()));

        let outcomes = entries
            .iter()
            .map(|entry| (entry.name.clone(), self.apply_config(entry)))
            .collect();

        self.log.info("config setup complete");
        Ok(outcomes)
    }

    /// Apply a single config.
    ///
    /// Each command runs with the working directory set to the config's
    /// directory. The first failing command ends this config.
    pub fn apply_config(&self, entry: &SetupEntry) -> ConfigOutcome {
        if !entry.supports(self.os()) {
            self.log
                .debug(&format!("{}: not for {}", entry.name, self.os()));
            return ConfigOutcome::NotApplicable;
        }
        if !entry.enabled {
            self.log.debug(&format!("{}: disabled", entry.name));
            return ConfigOutcome::Disabled;
        }

        self.log.info(&format!("setting up {}", entry.name));
        let opts = RunOptions::with_root(self.installer.user_is_root());
        for command in &entry.commands {
            match run_command_in(self.executor, &entry.dir, command, opts) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    self.log.warn(&format!(
                        "failed to set up {} on command '{command}', skipping",
                        entry.name
                    ));
                    return ConfigOutcome::Failed {
                        command: command.clone(),
                    };
                }
                Err(e) => {
                    self.log.warn(&format!(
                        "cannot enter {} for {}: {e}",
                        entry.dir.display(),
                        entry.name
                    ));
                    return ConfigOutcome::Failed {
                        command: command.clone(),
                    };
                }
            }
        }
        ConfigOutcome::Applied
    }
}
