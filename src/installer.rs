//! System package installation through the host's package manager.
use std::fmt;

use crate::error::ProvisionError;
use crate::exec::{Executor, RunOptions, run_command};
use crate::platform::Os;

/// Supported package managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    /// Debian/Ubuntu packages (apt).
    Apt,
    /// macOS packages (Homebrew).
    Brew,
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

impl PackageManager {
    /// Pick the package manager for `os`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::UnsupportedPlatform`] for Windows and
    /// unknown hosts.
    pub const fn for_os(os: Os) -> Result<Self, ProvisionError> {
        match os {
            Os::Linux => Ok(Self::Apt),
            Os::Mac => Ok(Self::Brew),
            Os::Windows | Os::Unknown => Err(ProvisionError::UnsupportedPlatform { os }),
        }
    }

    /// Name of the manager's binary on `PATH`.
    #[must_use]
    pub const fn binary(self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Brew => "brew",
        }
    }

    /// Whether invocations need root. Homebrew refuses to run as root.
    #[must_use]
    pub const fn needs_root(self) -> bool {
        matches!(self, Self::Apt)
    }

    fn update_command(self, program: &str) -> String {
        match self {
            Self::Apt => format!("{program} update -y"),
            Self::Brew => format!("{program} update"),
        }
    }

    fn install_command(self, program: &str, packages: &[String]) -> String {
        let packages = packages.join(" ");
        match self {
            Self::Apt => format!("{program} install -y {packages}"),
            Self::Brew => format!("{program} install {packages}"),
        }
    }
}

/// Installs batches of system packages for the detected OS.
pub struct Installer<'a> {
    os: Os,
    user_is_root: bool,
    executor: &'a dyn Executor,
}

impl fmt::Debug for Installer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installer")
            .field("os", &self.os)
            .field("user_is_root", &self.user_is_root)
            .field("executor", &"<dyn Executor>")
            .finish()
    }
}

impl<'a> Installer<'a> {
    /// Create an installer for `os`, querying the executor for root once.
    #[must_use]
    pub fn new(os: Os, executor: &'a dyn Executor) -> Self {
        Self {
            os,
            user_is_root: executor.is_root(),
            executor,
        }
    }

    /// The OS this installer dispatches on.
    #[must_use]
    pub const fn os(&self) -> Os {
        self.os
    }

    /// Whether the current user is root.
    #[must_use]
    pub const fn user_is_root(&self) -> bool {
        self.user_is_root
    }

    /// Install `packages` with a single package-manager invocation.
    ///
    /// Verifies the manager is on `PATH` first and optionally refreshes the
    /// package index. A failed index refresh is logged and ignored. An empty
    /// list does nothing once the platform is known to be supported.
    ///
    /// # Errors
    ///
    /// - [`ProvisionError::UnsupportedPlatform`] on Windows or an unknown OS.
    /// - [`ProvisionError::InstallerMissing`] if the manager binary is absent;
    ///   nothing is run in that case.
    /// - [`ProvisionError::CommandFailed`] if the install invocation fails.
    ///   The whole batch is reported; there is no per-package result.
    pub fn install_system_packages(
        &self,
        packages: &[String],
        update_first: bool,
    ) -> Result<(), ProvisionError> {
        let manager = PackageManager::for_os(self.os)?;
        if packages.is_empty() {
            tracing::debug!("no packages to install with {manager}");
            return Ok(());
        }
        self.installer_is_installed(manager.binary())?;

        let program = if manager.needs_root() && !self.user_is_root {
            format!("sudo {}", manager.binary())
        } else {
            manager.binary().to_string()
        };
        let opts = RunOptions::with_root(self.user_is_root);

        if update_first {
            let update = manager.update_command(&program);
            if run_command(self.executor, &update, opts).is_none() {
                tracing::warn!("package index update failed: {update}");
            }
        }

        let command = manager.install_command(&program, packages);
        match run_command(self.executor, &command, opts) {
            Some(_) => Ok(()),
            None => Err(ProvisionError::CommandFailed { command }),
        }
    }

    /// Return `true` if `name` is found on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::UnsupportedPlatform`] on non-Unix hosts.
    pub fn command_is_installed(&self, name: &str) -> Result<bool, ProvisionError> {
        if !self.os.is_unix() {
            return Err(ProvisionError::UnsupportedPlatform { os: self.os });
        }
        Ok(self.executor.which(name))
    }

    /// Require the package manager `name` to be on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::InstallerMissing`] if it is absent, or
    /// [`ProvisionError::UnsupportedPlatform`] on non-Unix hosts.
    pub fn installer_is_installed(&self, name: &str) -> Result<(), ProvisionError> {
        if self.command_is_installed(name)? {
            Ok(())
        } else {
            Err(ProvisionError::InstallerMissing {
                installer: name.to_string(),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::exec::test_helpers::RecordingExecutor;
    use crate::exec::{ExecResult, Invocation};

    mockall::mock! {
        Exec {}
        impl Executor for Exec {
            fn spawn(&self, invocation: &Invocation) -> anyhow::Result<ExecResult>;
            fn which(&self, program: &str) -> bool;
            fn is_root(&self) -> bool;
            fn home_dir(&self) -> Option<PathBuf>;
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn manager_for_each_os() {
        assert_eq!(PackageManager::for_os(Os::Linux).unwrap(), PackageManager::Apt);
        assert_eq!(PackageManager::for_os(Os::Mac).unwrap(), PackageManager::Brew);
        assert!(matches!(
            PackageManager::for_os(Os::Windows),
            Err(ProvisionError::UnsupportedPlatform { os: Os::Windows })
        ));
        assert!(matches!(
            PackageManager::for_os(Os::Unknown),
            Err(ProvisionError::UnsupportedPlatform { os: Os::Unknown })
        ));
    }

    #[test]
    fn manager_display() {
        assert_eq!(PackageManager::Apt.to_string(), "apt");
        assert_eq!(PackageManager::Brew.to_string(), "brew");
    }

    #[test]
    fn missing_apt_raises_without_running_anything() {
        let mut executor = MockExec::new();
        executor.expect_is_root().return_const(false);
        executor
            .expect_which()
            .withf(|p| p == "apt")
            .times(1)
            .return_const(false);
        executor.expect_spawn().times(0);

        let installer = Installer::new(Os::Linux, &executor);
        let err = installer
            .install_system_packages(&names(&["git"]), true)
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::InstallerMissing { ref installer } if installer == "apt"
        ));
    }

    #[test]
    fn missing_brew_raises_without_running_anything() {
        let mut executor = MockExec::new();
        executor.expect_is_root().return_const(false);
        executor.expect_which().return_const(false);
        executor.expect_spawn().times(0);

        let installer = Installer::new(Os::Mac, &executor);
        let err = installer
            .install_system_packages(&names(&["git"]), true)
            .unwrap_err();

        assert!(matches!(err, ProvisionError::InstallerMissing { .. }));
    }

    #[test]
    fn windows_and_unknown_are_unsupported() {
        let executor = RecordingExecutor::new().with_installed(&["apt", "brew"]);
        for os in [Os::Windows, Os::Unknown] {
            let installer = Installer::new(os, &executor);
            let err = installer
                .install_system_packages(&names(&["git"]), true)
                .unwrap_err();
            assert!(matches!(err, ProvisionError::UnsupportedPlatform { os: o } if o == os));
        }
        assert!(executor.invocations().is_empty());
    }

    #[test]
    fn apt_as_regular_user_escalates() {
        let executor = RecordingExecutor::new().with_installed(&["apt"]);
        let installer = Installer::new(Os::Linux, &executor);

        installer
            .install_system_packages(&names(&["git", "vim"]), true)
            .unwrap();

        insta::assert_snapshot!(executor.command_lines().join("\n"), @r"
        sudo apt update -y
        sudo apt install -y git vim
        ");
    }

    #[test]
    fn apt_as_root_does_not_escalate() {
        let executor = RecordingExecutor::new()
            .with_installed(&["apt"])
            .as_root(true);
        let installer = Installer::new(Os::Linux, &executor);
        assert!(installer.user_is_root());

        installer
            .install_system_packages(&names(&["git"]), true)
            .unwrap();

        assert_eq!(
            executor.command_lines(),
            vec!["apt update -y", "apt install -y git"]
        );
    }

    #[test]
    fn brew_never_escalates() {
        let executor = RecordingExecutor::new().with_installed(&["brew"]);
        let installer = Installer::new(Os::Mac, &executor);

        installer
            .install_system_packages(&names(&["ripgrep", "fd"]), true)
            .unwrap();

        insta::assert_snapshot!(executor.command_lines().join("\n"), @r"
        brew update
        brew install ripgrep fd
        ");
    }

    #[test]
    fn update_can_be_skipped() {
        let executor = RecordingExecutor::new().with_installed(&["apt"]);
        let installer = Installer::new(Os::Linux, &executor);

        installer
            .install_system_packages(&names(&["git"]), false)
            .unwrap();

        assert_eq!(executor.command_lines(), vec!["sudo apt install -y git"]);
    }

    #[test]
    fn failed_update_still_installs() {
        let executor = RecordingExecutor::new()
            .with_installed(&["apt"])
            .failing_on("update");
        let installer = Installer::new(Os::Linux, &executor);

        installer
            .install_system_packages(&names(&["git"]), true)
            .unwrap();

        assert_eq!(executor.invocations().len(), 2);
    }

    #[test]
    fn failed_install_reports_whole_batch() {
        let executor = RecordingExecutor::new()
            .with_installed(&["apt"])
            .failing_on("install");
        let installer = Installer::new(Os::Linux, &executor);

        let err = installer
            .install_system_packages(&names(&["git", "nope"]), true)
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::CommandFailed { ref command } if command == "sudo apt install -y git nope"
        ));
    }

    #[test]
    fn empty_batch_runs_nothing() {
        let executor = RecordingExecutor::new();
        let installer = Installer::new(Os::Linux, &executor);

        installer.install_system_packages(&[], true).unwrap();

        assert!(executor.invocations().is_empty());
    }

    #[test]
    fn command_is_installed_uses_path_lookup() {
        let executor = RecordingExecutor::new().with_installed(&["git"]);
        let installer = Installer::new(Os::Linux, &executor);
        assert!(installer.command_is_installed("git").unwrap());
        assert!(!installer.command_is_installed("hg").unwrap());
    }

    #[test]
    fn command_is_installed_unsupported_on_windows() {
        let executor = RecordingExecutor::new().with_installed(&["git"]);
        let installer = Installer::new(Os::Windows, &executor);
        assert!(matches!(
            installer.command_is_installed("git"),
            Err(ProvisionError::UnsupportedPlatform { os: Os::Windows })
        ));
    }

    #[test]
    fn installer_is_installed_raises_when_absent() {
        let executor = RecordingExecutor::new().with_installed(&["brew"]);
        let installer = Installer::new(Os::Mac, &executor);
        assert!(installer.installer_is_installed("brew").is_ok());
        assert!(matches!(
            installer.installer_is_installed("port"),
            Err(ProvisionError::InstallerMissing { ref installer }) if installer == "port"
        ));
    }
}
