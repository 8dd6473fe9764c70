//! Domain-specific error types for the provisioning engine.
//!
//! Internal modules return typed errors ([`ProvisionError`], [`ConfigError`])
//! while the command handler at the CLI boundary converts them to
//! [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! ProvisionError
//! ├── CommandFailed       : a subprocess exited non-zero (recovered locally)
//! ├── InstallerMissing    : package manager binary not on PATH (ends package phase)
//! ├── UnsupportedPlatform : Windows or unknown OS (ends package phase)
//! └── TimeoutExceeded     : only from `timeout::with_timeout`
//!
//! ConfigError
//! ├── Io                  : descriptor file unreadable
//! └── Parse               : descriptor file is not valid TOML / wrong shape
//! ```

use thiserror::Error;

use crate::platform::Os;

/// Failures raised while installing packages or running commands.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// A command exited non-zero. Only the command line is retained.
    #[error("command failed: {command}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
    },

    /// The package manager binary could not be found on `PATH`.
    #[error("installer '{installer}' is not installed, please install it")]
    InstallerMissing {
        /// Name of the missing package manager binary.
        installer: String,
    },

    /// The host OS has no package manager flow.
    #[error("unsupported platform: {os}")]
    UnsupportedPlatform {
        /// The detected OS.
        os: Os,
    },

    /// A bounded wait elapsed before its body finished.
    #[error("timed out after {seconds}s")]
    TimeoutExceeded {
        /// The deadline that was exceeded, in seconds.
        seconds: u64,
    },
}

impl ProvisionError {
    /// Whether the caller may log this error and continue with the next
    /// independent unit of work.
    ///
    /// Only [`ProvisionError::CommandFailed`] is recoverable; the other
    /// variants end the package phase.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::CommandFailed { .. })
    }
}

/// Errors that arise while loading descriptor files.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An I/O error occurred while reading a descriptor file.
    #[error("IO error reading descriptor {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The descriptor is not valid TOML or does not have the expected shape.
    #[error("Invalid descriptor {path}: {message}")]
    Parse {
        /// Path to the offending file.
        path: String,
        /// Parser message.
        message: String,
    },
}
