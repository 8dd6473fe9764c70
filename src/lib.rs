//! Personal machine provisioner.
//!
//! Installs system packages through the platform's package manager and runs
//! per-tool setup commands, all driven by TOML descriptors in a data root:
//!
//! - `packages.toml` lists packages for every OS and per OS
//! - `configs/<name>/setup.toml` lists the platforms, enabled flag, and shell
//!   commands for one tool
//!
//! The public API is organised into layers:
//!
//! - **[`platform`]**, **[`exec`]**, **[`workdir`]**, **[`timeout`]**: host
//!   detection and command execution primitives
//! - **[`installer`]**: package manager dispatch (apt, brew)
//! - **[`config`]**: descriptor loading and discovery
//! - **[`setup`]**: the two-phase orchestrator
//! - **[`commands`]**: top-level command entry points
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod installer;
pub mod logging;
pub mod platform;
pub mod setup;
pub mod timeout;
pub mod workdir;
