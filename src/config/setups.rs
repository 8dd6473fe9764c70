//! Per-config setup descriptors (`configs/<name>/setup.toml`).
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::toml_loader;
use crate::error::ConfigError;
use crate::platform::Os;

/// File name of a config's setup descriptor.
pub const SETUP_FILE: &str = "setup.toml";

/// On-disk shape of `setup.toml`.
#[derive(Debug, Deserialize)]
struct RawSetup {
    platforms: Vec<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    commands: Vec<String>,
}

const fn default_enabled() -> bool {
    true
}

/// A named config and the commands that apply it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupEntry {
    /// Name of the directory holding `setup.toml`.
    pub name: String,
    /// Working directory for the commands.
    pub dir: PathBuf,
    /// Recognised platforms the config applies to. Unrecognised names in
    /// the descriptor are dropped, so they never match a host.
    pub platforms: Vec<Os>,
    /// Disabled configs are skipped.
    pub enabled: bool,
    /// Shell command lines, run in order.
    pub commands: Vec<String>,
}

impl SetupEntry {
    /// Whether this config applies to `os`.
    #[must_use]
    pub fn supports(&self, os: Os) -> bool {
        self.platforms.contains(&os)
    }
}

/// Load a single `setup.toml`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or has no
/// `platforms` list.
pub fn load(path: &Path) -> Result<SetupEntry, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::Io {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
    }
    let raw: RawSetup = toml_loader::load_config(path)?;
    let dir = path.parent().map_or_else(PathBuf::new, Path::to_path_buf);
    let name = dir
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().to_string());

    let platforms = raw
        .platforms
        .iter()
        .filter_map(|key| {
            let os = Os::from_key(key);
            if os.is_none() {
                tracing::debug!("{}: ignoring unrecognised platform '{key}'", path.display());
            }
            os
        })
        .collect();

    Ok(SetupEntry {
        name,
        dir,
        platforms,
        enabled: raw.enabled,
        commands: raw.commands,
    })
}

/// Load every `setup.toml` below `configs_dir`, ordered by path.
///
/// # Errors
///
/// Returns the first read or parse error.
pub fn load_all(configs_dir: &Path) -> Result<Vec<SetupEntry>, ConfigError> {
    toml_loader::discover_files(configs_dir, SETUP_FILE)
        .iter()
        .map(|path| load(path))
        .collect()
}
