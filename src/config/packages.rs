//! Package lists per OS (`packages.toml`).
use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::toml_loader;
use crate::error::ConfigError;
use crate::platform::Os;

/// Key in `[defaults]` whose packages apply on every OS.
pub const ANY_KEY: &str = "any";

/// Package lists from `packages.toml`.
///
/// ```toml
/// [defaults]
/// any = ["git", "curl"]
/// linux = ["build-essential"]
/// mac = ["coreutils"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageDescriptor {
    /// Package names keyed by `any` or an OS key.
    #[serde(default)]
    pub defaults: BTreeMap<String, Vec<String>>,
}

impl PackageDescriptor {
    /// Packages installed on every OS.
    #[must_use]
    pub fn any(&self) -> &[String] {
        self.defaults.get(ANY_KEY).map_or(&[], Vec::as_slice)
    }

    /// Packages declared for `os` only, if any are declared.
    #[must_use]
    pub fn for_os(&self, os: Os) -> Option<&[String]> {
        self.defaults.get(os.key()).map(Vec::as_slice)
    }
}

/// Load the package descriptor. A missing file has no packages.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load(path: &Path) -> Result<PackageDescriptor, ConfigError> {
    toml_loader::load_config(path)
}
