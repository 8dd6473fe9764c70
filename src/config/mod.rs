//! Descriptor files under the data root.
//!
//! ```text
//! <root>/
//! ├── packages.toml
//! └── configs/
//!     └── <name>/
//!         ├── setup.toml
//!         └── ...files the commands copy or link
//! ```
pub mod packages;
pub mod setups;
pub mod toml_loader;

use std::path::{Path, PathBuf};

/// Name of the package descriptor file.
pub const PACKAGES_FILE: &str = "packages.toml";

/// Name of the directory holding per-config subdirectories.
pub const CONFIGS_DIR: &str = "configs";

/// Locations of the descriptor files under a data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRoot {
    root: PathBuf,
}

impl DataRoot {
    /// Wrap an existing data root directory.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// The data root itself.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of `packages.toml`.
    #[must_use]
    pub fn packages_file(&self) -> PathBuf {
        self.root.join(PACKAGES_FILE)
    }

    /// Path of the `configs/` directory.
    #[must_use]
    pub fn configs_dir(&self) -> PathBuf {
        self.root.join(CONFIGS_DIR)
    }

    /// Whether `dir` looks like a data root.
    #[must_use]
    pub fn is_data_root(dir: &Path) -> bool {
        dir.join(PACKAGES_FILE).is_file() || dir.join(CONFIGS_DIR).is_dir()
    }
}
