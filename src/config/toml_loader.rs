//! TOML descriptor file parsing and discovery.
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::ConfigError;

/// Deserialize a TOML descriptor file.
///
/// A missing file deserializes as an empty document, so every field of `T`
/// must have a default for that to succeed.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return parse(path, "");
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    parse(path, &content)
}

fn parse<T: DeserializeOwned>(path: &Path, content: &str) -> Result<T, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Find every file called `file_name` below `dir`, sorted by path.
///
/// A missing `dir` yields an empty list. Unreadable entries are skipped.
#[must_use]
pub fn discover_files(dir: &Path, file_name: &str) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && e.file_name() == file_name)
        .map(|e| e.path().to_path_buf())
        .collect();
    found.sort();
    found
}
