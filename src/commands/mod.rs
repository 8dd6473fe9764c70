//! Top-level command implementations.
pub mod setup_system;

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::DataRoot;

/// Environment variable naming the data root.
pub const ROOT_ENV: &str = "PROVISION_ROOT";

/// Directory name searched for next to the binary and in the working directory.
const DATA_DIR: &str = "data";

/// Determine the data root.
///
/// Tries, in order: `explicit` (from `--root`), `$PROVISION_ROOT`, a `data/`
/// directory next to the binary (or at the project root for
/// `target/<profile>/` builds), and `data/` in the current directory.
///
/// # Errors
///
/// Returns an error if no candidate holds a data root.
pub fn resolve_root(explicit: Option<&Path>) -> Result<PathBuf> {
    let env = std::env::var_os(ROOT_ENV).map(PathBuf::from);
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let cwd = std::env::current_dir().ok();
    resolve_root_from(explicit, env, exe_dir.as_deref(), cwd.as_deref())
}

fn resolve_root_from(
    explicit: Option<&Path>,
    env: Option<PathBuf>,
    exe_dir: Option<&Path>,
    cwd: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(root) = explicit {
        return Ok(root.to_path_buf());
    }
    if let Some(root) = env {
        return Ok(root);
    }

    if let Some(parent) = exe_dir {
        let candidates = [
            parent.join(DATA_DIR),               // bin/ → bin/data
            parent.join("../..").join(DATA_DIR), // target/release/ → project root
        ];
        for candidate in &candidates {
            if DataRoot::is_data_root(candidate) {
                return Ok(dunce::canonicalize(candidate)?);
            }
        }
    }

    if let Some(cwd) = cwd {
        let candidate = cwd.join(DATA_DIR);
        if DataRoot::is_data_root(&candidate) {
            return Ok(candidate);
        }
    }

    anyhow::bail!("cannot determine data root. Use --root or set {ROOT_ENV}");
}
