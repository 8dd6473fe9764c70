//! `--setup-system`: install packages and apply configs on this machine.
use std::path::Path;

use anyhow::Result;

use crate::config::DataRoot;
use crate::exec::SystemExecutor;
use crate::logging::Logger;
use crate::platform::Os;
use crate::setup::{Phases, SystemSetup};

/// Provision the current machine from the data root.
///
/// # Errors
///
/// Returns an error if the data root cannot be determined or a descriptor
/// cannot be loaded. Failed installs and commands are only logged.
pub fn run(root: Option<&Path>, phases: Phases, log: &Logger) -> Result<()> {
    let root = super::resolve_root(root)?;
    let os = Os::discover();
    log.info(&format!("platform: {os}"));
    log.debug(&format!("data root: {}", root.display()));

    let executor = SystemExecutor;
    let setup = SystemSetup::new(DataRoot::new(&root), os, &executor, log);
    setup.run(phases)?;

    if let Some(path) = log.log_path() {
        log.info(&format!("log written to {}", path.display()));
    }
    Ok(())
}
