//! Command-line argument surface.
use std::path::PathBuf;

use clap::Parser;

use crate::setup::Phases;

/// Version string reported by `--version` and the log header.
pub const VERSION: &str = match option_env!("PROVISION_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};

/// Top-level CLI entry point for the machine provisioner.
#[derive(Parser, Debug)]
#[command(
    name = "provision",
    about = "Install system packages and apply per-tool config setups",
    version = VERSION
)]
pub struct Cli {
    /// Install system packages and apply config setups
    #[arg(long)]
    pub setup_system: bool,

    /// Skip applying config setups
    #[arg(long)]
    pub no_configs: bool,

    /// Skip installing system packages
    #[arg(long)]
    pub no_packages: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the data root holding packages.toml and configs/
    #[arg(long)]
    pub root: Option<PathBuf>,
}

impl Cli {
    /// Phases selected by the skip flags.
    #[must_use]
    pub const fn phases(&self) -> Phases {
        Phases {
            packages: !self.no_packages,
            configs: !self.no_configs,
        }
    }
}
