//! `provision` binary: parse flags, set up logging, run the setup.
use anyhow::Result;
use clap::Parser;

use provision::{cli, commands, logging};

/// Command name used for the log file.
const COMMAND: &str = "setup-system";

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();

    if !args.setup_system {
        return Ok(());
    }

    logging::init_subscriber(args.verbose, COMMAND);
    let log = logging::Logger::new(COMMAND);
    commands::setup_system::run(args.root.as_deref(), args.phases(), &log)
}
