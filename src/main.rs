//! Twinlink CLI: replace duplicate file contents with links.

use std::process::ExitCode;

use clap::Parser;
use twinlink::engine::{Cli, handle_run};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match handle_run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(255)
        }
    }
}
