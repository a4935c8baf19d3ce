//! Logging setup for the CLI: colored level tags via env_logger.

use std::io::Write;

use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};

/// Route our own records at info (debug with `verbose`) and keep
/// dependencies at warn. `RUST_LOG` still overrides everything.
pub fn setup_logging(verbose: bool) {
    let own_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), own_level)
        .format(|out, record| {
            let tag = match record.level() {
                Level::Error => "error".red().bold(),
                Level::Warn => " warn".yellow(),
                Level::Info => " info".green(),
                Level::Debug | Level::Trace => "debug".dimmed(),
            };
            writeln!(out, "{tag} {}", record.args())
        })
        .init();
}
