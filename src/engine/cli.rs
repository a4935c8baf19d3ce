//! CLI command handler: validate roots, run the merge, report the summary.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::engine::arg_parser::Cli;
use crate::engine::merger::merge_trees;
use crate::types::{LinkStats, RuntimeStats};
use crate::utils::{human_size, setup_logging};

/// Run one merge over the directories named on the command line.
/// The only error that escapes is a pre-flight failure (a root that does
/// not exist); everything after the walk starts is logged and absorbed.
pub fn handle_run(cli: &Cli) -> Result<()> {
    setup_logging(cli.verbose);
    let config = cli.to_configuration();
    let roots = resolve_roots(&cli.directories)?;
    if config.show_info_only {
        info!("info mode: the filesystem will not be modified");
    }

    let stats = RuntimeStats::default();
    let started = Instant::now();
    merge_trees(&config, &stats, &roots)?;
    log_summary(&stats);
    debug!("total time: {:?}", started.elapsed());
    Ok(())
}

/// Canonicalize the requested roots; empty means the current directory.
/// A missing or non-directory argument fails the run before it starts.
fn resolve_roots(directories: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let requested: Vec<PathBuf> = if directories.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        directories.to_vec()
    };
    let mut roots = Vec::with_capacity(requested.len());
    for dir in requested {
        let canonical = fs::canonicalize(&dir)
            .with_context(|| format!("directory not found: {}", dir.display()))?;
        if !canonical.is_dir() {
            anyhow::bail!("not a directory: {}", dir.display());
        }
        roots.push(canonical);
    }
    Ok(roots)
}

fn log_summary(stats: &RuntimeStats) {
    info!(
        "{} files ({}) in {} folders",
        stats.files.load(Ordering::Relaxed),
        human_size(stats.bytes.load(Ordering::Relaxed)),
        stats.folders.load(Ordering::Relaxed),
    );
    let report = |name: &str, s: &LinkStats| {
        info!(
            "{name} links: {} seen, {} created, {} deleted, {} removed",
            s.seen.load(Ordering::Relaxed),
            s.created.load(Ordering::Relaxed),
            s.deleted.load(Ordering::Relaxed),
            s.removed.load(Ordering::Relaxed),
        );
    };
    report("hard", &stats.hard);
    report("symbolic", &stats.symbolic);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_root_is_a_preflight_error() {
        let err = resolve_roots(&[PathBuf::from("/definitely/not/here")]).unwrap_err();
        assert!(err.to_string().contains("directory not found"));
    }

    #[test]
    fn empty_list_falls_back_to_current_directory() {
        let roots = resolve_roots(&[]).unwrap();
        assert_eq!(roots.len(), 1);
        assert!(roots[0].is_absolute());
    }

    #[test]
    fn roots_are_canonicalized() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("sub");
        fs::create_dir(&nested).unwrap();
        let dotted = dir.path().join("sub").join("..").join("sub");
        let roots = resolve_roots(&[dotted]).unwrap();
        assert_eq!(roots, vec![fs::canonicalize(&nested).unwrap()]);
    }
}
