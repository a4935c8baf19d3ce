//! Public types: run configuration and the atomic runtime counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::utils::config::WorkerLimits;

/// Immutable options for one run. Built once by the CLI (or a lib caller),
/// then shared read-only by every crawler thread.
#[derive(Clone, Debug)]
pub struct Configuration {
    /// Smallest file size considered for merging (bytes).
    pub min_size_bytes: u64,
    /// Largest file size considered for merging (bytes).
    pub max_size_bytes: u64,
    /// Fall back to a symbolic link when hard-link creation fails.
    pub also_try_symlink: bool,
    /// Delete files that already are hard links.
    pub delete_hardlinks: bool,
    /// Delete files that already are symbolic links.
    pub delete_symlinks: bool,
    /// Replace existing hard links with an independent copy of their content.
    pub remove_hardlinks: bool,
    /// Replace existing symbolic links with an independent copy of their content.
    pub remove_symlinks: bool,
    /// Set the readonly attribute on hard links created by this run.
    pub set_readonly_on_new_hardlinks: bool,
    /// Set the readonly attribute on symbolic links created by this run.
    pub set_readonly_on_new_symlinks: bool,
    /// Set the readonly attribute on hard links found during the walk.
    pub set_readonly_on_existing_hardlinks: bool,
    /// Set the readonly attribute on symbolic links found during the walk.
    pub set_readonly_on_existing_symlinks: bool,
    /// Report counters only; never touch the filesystem.
    pub show_info_only: bool,
    /// Override crawler thread count. When `None`, derived from CPU count and FD limit.
    pub max_crawler_threads: Option<usize>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            min_size_bytes: 1,
            max_size_bytes: u64::MAX,
            also_try_symlink: false,
            delete_hardlinks: false,
            delete_symlinks: false,
            remove_hardlinks: false,
            remove_symlinks: false,
            set_readonly_on_new_hardlinks: false,
            set_readonly_on_new_symlinks: false,
            set_readonly_on_existing_hardlinks: false,
            set_readonly_on_existing_symlinks: false,
            show_info_only: false,
            max_crawler_threads: None,
        }
    }
}

impl Configuration {
    /// Number of crawler threads to start: the explicit override, or
    /// `min(logical CPUs, 8)`, further capped so concurrently open files stay
    /// under the process FD soft limit. Never below 1.
    pub fn effective_thread_count(&self) -> usize {
        let mut threads = self
            .max_crawler_threads
            .unwrap_or_else(|| num_cpus::get().min(WorkerLimits::DEFAULT_MAX_THREADS));
        if let Some(cap) = crate::fsops::worker_cap_for_fd_limit() {
            threads = threads.min(cap);
        }
        threads.max(1)
    }
}

/// The two kinds of links this tool creates and manages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkKind {
    Hard,
    Symbolic,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Hard => f.write_str("hard link"),
            LinkKind::Symbolic => f.write_str("symbolic link"),
        }
    }
}

/// Counters for one link kind. All increments are relaxed fetch-adds;
/// totals are eventually consistent across workers.
#[derive(Debug, Default)]
pub struct LinkStats {
    pub seen: AtomicU64,
    pub created: AtomicU64,
    pub deleted: AtomicU64,
    pub removed: AtomicU64,
}

/// Counters for one run.
#[derive(Debug, Default)]
pub struct RuntimeStats {
    pub files: AtomicU64,
    pub folders: AtomicU64,
    pub bytes: AtomicU64,
    pub hard: LinkStats,
    pub symbolic: LinkStats,
}

impl RuntimeStats {
    pub fn for_kind(&self, kind: LinkKind) -> &LinkStats {
        match kind {
            LinkKind::Hard => &self.hard,
            LinkKind::Symbolic => &self.symbolic,
        }
    }
}

/// Relaxed increment for a stats counter.
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}
