//! Core orchestration: crawler threads, the per-file decision pipeline, and
//! dispatch into the link transactions.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use anyhow::Result;
use fnv::FnvHashMap;
use log::{debug, info, warn};

use crate::engine::transaction;
use crate::engine::walker::WorkStack;
use crate::fsops;
use crate::index::{FileEntry, SeenIndex};
use crate::types::{Configuration, LinkKind, RuntimeStats, bump};
use crate::utils::human_size;

type BucketEntries = FnvHashMap<PathBuf, Arc<FileEntry>>;

/// Walk `roots` with the configured number of crawler threads and merge
/// duplicate contents. In-run errors are logged and never abort the walk;
/// counters accumulate into `stats`.
pub fn merge_trees(
    config: &Configuration,
    stats: &RuntimeStats,
    roots: &[PathBuf],
) -> Result<()> {
    let threads = config.effective_thread_count();
    let merger = Merger {
        config,
        stats,
        index: SeenIndex::new(),
    };
    let stack = WorkStack::new(threads);
    for root in roots {
        bump(&stats.folders);
        stack.push(root.clone());
    }
    debug!("crawling {} root(s) with {threads} thread(s)", roots.len());
    thread::scope(|s| {
        for _ in 0..threads {
            s.spawn(|| merger.crawl(&stack));
        }
    });
    Ok(())
}

struct Merger<'a> {
    config: &'a Configuration,
    stats: &'a RuntimeStats,
    index: SeenIndex,
}

impl Merger<'_> {
    /// Worker loop: drain the stack, enumerate each directory, push
    /// subdirectories and handle files. Per-entry errors skip the entry;
    /// enumeration errors skip the directory.
    fn crawl(&self, stack: &WorkStack) {
        while let Some(dir) = stack.pop_or_wait() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("cannot enumerate {}: {e}", dir.display());
                    continue;
                }
            };
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("while reading {}: {e}", dir.display());
                        continue;
                    }
                };
                let file_type = match entry.file_type() {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("cannot type {}: {e}", entry.path().display());
                        continue;
                    }
                };
                if file_type.is_dir() {
                    bump(&self.stats.folders);
                    stack.push(entry.path());
                } else {
                    // Symlinks are handled as files, never descended into.
                    self.handle_file(&entry.path());
                }
            }
        }
    }

    /// The per-file pipeline: count, filter by size, index, then decide
    /// whether the file is an existing link or a candidate for merging.
    fn handle_file(&self, path: &Path) {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                warn!("cannot stat {}: {e}", path.display());
                return;
            }
        };
        let size = meta.len();
        bump(&self.stats.files);
        self.stats.bytes.fetch_add(size, Ordering::Relaxed);
        if size < self.config.min_size_bytes || size > self.config.max_size_bytes {
            return;
        }

        // Everything below is a decision about this size class and runs
        // under its bucket lock.
        let bucket = self.index.bucket_for(size);
        let mut entries = bucket.lock();
        register(&mut entries, path.to_path_buf(), size);

        let siblings = match fsops::read_hard_link_targets(path, &meta) {
            Ok(siblings) => siblings,
            Err(e) => {
                entries.remove(path);
                warn!("cannot enumerate hard links of {}: {e}", path.display());
                return;
            }
        };
        for sibling in siblings {
            register(&mut entries, sibling, size);
        }
        if fsops::hard_link_count(&meta) > 1 {
            bump(&self.stats.hard.seen);
            if self.config.show_info_only {
                return;
            }
            self.handle_existing_link(&mut entries, path, LinkKind::Hard);
            return;
        }

        match fsops::read_symbolic_link_target(path) {
            Err(e) => {
                entries.remove(path);
                warn!("cannot read link target of {}: {e}", path.display());
                return;
            }
            Ok(Some(target)) => {
                bump(&self.stats.symbolic.seen);
                if !self.config.show_info_only {
                    self.handle_existing_link(&mut entries, path, LinkKind::Symbolic);
                }
                // The link itself is never a merge candidate: its bucket key
                // is the link-text length, not a content size. A same-length
                // file must not compare against it.
                entries.remove(path);
                drop(entries);
                self.register_link_target(resolve_link_target(path, &target));
                return;
            }
            Ok(None) => {}
        }

        if !self.config.show_info_only {
            self.try_link_to_twin(&entries, path);
        }
    }

    /// A file that already is a link: delete it, materialize it back, or
    /// adjust its readonly attribute, per configuration.
    fn handle_existing_link(&self, entries: &mut BucketEntries, path: &Path, kind: LinkKind) {
        let (delete, remove, set_readonly) = match kind {
            LinkKind::Hard => (
                self.config.delete_hardlinks,
                self.config.remove_hardlinks,
                self.config.set_readonly_on_existing_hardlinks,
            ),
            LinkKind::Symbolic => (
                self.config.delete_symlinks,
                self.config.remove_symlinks,
                self.config.set_readonly_on_existing_symlinks,
            ),
        };
        let counters = self.stats.for_kind(kind);

        if delete {
            entries.remove(path);
            if let Err(e) = fsops::clear_protection_attributes(path) {
                warn!("cannot clear attributes on {}: {e}", path.display());
            }
            match fs::remove_file(path) {
                Ok(()) => {
                    bump(&counters.deleted);
                    info!("deleted {kind} {}", path.display());
                }
                Err(e) => warn!("cannot delete {kind} {}: {e}", path.display()),
            }
        } else if remove {
            entries.remove(path);
            match transaction::materialize_back(path) {
                Ok(()) => {
                    bump(&counters.removed);
                    info!("{} carries its own content again", path.display());
                }
                Err(e) => warn!("cannot materialize {}: {e:#}", path.display()),
            }
        } else if set_readonly {
            if let Err(e) = fsops::set_readonly(path, true) {
                warn!("cannot set readonly on {}: {e}", path.display());
            }
        } else {
            debug!("{} is already a {kind}", path.display());
        }
    }

    /// Index a symlink's resolved target under the target's own size, so
    /// later duplicates of that content can link against it. Runs after the
    /// link's bucket lock is released; at most one bucket is locked at a
    /// time, so size classes can never deadlock against each other.
    fn register_link_target(&self, target: PathBuf) {
        let Ok(meta) = fs::metadata(&target) else {
            // Dangling or unreadable target; nothing to index.
            return;
        };
        if !meta.is_file() {
            return;
        }
        let size = meta.len();
        if size < self.config.min_size_bytes || size > self.config.max_size_bytes {
            return;
        }
        let bucket = self.index.bucket_for(size);
        register(&mut bucket.lock(), target, size);
    }

    /// Compare `path` against every other entry of its size class and turn
    /// it into a link to the first byte-identical twin. Failed link attempts
    /// move on to the next candidate.
    fn try_link_to_twin(&self, entries: &BucketEntries, path: &Path) {
        let Some(me) = entries.get(path) else {
            return;
        };
        for twin in entries.values() {
            if twin.path() == path || !me.content_equals(twin) {
                continue;
            }
            match transaction::replace_with_link(path, twin.path(), self.config) {
                Ok(kind) => {
                    bump(&self.stats.for_kind(kind).created);
                    info!(
                        "{} is now a {kind} to {} ({})",
                        path.display(),
                        twin.path().display(),
                        human_size(me.size())
                    );
                    return;
                }
                Err(e) => warn!(
                    "cannot link {} to {}: {e:#}",
                    path.display(),
                    twin.path().display()
                ),
            }
        }
    }
}

fn register(entries: &mut BucketEntries, path: PathBuf, size: u64) {
    entries
        .entry(path)
        .or_insert_with_key(|p| Arc::new(FileEntry::new(p.clone(), size)));
}

/// Symlink targets are stored relative to the link's directory.
fn resolve_link_target(link: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        target.to_path_buf()
    } else {
        link.parent().unwrap_or(Path::new(".")).join(target)
    }
}
