//! In-memory index of seen files, keyed by size.
//!
//! Files can only ever be duplicates of same-sized files, so the index is a
//! concurrent map from size to a bucket of entries. Every decision about a
//! size class (insert, compare, link, remove) happens under that bucket's
//! mutex: two workers concurrently electing each other as "the duplicate"
//! could otherwise delete both surviving copies. Files of identical size are
//! a small minority of any real tree, so the serialization costs little.

pub mod entry;

use std::path::PathBuf;
use std::sync::Arc;

use fnv::FnvHashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};

pub use entry::FileEntry;

/// All seen files of one byte length, behind the size class's lock.
#[derive(Default)]
pub struct SizeBucket {
    entries: Mutex<FnvHashMap<PathBuf, Arc<FileEntry>>>,
}

impl SizeBucket {
    /// Enter the size class's critical section.
    pub fn lock(&self) -> MutexGuard<'_, FnvHashMap<PathBuf, Arc<FileEntry>>> {
        self.entries.lock()
    }
}

/// Concurrent map from file size to its bucket. Buckets are created on
/// demand and live until the end of the run.
#[derive(Default)]
pub struct SeenIndex {
    buckets: RwLock<FnvHashMap<u64, Arc<SizeBucket>>>,
}

impl SeenIndex {
    pub fn new() -> Self {
        SeenIndex::default()
    }

    /// Get or create the bucket for `size`. Concurrent creation races
    /// resolve to a single winner under the write lock.
    pub fn bucket_for(&self, size: u64) -> Arc<SizeBucket> {
        if let Some(bucket) = self.buckets.read().get(&size) {
            return Arc::clone(bucket);
        }
        let mut buckets = self.buckets.write();
        Arc::clone(buckets.entry(size).or_default())
    }

    /// Number of distinct sizes observed so far.
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn same_size_maps_to_same_bucket() {
        let index = SeenIndex::new();
        let a = index.bucket_for(100);
        let b = index.bucket_for(100);
        let c = index.bucket_for(200);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(index.bucket_count(), 2);
    }

    #[test]
    fn concurrent_creation_installs_one_winner() {
        let index = SeenIndex::new();
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for size in 0..100u64 {
                        let bucket = index.bucket_for(size);
                        bucket
                            .lock()
                            .insert(PathBuf::from(format!("{size}")), Arc::new(
                                FileEntry::new(PathBuf::from(format!("{size}")), size),
                            ));
                    }
                });
            }
        });
        assert_eq!(index.bucket_count(), 100);
        for size in 0..100u64 {
            assert_eq!(index.bucket_for(size).lock().len(), 1);
        }
    }
}
