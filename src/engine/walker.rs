//! Shared LIFO of pending directories with a multi-worker quiescence
//! protocol.
//!
//! There is no central coordinator: the run is over exactly when the stack
//! is empty and every worker observes that simultaneously. Each worker that
//! finds the stack empty decrements the active count and sleeps; the last
//! one to go idle starts a wake wave so the sleepers can exit too. A push
//! notifies one sleeper, which re-registers as active before retrying.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

pub struct WorkStack {
    dirs: Mutex<Vec<PathBuf>>,
    active: AtomicUsize,
    signal: Condvar,
}

impl WorkStack {
    /// A stack shared by `workers` crawler threads. Every worker counts as
    /// active until it first runs out of work.
    pub fn new(workers: usize) -> Self {
        WorkStack {
            dirs: Mutex::new(Vec::new()),
            active: AtomicUsize::new(workers),
            signal: Condvar::new(),
        }
    }

    /// Queue a directory and wake one sleeping worker.
    pub fn push(&self, dir: PathBuf) {
        self.dirs.lock().push(dir);
        self.signal.notify_one();
    }

    /// Pop the most recent directory, or block until one arrives.
    /// Returns `None` when the whole walk has quiesced; each exiting worker
    /// passes the wake-up on so every peer unblocks.
    pub fn pop_or_wait(&self) -> Option<PathBuf> {
        let mut dirs = self.dirs.lock();
        loop {
            if let Some(dir) = dirs.pop() {
                return Some(dir);
            }
            if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
                // Last worker went idle with an empty stack: done.
                self.signal.notify_one();
                return None;
            }
            self.signal.wait(&mut dirs);
            if dirs.is_empty() && self.active.load(Ordering::Acquire) == 0 {
                self.signal.notify_one();
                return None;
            }
            self.active.fetch_add(1, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use std::thread;

    #[test]
    fn single_worker_drains_and_terminates() {
        let stack = WorkStack::new(1);
        stack.push(PathBuf::from("a"));
        stack.push(PathBuf::from("b"));
        assert_eq!(stack.pop_or_wait(), Some(PathBuf::from("b")));
        assert_eq!(stack.pop_or_wait(), Some(PathBuf::from("a")));
        assert_eq!(stack.pop_or_wait(), None);
    }

    #[test]
    fn every_item_is_seen_exactly_once_across_workers() {
        const WORKERS: usize = 4;
        const FANOUT: usize = 3;
        const DEPTH: usize = 4;

        let stack = WorkStack::new(WORKERS);
        stack.push(PathBuf::from("0"));
        let seen = StdMutex::new(Vec::new());

        // Each popped "directory" pushes FANOUT children until DEPTH path
        // segments, mimicking a tree walk with late-arriving work.
        thread::scope(|s| {
            for _ in 0..WORKERS {
                s.spawn(|| {
                    while let Some(dir) = stack.pop_or_wait() {
                        if dir.components().count() < DEPTH {
                            for child in 0..FANOUT {
                                stack.push(dir.join(child.to_string()));
                            }
                        }
                        seen.lock().unwrap().push(dir);
                    }
                });
            }
        });

        let seen = seen.into_inner().unwrap();
        let expected: usize = (0..DEPTH).map(|d| FANOUT.pow(d as u32)).sum();
        assert_eq!(seen.len(), expected);
        let unique: HashSet<_> = seen.iter().collect();
        assert_eq!(unique.len(), expected, "a directory was visited twice");
    }

    #[test]
    fn workers_blocked_on_empty_stack_all_exit() {
        // No work at all: every worker must still terminate.
        let stack = WorkStack::new(8);
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| assert_eq!(stack.pop_or_wait(), None));
            }
        });
    }
}
