//! Bounded pool of reusable I/O block buffers.
//!
//! Renting never blocks: when the idle stack is empty or its lock is
//! contended, a fresh buffer is allocated instead. Returning is best-effort
//! and capped, so the pool's working set stays bounded. A [`Lease`] returns
//! its buffer on drop, on every control-flow exit including panics.

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::fsops;
use crate::utils::config::PoolConsts;

static GLOBAL: OnceLock<BufferPool> = OnceLock::new();

/// Pool of equally sized byte buffers.
pub struct BufferPool {
    block_size: usize,
    idle: Mutex<Vec<Vec<u8>>>,
    max_idle: usize,
}

impl BufferPool {
    /// The process-wide pool. The first caller fixes the block size from the
    /// cluster geometry of the current directory's filesystem.
    pub fn global() -> &'static BufferPool {
        GLOBAL.get_or_init(|| {
            BufferPool::new(
                cluster_aligned_block_size(Path::new(".")),
                PoolConsts::MAX_IDLE_BUFFERS,
            )
        })
    }

    pub fn new(block_size: usize, max_idle: usize) -> Self {
        BufferPool {
            block_size,
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Size in bytes of every buffer this pool hands out.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Rent a buffer of `block_size` bytes. Never blocks: a contended or
    /// empty idle stack means a fresh allocation.
    pub fn rent(&self) -> Lease<'_> {
        let recycled = self.idle.try_lock().and_then(|mut idle| idle.pop());
        let buf = recycled.unwrap_or_else(|| vec![0u8; self.block_size]);
        Lease {
            buf: Some(buf),
            pool: self,
        }
    }

    /// Buffers currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn give_back(&self, buf: Vec<u8>) {
        // Best effort: under contention, or at capacity, the buffer is dropped.
        if let Some(mut idle) = self.idle.try_lock() {
            if idle.len() < self.max_idle {
                idle.push(buf);
            }
        }
    }
}

/// Pick the pool's block size: `256 × cluster size` clamped to
/// [64 KiB, 64 MiB], or 4 MiB when geometry is unavailable.
fn cluster_aligned_block_size(path: &Path) -> usize {
    match fsops::query_cluster_size(path) {
        Some(cluster) => cluster
            .saturating_mul(PoolConsts::CLUSTERS_PER_BLOCK)
            .clamp(PoolConsts::MIN_BLOCK_SIZE as u64, PoolConsts::MAX_BLOCK_SIZE as u64)
            as usize,
        None => PoolConsts::DEFAULT_BLOCK_SIZE,
    }
}

/// A rented buffer. Dereferences to `[u8]`; the buffer goes back to the pool
/// when the lease is dropped.
pub struct Lease<'a> {
    buf: Option<Vec<u8>>,
    pool: &'a BufferPool,
}

impl Deref for Lease<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for Lease<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.give_back(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn rent_hands_out_block_sized_buffers() {
        let pool = BufferPool::new(1024, 4);
        let lease = pool.rent();
        assert_eq!(lease.len(), 1024);
    }

    #[test]
    fn dropped_lease_is_recycled() {
        let pool = BufferPool::new(64, 4);
        {
            let mut lease = pool.rent();
            lease[0] = 42;
        }
        assert_eq!(pool.idle_count(), 1);
        let lease = pool.rent();
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(lease.len(), 64);
    }

    #[test]
    fn returns_beyond_capacity_are_dropped() {
        let pool = BufferPool::new(64, 2);
        let a = pool.rent();
        let b = pool.rent();
        let c = pool.rent();
        drop(a);
        drop(b);
        drop(c);
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn rent_survives_concurrent_churn() {
        let pool = Arc::new(BufferPool::new(256, 8));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    let mut lease = pool.rent();
                    lease[0] = 1;
                }
            }));
        }
        for handle in handles {
            handle.join().expect("thread panicked");
        }
        assert!(pool.idle_count() <= 8);
    }

    #[test]
    fn block_size_clamping() {
        // The global pool's geometry probe is environment-dependent; exercise
        // the clamp arithmetic directly instead.
        let from_cluster = |cluster: u64| {
            cluster
                .saturating_mul(PoolConsts::CLUSTERS_PER_BLOCK)
                .clamp(
                    PoolConsts::MIN_BLOCK_SIZE as u64,
                    PoolConsts::MAX_BLOCK_SIZE as u64,
                ) as usize
        };
        assert_eq!(from_cluster(1), PoolConsts::MIN_BLOCK_SIZE);
        assert_eq!(from_cluster(4096), 1024 * 1024);
        assert_eq!(from_cluster(u64::MAX / 2), PoolConsts::MAX_BLOCK_SIZE);
    }
}
