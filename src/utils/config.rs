//! Application configuration constants.
//! Tuning and thresholds in one place.

// ---- Buffer pool ----

/// Block sizing for the process-wide buffer pool.
pub struct PoolConsts;

impl PoolConsts {
    /// Clusters per I/O block when disk geometry is available.
    pub const CLUSTERS_PER_BLOCK: u64 = 256;
    /// Lower clamp for the block size (bytes). 64 KiB.
    pub const MIN_BLOCK_SIZE: usize = 64 * 1024;
    /// Upper clamp for the block size (bytes). 64 MiB.
    pub const MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024;
    /// Block size when geometry is unavailable (bytes). 4 MiB.
    pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;
    /// Idle buffers retained in the pool; returns beyond this are dropped.
    pub const MAX_IDLE_BUFFERS: usize = 16;
}

// ---- Worker threads ----

/// Crawler thread limits.
pub struct WorkerLimits;

impl WorkerLimits {
    /// Default cap on crawler threads (the walk is I/O bound; more rarely helps).
    pub const DEFAULT_MAX_THREADS: usize = 8;
    /// Estimated file descriptors per worker (dir handle + two compared files + headroom).
    pub const FDS_PER_WORKER: usize = 8;
    /// Fraction of the process FD limit to use.
    pub const FD_LIMIT_FRACTION: f64 = 0.8;
}

// ---- Content comparison ----

/// Files smaller than this use their raw bytes as the short digest (bytes).
pub const RAW_DIGEST_THRESHOLD: u64 = 64;

/// Suffix for temporary files created by the link transactions.
pub const TEMP_SUFFIX: &str = ".$$$";
