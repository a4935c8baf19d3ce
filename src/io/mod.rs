//! Block-level I/O building blocks: comparer, buffer pool, index shuffler.

pub mod block_compare;
pub mod buffer_pool;
pub mod shuffle;

pub use block_compare::blocks_equal;
pub use buffer_pool::{BufferPool, Lease};
pub use shuffle::outside_in;
