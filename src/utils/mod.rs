pub mod config;
pub mod format;
pub mod logger;

pub use format::{human_size, parse_size};
pub use logger::setup_logging;
