//! Engine module: CLI plumbing, the parallel crawler, and the merge pipeline.

pub mod arg_parser;
pub mod cli;
pub mod merger;
pub mod transaction;
pub mod walker;

pub use arg_parser::Cli;
pub use cli::handle_run;
pub use merger::merge_trees;
pub use transaction::{materialize_back, replace_with_link};
pub use walker::WorkStack;
