use clap::Parser;
use std::path::PathBuf;

use crate::types::Configuration;
use crate::utils::parse_size;

/// Replace duplicate file contents with hard or symbolic links.
#[derive(Clone, Parser)]
#[command(name = "twinlink")]
#[command(about = "Deduplicate files by linking byte-identical copies together.")]
pub struct Cli {
    /// Directories to scan. Default: current directory.
    #[arg(value_name = "DIR")]
    pub directories: Vec<PathBuf>,

    /// Report statistics only; never touch the filesystem.
    #[arg(short = 'v', long = "info")]
    pub info: bool,

    /// Crawler thread count. Default: min(logical CPUs, 8).
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Minimum file size to consider (accepts units, e.g. "4k"). Default: 1.
    #[arg(short = 'm', long = "minimum", default_value = "1", value_parser = parse_size)]
    pub minimum: u64,

    /// Maximum file size to consider. Default: unlimited.
    #[arg(short = 'M', long = "maximum", value_parser = parse_size)]
    pub maximum: Option<u64>,

    /// Fall back to a symbolic link when hard-linking fails.
    #[arg(short = 's', long = "allow-symlink")]
    pub allow_symlink: bool,

    /// Delete files that already are hard links.
    #[arg(long = "delete-hardlinks", visible_alias = "Dhl")]
    pub delete_hardlinks: bool,

    /// Delete files that already are symbolic links.
    #[arg(long = "delete-symlinks", visible_alias = "Dsl")]
    pub delete_symlinks: bool,

    /// Delete files that already are links of either kind.
    #[arg(short = 'D', long = "delete-links")]
    pub delete_links: bool,

    /// Replace existing hard links with a copy of their content.
    #[arg(long = "remove-hardlinks", visible_alias = "Rhl")]
    pub remove_hardlinks: bool,

    /// Replace existing symbolic links with a copy of their content.
    #[arg(long = "remove-symlinks", visible_alias = "Rsl")]
    pub remove_symlinks: bool,

    /// Replace existing links of either kind with a copy of their content.
    #[arg(short = 'R', long = "remove-links")]
    pub remove_links: bool,

    /// Set the readonly attribute on newly created links.
    #[arg(long = "readonly-new", visible_alias = "sro")]
    pub readonly_new: bool,

    /// Set the readonly attribute on links found during the walk.
    #[arg(long = "readonly-existing", visible_alias = "uro")]
    pub readonly_existing: bool,

    /// Set the readonly attribute on both new and existing links.
    #[arg(short = 'r', long = "readonly", visible_alias = "ro")]
    pub readonly: bool,

    /// Verbose (debug) logging.
    #[arg(long = "verbose")]
    pub verbose: bool,
}

impl Cli {
    /// Collapse the flag surface into the engine's configuration value.
    pub fn to_configuration(&self) -> Configuration {
        Configuration {
            min_size_bytes: self.minimum,
            max_size_bytes: self.maximum.unwrap_or(u64::MAX),
            also_try_symlink: self.allow_symlink,
            delete_hardlinks: self.delete_hardlinks || self.delete_links,
            delete_symlinks: self.delete_symlinks || self.delete_links,
            remove_hardlinks: self.remove_hardlinks || self.remove_links,
            remove_symlinks: self.remove_symlinks || self.remove_links,
            set_readonly_on_new_hardlinks: self.readonly_new || self.readonly,
            set_readonly_on_new_symlinks: self.readonly_new || self.readonly,
            set_readonly_on_existing_hardlinks: self.readonly_existing || self.readonly,
            set_readonly_on_existing_symlinks: self.readonly_existing || self.readonly,
            show_info_only: self.info,
            max_crawler_threads: self.threads,
        }
    }
}
