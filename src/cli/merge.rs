// src/cli/merge.rs

//! CLI definitions for prefix merging commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum HostToolsCommands {
    /// Merge host tool install prefixes into one directory
    Merge {
        /// Install prefixes, highest priority first
        #[arg(required = true)]
        prefixes: Vec<String>,

        /// Output directory (must not exist)
        #[arg(short, long)]
        output: String,

        /// Fail on conflicting executables instead of keeping the first
        #[arg(long)]
        strict: bool,

        /// Bootstrap configuration file (`strict_host_tools`)
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SysrootCommands {
    /// Layer sysroot overlays on top of a base sysroot
    Merge {
        /// Base sysroot
        base: String,

        /// Overlays, applied in order; later ones win
        overlays: Vec<String>,

        /// Output directory (must not exist)
        #[arg(short, long)]
        output: String,
    },
}
