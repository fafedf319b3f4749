// src/cli/seed.rs

//! CLI definitions for seed archive commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum SeedCommands {
    /// Show the metadata of a seed archive
    Show {
        /// Path to the archive (.tar.zst, .tar.xz, .tar.gz)
        archive: String,
    },

    /// Unpack a seed archive into a fresh directory
    Unpack {
        /// Path to the archive
        archive: String,

        /// Directory to create
        #[arg(short, long)]
        output: String,

        /// Skip the contents hash check
        #[arg(long)]
        no_verify: bool,
    },

    /// Pack a toolchain directory into a seed archive
    Pack {
        /// Toolchain directory
        dir: String,

        /// Archive to write; compression follows the extension
        #[arg(short, long)]
        output: String,

        /// Bootstrap configuration file (triple and versions)
        #[arg(short, long)]
        config: Option<String>,

        /// Aggregated host tools to ship under host-tools/
        #[arg(long)]
        host_tools: Option<String>,
    },

    /// Unpack a seed archive and check it for host and build-tree leaks
    Verify {
        /// Path to the archive
        archive: String,
    },
}
