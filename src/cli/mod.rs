// src/cli/mod.rs
//! CLI definitions for kindling
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! Graph commands:
//! - `plan` - Generate the standard bootstrap graph
//! - `evaluate` - Evaluate the graph and list configured nodes
//! - `verify` - Run the graph invariant suite
//! - `status` - Report which stages have complete outputs
//!
//! Artifact commands:
//! - `seed` - Inspect, unpack and pack seed archives
//! - `host-tools` / `sysroot` - Merge install prefixes
//! - `audit` - Check produced ELF binaries

use clap::{Parser, Subcommand};

mod merge;
mod seed;

pub use merge::{HostToolsCommands, SysrootCommands};
pub use seed::SeedCommands;

#[derive(Parser)]
#[command(name = "kindling")]
#[command(version)]
#[command(about = "Staged toolchain bootstrap with configuration transitions", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate the bootstrap graph and print it as TOML
    Plan {
        /// Bootstrap configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Write the graph to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Evaluate a graph in the default context
    Evaluate {
        /// Bootstrap configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Evaluate this graph file instead of the generated plan
        #[arg(short, long)]
        graph: Option<String>,

        /// Target to evaluate when a graph file is given
        #[arg(short, long, default_value = "//:stage3")]
        target: String,

        /// Print the evaluated graph as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check isolation, deduplication, hermeticity and provenance
    Verify {
        /// Bootstrap configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Show which bootstrap stages have complete outputs
    Status {
        /// Bootstrap configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Seed archive handling
    #[command(subcommand)]
    Seed(SeedCommands),

    /// Host tools aggregation
    #[command(subcommand)]
    HostTools(HostToolsCommands),

    /// Sysroot layering
    #[command(subcommand)]
    Sysroot(SysrootCommands),

    /// Audit ELF binaries for architecture, glibc, RPATH and NEEDED leaks
    Audit {
        /// File or directory to audit
        #[arg(required_unless_present = "compare")]
        path: Option<String>,

        /// Bootstrap configuration file (target and glibc ceiling)
        #[arg(short, long)]
        config: Option<String>,

        /// Target architecture (x86_64, aarch64, riscv64)
        #[arg(short, long)]
        target: Option<String>,

        /// Highest allowed GLIBC symbol version
        #[arg(long)]
        glibc: Option<String>,

        /// Additional allowed NEEDED sonames
        #[arg(long = "allow")]
        allow: Vec<String>,

        /// Compare ELF and NEEDED sets of two trees
        #[arg(long, num_args = 2, value_names = ["LEFT", "RIGHT"], conflicts_with = "path")]
        compare: Option<Vec<String>>,
    },
}
