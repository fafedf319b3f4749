// src/commands/mod.rs
//! Command handlers for the kindling CLI

mod audit;
mod graph;
mod merge;
mod seed;

pub use audit::cmd_audit;
pub use graph::{cmd_evaluate, cmd_plan, cmd_status, cmd_verify};
pub use merge::{cmd_host_tools_merge, cmd_sysroot_merge};
pub use seed::{cmd_seed_pack, cmd_seed_show, cmd_seed_unpack, cmd_seed_verify};

use anyhow::{Context, Result};
use kindling::BootstrapConfig;
use std::path::Path;

/// Load the bootstrap configuration and apply environment overrides
///
/// Without a file the defaults are used. The environment is read here
/// and nowhere else.
pub(crate) fn load_config(path: Option<&str>) -> Result<BootstrapConfig> {
    let config = match path {
        Some(p) => BootstrapConfig::load(Path::new(p))
            .with_context(|| format!("Failed to load configuration from {}", p))?,
        None => BootstrapConfig::default(),
    };
    config
        .with_env_overrides()
        .context("Invalid environment override")
}
