// tests/common/mod.rs

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use kindling::bootstrap::{BootstrapConfig, BootstrapPlan, SourceSpec};
use kindling::graph::EvaluatedGraph;
use std::fs;
use std::path::{Path, PathBuf};

pub const GCC_SHA256: &str = "e2b09ec21660f01fecffb715e0120265216943f038d0e48a9868713e54f06cea";

/// Configuration with a local seed archive and outputs under `output_root`
pub fn local_seed_config(output_root: &Path) -> BootstrapConfig {
    BootstrapConfig::new()
        .with_output_root(output_root)
        .with_seed_path("/srv/kindling/seed.tar.zst")
}

/// A fully attested upstream source for gcc
pub fn gcc_source() -> SourceSpec {
    SourceSpec {
        name: "gcc".to_string(),
        url: "https://ftp.gnu.org/gnu/gcc/gcc-15.2.0/gcc-15.2.0.tar.xz".to_string(),
        sha256: Some(GCC_SHA256.to_string()),
        vendor: None,
        signature: Some("gcc-15.2.0.tar.xz.sig".to_string()),
    }
}

/// Generate and evaluate the standard plan
pub fn evaluated_plan(config: &BootstrapConfig) -> (BootstrapPlan, EvaluatedGraph) {
    let plan = BootstrapPlan::generate(config).unwrap();
    let evaluated = plan.evaluate().unwrap();
    (plan, evaluated)
}

/// Create `<root>/<name>/usr/bin/<tool>` for each tool, with the prefix
/// name as file content
pub fn make_prefix(root: &Path, name: &str, tools: &[&str]) -> PathBuf {
    let prefix = root.join(name);
    let bin = prefix.join("usr/bin");
    fs::create_dir_all(&bin).unwrap();
    for tool in tools {
        fs::write(bin.join(tool), name).unwrap();
    }
    prefix
}
